use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Transport(String),
    TypeMismatch {
        node: String,
        expected: String,
        actual: String,
    },
    AssertionFailed {
        node: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::TypeMismatch {
                node,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for {node}: expected {expected}, actual {actual}"
            ),
            Self::AssertionFailed {
                node,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {node}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

mod activation;
mod context;
mod dom;
mod events;
mod forms;
mod request;
mod session;
mod url;
mod validity;

pub use context::{ContextId, Page};
pub use dom::{Document, ElementKind, NodeId};
pub use events::{EventState, ListenerFn, ListenerOutcome, Modifiers};
pub use request::{
    DatumValue, DownloadArtifact, Enctype, FormDatum, Method, RequestBody, SelectedFile,
    WebRequest, WebResponse,
};
pub use session::{DisplayOracle, ScriptEngine, Session, Transport};
pub use validity::ValidityState;
