use std::collections::{HashMap, VecDeque};

use crate::context::{BrowsingContext, ContextId, Page};
use crate::dom::{truncate_chars, Document, ElementKind, NodeId};
use crate::request::{DownloadArtifact, SelectedFile, WebRequest, WebResponse};
use crate::{Error, Result};

pub trait Transport {
    fn send(&mut self, request: &WebRequest) -> Result<WebResponse>;
}

pub trait ScriptEngine {
    fn run_snippet(&mut self, source: &str) -> Option<String>;
}

pub trait DisplayOracle {
    fn is_displayed(&self, document: &Document, node: NodeId) -> bool;
}

// Without a layout engine, display falls back to the hidden attribute.
struct AttributeDisplayOracle;

impl DisplayOracle for AttributeDisplayOracle {
    fn is_displayed(&self, document: &Document, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if document.element(current).is_some_and(|e| e.hidden) {
                return false;
            }
            cursor = document.parent(current);
        }
        true
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub(crate) routes: HashMap<String, WebResponse>,
    pub(crate) failures: HashMap<String, String>,
    pub(crate) fallback: Option<WebResponse>,
}

impl MockTransport {
    pub(crate) fn respond(&self, request: &WebRequest) -> Result<WebResponse> {
        if let Some(message) = self.failures.get(&request.url) {
            return Err(Error::Transport(message.clone()));
        }
        if let Some(response) = self.routes.get(&request.url) {
            return Ok(response.clone());
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }
        Ok(WebResponse::text(""))
    }
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) events: bool,
    pub(crate) submit: bool,
    pub(crate) nav: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            events: true,
            submit: true,
            nav: true,
            logs: VecDeque::new(),
            log_limit: 10_000,
            to_stderr: true,
        }
    }
}

pub struct Session {
    pub(crate) contexts: Vec<BrowsingContext>,
    pub(crate) current: ContextId,
    pub(crate) page_mocks: HashMap<String, Page>,
    pub(crate) transport_mock: MockTransport,
    pub(crate) transport_override: Option<Box<dyn Transport>>,
    pub(crate) script_engine: Option<Box<dyn ScriptEngine>>,
    pub(crate) oracle: Box<dyn DisplayOracle>,
    pub(crate) requests: Vec<WebRequest>,
    pub(crate) script_calls: Vec<String>,
    pub(crate) downloads: Vec<DownloadArtifact>,
    pub(crate) trace: TraceState,
    pub(crate) rng_state: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            contexts: vec![BrowsingContext {
                name: String::new(),
                opener: None,
                rendered: true,
                page: Page::new("about:blank", Document::new()),
                visited: vec!["about:blank".to_string()],
            }],
            current: ContextId(0),
            page_mocks: HashMap::new(),
            transport_mock: MockTransport::default(),
            transport_override: None,
            script_engine: None,
            oracle: Box::new(AttributeDisplayOracle),
            requests: Vec::new(),
            script_calls: Vec::new(),
            downloads: Vec::new(),
            trace: TraceState::default(),
            rng_state: 0x9E37_79B9_7F4A_7C15,
        }
    }

    pub fn with_page(url: &str, document: Document) -> Self {
        let mut session = Self::new();
        session.install_page(ContextId(0), url, document);
        session
    }

    pub fn document(&self) -> &Document {
        &self.context(self.current).page.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        let current = self.current;
        &mut self.context_mut(current).page.document
    }

    pub(crate) fn send_request(&mut self, request: WebRequest) -> Result<WebResponse> {
        self.requests.push(request.clone());
        if let Some(transport) = self.transport_override.as_mut() {
            return transport.send(&request);
        }
        self.transport_mock.respond(&request)
    }

    pub(crate) fn run_script_snippet(&mut self, source: &str) -> Option<String> {
        self.trace_nav_line(format!("[nav] script source={}", truncate_chars(source, 120)));
        self.script_calls.push(source.to_string());
        let engine = self.script_engine.as_mut()?;
        engine.run_snippet(source)
    }

    pub(crate) fn node_label(&self, node: NodeId) -> String {
        let doc = self.document();
        let Some(tag) = doc.tag_name(node) else {
            return format!("node#{}", node.0);
        };
        match doc.attr(node, "id") {
            Some(id) if !id.is_empty() => format!("{tag}#{id}"),
            _ => tag.to_string(),
        }
    }

    pub fn mock_page(&mut self, url: &str, document: Document) {
        self.page_mocks.insert(url.to_string(), Page::new(url, document));
    }

    pub fn set_response(&mut self, url: &str, response: WebResponse) {
        self.transport_mock.routes.insert(url.to_string(), response);
    }

    pub fn set_transport_failure(&mut self, url: &str, message: &str) {
        self.transport_mock
            .failures
            .insert(url.to_string(), message.to_string());
    }

    pub fn set_fallback_response(&mut self, response: WebResponse) {
        self.transport_mock.fallback = Some(response);
    }

    pub fn install_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport_override = Some(transport);
    }

    pub fn install_script_engine(&mut self, engine: Box<dyn ScriptEngine>) {
        self.script_engine = Some(engine);
    }

    pub fn install_display_oracle(&mut self, oracle: Box<dyn DisplayOracle>) {
        self.oracle = oracle;
    }

    pub fn take_requests(&mut self) -> Vec<WebRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn take_downloads(&mut self) -> Vec<DownloadArtifact> {
        std::mem::take(&mut self.downloads)
    }

    pub fn take_script_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.script_calls)
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace.enabled = enabled;
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace.to_stderr = enabled;
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace.events = enabled;
    }

    pub fn set_trace_submit(&mut self, enabled: bool) {
        self.trace.submit = enabled;
    }

    pub fn set_trace_nav(&mut self, enabled: bool) {
        self.trace.nav = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) {
        self.trace.log_limit = max_entries.max(1);
        while self.trace.logs.len() > self.trace.log_limit {
            self.trace.logs.pop_front();
        }
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace.logs).into_iter().collect()
    }

    pub(crate) fn trace_event_line(&mut self, line: String) {
        if self.trace.enabled && self.trace.events {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_submit_line(&mut self, line: String) {
        if self.trace.enabled && self.trace.submit {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_nav_line(&mut self, line: String) {
        if self.trace.enabled && self.trace.nav {
            self.trace_line(line);
        }
    }

    fn trace_line(&mut self, line: String) {
        if !self.trace.enabled {
            return;
        }
        if self.trace.to_stderr {
            eprintln!("{line}");
        }
        if self.trace.logs.len() >= self.trace.log_limit {
            self.trace.logs.pop_front();
        }
        self.trace.logs.push_back(line);
    }

    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng_state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
    }

    pub(crate) fn next_random_f64(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        let scaled = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        (scaled >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<()> {
        let doc = self.document();
        let kind = doc.kind(node);
        let accepts = kind.is_some_and(|k| {
            k.is_text_entry() || k == ElementKind::NumberInput || k == ElementKind::HiddenInput
        });
        if !accepts {
            return Err(Error::TypeMismatch {
                node: self.node_label(node),
                expected: "input or textarea".into(),
                actual: kind
                    .map(|k| format!("{k:?}"))
                    .unwrap_or_else(|| "non-element".into()),
            });
        }
        if doc.is_effectively_disabled(node) || doc.element(node).is_some_and(|e| e.readonly) {
            return Ok(());
        }
        stacker::grow(32 * 1024 * 1024, || {
            let changed = self.document().element(node).is_some_and(|e| e.value != value);
            if changed {
                if let Some(element) = self.document_mut().element_mut(node) {
                    element.value = value.to_string();
                }
                self.dispatch_trusted(node, "input");
                self.dispatch_trusted(node, "change");
            }
            Ok(())
        })
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<()> {
        let doc = self.document();
        let kind = doc.kind(node);
        if !matches!(
            kind,
            Some(ElementKind::Checkbox | ElementKind::RadioButton)
        ) {
            return Err(Error::TypeMismatch {
                node: self.node_label(node),
                expected: "input[type=checkbox|radio]".into(),
                actual: kind
                    .map(|k| format!("{k:?}"))
                    .unwrap_or_else(|| "non-element".into()),
            });
        }
        if doc.is_effectively_disabled(node) {
            return Ok(());
        }
        stacker::grow(32 * 1024 * 1024, || {
            let current = self.document().checked(node) == Some(true);
            if current != checked {
                if kind == Some(ElementKind::RadioButton) && checked {
                    for member in self.document().radio_group(node) {
                        if let Some(element) = self.document_mut().element_mut(member) {
                            element.checked = member == node;
                        }
                    }
                } else if let Some(element) = self.document_mut().element_mut(node) {
                    element.checked = checked;
                }
                self.dispatch_trusted(node, "input");
                self.dispatch_trusted(node, "change");
            }
            Ok(())
        })
    }

    pub fn set_files(&mut self, node: NodeId, files: Vec<SelectedFile>) -> Result<()> {
        let doc = self.document();
        let kind = doc.kind(node);
        if kind != Some(ElementKind::FileInput) {
            return Err(Error::TypeMismatch {
                node: self.node_label(node),
                expected: "input[type=file]".into(),
                actual: kind
                    .map(|k| format!("{k:?}"))
                    .unwrap_or_else(|| "non-element".into()),
            });
        }
        if doc.is_effectively_disabled(node) {
            return Ok(());
        }
        stacker::grow(32 * 1024 * 1024, || {
            let changed = self.document().element(node).is_some_and(|e| e.files != files);
            if changed {
                if let Some(element) = self.document_mut().element_mut(node) {
                    element.files = files;
                }
                self.dispatch_trusted(node, "input");
                self.dispatch_trusted(node, "change");
            }
            Ok(())
        })
    }

    pub fn select_option(&mut self, select: NodeId, option: NodeId) -> Result<()> {
        let doc = self.document();
        if doc.kind(select) != Some(ElementKind::Select) {
            return Err(Error::TypeMismatch {
                node: self.node_label(select),
                expected: "select".into(),
                actual: doc
                    .kind(select)
                    .map(|k| format!("{k:?}"))
                    .unwrap_or_else(|| "non-element".into()),
            });
        }
        if doc.kind(option) != Some(ElementKind::SelectOption)
            || doc.ancestor_of_kind(option, ElementKind::Select) != Some(select)
        {
            return Err(Error::TypeMismatch {
                node: self.node_label(option),
                expected: "option inside the select".into(),
                actual: doc
                    .kind(option)
                    .map(|k| format!("{k:?}"))
                    .unwrap_or_else(|| "non-element".into()),
            });
        }
        if doc.is_effectively_disabled(select) || doc.is_effectively_disabled(option) {
            return Ok(());
        }
        stacker::grow(32 * 1024 * 1024, || {
            let before = self.document().selected_options(select);
            if self.document().has_attr(select, "multiple") {
                if let Some(element) = self.document_mut().element_mut(option) {
                    element.selected = true;
                }
            } else {
                for node in self.document().option_nodes(select) {
                    if let Some(element) = self.document_mut().element_mut(node) {
                        element.selected = node == option;
                    }
                }
            }
            if self.document().selected_options(select) != before {
                self.dispatch_trusted(select, "input");
                self.dispatch_trusted(select, "change");
            }
            Ok(())
        })
    }

    pub fn assert_value(&self, node: NodeId, expected: &str) -> Result<()> {
        let actual = self.document().value(node).unwrap_or_default();
        if actual != expected {
            return Err(Error::AssertionFailed {
                node: self.node_label(node),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.document().node_snippet(node),
            });
        }
        Ok(())
    }

    pub fn assert_checked(&self, node: NodeId, expected: bool) -> Result<()> {
        let actual = self.document().checked(node) == Some(true);
        if actual != expected {
            return Err(Error::AssertionFailed {
                node: self.node_label(node),
                expected: expected.to_string(),
                actual: actual.to_string(),
                dom_snippet: self.document().node_snippet(node),
            });
        }
        Ok(())
    }

    pub fn assert_text(&self, node: NodeId, expected: &str) -> Result<()> {
        let actual = self.document().text_content(node);
        if actual != expected {
            return Err(Error::AssertionFailed {
                node: self.node_label(node),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.document().node_snippet(node),
            });
        }
        Ok(())
    }

    pub fn assert_url(&self, expected: &str) -> Result<()> {
        let actual = self.page_url();
        if actual != expected {
            return Err(Error::AssertionFailed {
                node: "window".to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.document().node_snippet(self.document().root()),
            });
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
