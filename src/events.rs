use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::session::Session;

pub type ListenerFn = Rc<dyn Fn(&mut Session, &mut EventState) -> ListenerOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerOutcome {
    #[default]
    Continue,
    Returned(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) capture: bool,
    pub(crate) callback: ListenerFn,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

#[derive(Default, Clone)]
pub(crate) struct ListenerStore {
    pub(crate) map: HashMap<NodeId, HashMap<String, Vec<Listener>>>,
    pub(crate) attr_handlers: HashMap<NodeId, HashMap<String, ListenerFn>>,
}

impl fmt::Debug for ListenerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr_handlers: usize = self.attr_handlers.values().map(|events| events.len()).sum();
        f.debug_struct("ListenerStore")
            .field("map", &self.map)
            .field("attr_handlers", &attr_handlers)
            .finish()
    }
}

impl ListenerStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, node_id: NodeId, event: String, listener: Listener) {
        let listeners = self.map.entry(node_id).or_default().entry(event).or_default();

        // Match browser semantics: dedupe only when the same callback reference
        // is re-registered for the same type/capture pair.
        if listeners.iter().any(|existing| {
            existing.capture == listener.capture
                && Rc::ptr_eq(&existing.callback, &listener.callback)
        }) {
            return;
        }

        listeners.push(listener);
    }

    pub(crate) fn remove(
        &mut self,
        node_id: NodeId,
        event: &str,
        capture: bool,
        callback: &ListenerFn,
    ) -> bool {
        let Some(events) = self.map.get_mut(&node_id) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event) else {
            return false;
        };

        if let Some(pos) = listeners
            .iter()
            .position(|listener| listener.capture == capture && Rc::ptr_eq(&listener.callback, callback))
        {
            listeners.remove(pos);
            if listeners.is_empty() {
                events.remove(event);
            }
            if events.is_empty() {
                self.map.remove(&node_id);
            }
            return true;
        }

        false
    }

    pub(crate) fn get(&self, node_id: NodeId, event: &str, capture: bool) -> Vec<Listener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|listener| listener.capture == capture)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn get_all(&self, node_id: NodeId, event: &str) -> Vec<Listener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set_attr_handler(&mut self, node_id: NodeId, event: String, callback: ListenerFn) {
        self.attr_handlers
            .entry(node_id)
            .or_default()
            .insert(event, callback);
    }

    pub(crate) fn clear_attr_handler(&mut self, node_id: NodeId, event: &str) {
        if let Some(events) = self.attr_handlers.get_mut(&node_id) {
            events.remove(event);
            if events.is_empty() {
                self.attr_handlers.remove(&node_id);
            }
        }
    }

    pub(crate) fn attr_handler(&self, node_id: NodeId, event: &str) -> Option<ListenerFn> {
        self.attr_handlers
            .get(&node_id)
            .and_then(|events| events.get(event))
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct EventState {
    pub(crate) event_type: String,
    pub(crate) target: NodeId,
    pub(crate) current_target: NodeId,
    pub(crate) event_phase: i32,
    pub(crate) default_prevented: bool,
    pub(crate) is_trusted: bool,
    pub(crate) bubbles: bool,
    pub(crate) cancelable: bool,
    pub(crate) shift_key: bool,
    pub(crate) ctrl_key: bool,
    pub(crate) alt_key: bool,
    pub(crate) propagation_stopped: bool,
    pub(crate) immediate_propagation_stopped: bool,
}

fn type_defaults(event_type: &str) -> (bool, bool) {
    match event_type {
        "input" | "change" | "focusin" | "focusout" => (true, false),
        "invalid" => (false, true),
        "focus" | "blur" | "toggle" => (false, false),
        _ => (true, true),
    }
}

impl EventState {
    pub(crate) fn new(event_type: &str, target: NodeId) -> Self {
        let (bubbles, cancelable) = type_defaults(event_type);
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            event_phase: 2,
            default_prevented: false,
            is_trusted: true,
            bubbles,
            cancelable,
            shift_key: false,
            ctrl_key: false,
            alt_key: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    pub(crate) fn new_untrusted(event_type: &str, target: NodeId) -> Self {
        let mut event = Self::new(event_type, target);
        event.is_trusted = false;
        event
    }

    pub(crate) fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.shift_key = modifiers.shift;
        self.ctrl_key = modifiers.ctrl;
        self.alt_key = modifiers.alt;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn event_phase(&self) -> i32 {
        self.event_phase
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn is_trusted(&self) -> bool {
        self.is_trusted
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn shift_key(&self) -> bool {
        self.shift_key
    }

    pub fn ctrl_key(&self) -> bool {
        self.ctrl_key
    }

    pub fn alt_key(&self) -> bool {
        self.alt_key
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }
}

#[derive(Clone, Copy)]
enum DispatchPass {
    Capture,
    Target,
    Bubble,
}

impl DispatchPass {
    fn label(self) -> &'static str {
        match self {
            DispatchPass::Capture => "capture",
            DispatchPass::Target => "target",
            DispatchPass::Bubble => "bubble",
        }
    }
}

impl Session {
    pub fn add_listener(&mut self, node: NodeId, event_type: &str, capture: bool, callback: ListenerFn) {
        self.document_mut().listeners.add(
            node,
            event_type.to_string(),
            Listener { capture, callback },
        );
    }

    pub fn remove_listener(
        &mut self,
        node: NodeId,
        event_type: &str,
        capture: bool,
        callback: &ListenerFn,
    ) -> bool {
        self.document_mut()
            .listeners
            .remove(node, event_type, capture, callback)
    }

    pub fn set_attribute_handler(&mut self, node: NodeId, event_type: &str, callback: ListenerFn) {
        self.document_mut()
            .listeners
            .set_attr_handler(node, event_type.to_string(), callback);
    }

    pub fn clear_attribute_handler(&mut self, node: NodeId, event_type: &str) {
        self.document_mut()
            .listeners
            .clear_attr_handler(node, event_type);
    }

    pub fn dispatch(&mut self, target: NodeId, event_type: &str) -> EventState {
        stacker::grow(32 * 1024 * 1024, || {
            self.dispatch_prepared(EventState::new_untrusted(event_type, target))
        })
    }

    pub(crate) fn dispatch_trusted(&mut self, target: NodeId, event_type: &str) -> EventState {
        self.dispatch_prepared(EventState::new(event_type, target))
    }

    pub(crate) fn dispatch_prepared(&mut self, mut event: EventState) -> EventState {
        let ctx = self.current;
        let epoch = self.document_epoch(ctx);
        let target = event.target;

        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.document().parent(node);
        }
        path.reverse();

        // Capture phase.
        if path.len() >= 2 {
            for node in &path[..path.len() - 1] {
                event.event_phase = 1;
                event.current_target = *node;
                if !self.invoke_listeners(ctx, epoch, *node, &mut event, DispatchPass::Capture) {
                    self.trace_event_done(&event, "document_replaced");
                    return event;
                }
                if event.propagation_stopped {
                    self.trace_event_done(&event, "propagation_stopped");
                    return event;
                }
            }
        }

        // Target phase: one pass in registration order, the capture flag
        // does not matter here.
        event.event_phase = 2;
        event.current_target = target;
        if !self.invoke_listeners(ctx, epoch, target, &mut event, DispatchPass::Target) {
            self.trace_event_done(&event, "document_replaced");
            return event;
        }
        if event.propagation_stopped {
            self.trace_event_done(&event, "propagation_stopped");
            return event;
        }

        // Bubble phase.
        if event.bubbles && path.len() >= 2 {
            for node in path[..path.len() - 1].iter().rev() {
                event.event_phase = 3;
                event.current_target = *node;
                if !self.invoke_listeners(ctx, epoch, *node, &mut event, DispatchPass::Bubble) {
                    self.trace_event_done(&event, "document_replaced");
                    return event;
                }
                if event.propagation_stopped {
                    self.trace_event_done(&event, "propagation_stopped");
                    return event;
                }
            }
        }

        self.trace_event_done(&event, "completed");
        event
    }

    // Returns false when a handler replaced the dispatching document and
    // the rest of the propagation must be abandoned.
    fn invoke_listeners(
        &mut self,
        ctx: crate::context::ContextId,
        epoch: u64,
        node: NodeId,
        event: &mut EventState,
        pass: DispatchPass,
    ) -> bool {
        if self.document_epoch(ctx) != epoch {
            return false;
        }
        let doc = &self.context(ctx).page.document;

        // Attribute handlers never run while capturing; otherwise they go
        // ahead of added listeners.
        let attr_handler = match pass {
            DispatchPass::Capture => None,
            DispatchPass::Target | DispatchPass::Bubble => {
                doc.listeners.attr_handler(node, &event.event_type)
            }
        };
        let listeners = match pass {
            DispatchPass::Capture => doc.listeners.get(node, &event.event_type, true),
            DispatchPass::Target => doc.listeners.get_all(node, &event.event_type),
            DispatchPass::Bubble => doc.listeners.get(node, &event.event_type, false),
        };

        if let Some(handler) = attr_handler {
            self.trace_listener_call(event, pass);
            let outcome = handler(self, event);
            if outcome == ListenerOutcome::Returned(false) {
                event.prevent_default();
            }
            if self.document_epoch(ctx) != epoch {
                return false;
            }
            if event.immediate_propagation_stopped {
                return true;
            }
        }

        for listener in listeners {
            self.trace_listener_call(event, pass);
            let _ = (listener.callback)(self, event);
            if self.document_epoch(ctx) != epoch {
                return false;
            }
            if event.immediate_propagation_stopped {
                break;
            }
        }
        true
    }

    fn trace_listener_call(&mut self, event: &EventState, pass: DispatchPass) {
        if !self.trace.enabled || !self.trace.events {
            return;
        }
        let phase = pass.label();
        let target_label = self.node_label(event.target);
        let current_label = self.node_label(event.current_target);
        self.trace_event_line(format!(
            "[event] {} target={} current={} phase={} default_prevented={}",
            event.event_type, target_label, current_label, phase, event.default_prevented
        ));
    }

    pub(crate) fn trace_event_done(&mut self, event: &EventState, outcome: &str) {
        if !self.trace.enabled || !self.trace.events {
            return;
        }
        let target_label = self.node_label(event.target);
        let current_label = self.node_label(event.current_target);
        self.trace_event_line(format!(
            "[event] done {} target={} current={} outcome={} default_prevented={} propagation_stopped={} immediate_stopped={}",
            event.event_type,
            target_label,
            current_label,
            outcome,
            event.default_prevented,
            event.propagation_stopped,
            event.immediate_propagation_stopped
        ));
    }
}
