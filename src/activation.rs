use crate::context::ContextId;
use crate::dom::{Document, ElementKind, NodeId};
use crate::events::{EventState, Modifiers};
use crate::request::{DownloadArtifact, WebRequest};
use crate::session::Session;
use crate::url;
use crate::Result;

enum ActionOutcome {
    Consumed,
    Passthrough,
    NotHandled,
}

impl Session {
    pub fn click(&mut self, node: NodeId) -> Result<ContextId> {
        self.click_with(node, Modifiers::none())
    }

    pub fn click_with(&mut self, node: NodeId, modifiers: Modifiers) -> Result<ContextId> {
        stacker::grow(32 * 1024 * 1024, || self.click_node(node, modifiers))
    }

    pub fn dbl_click(&mut self, node: NodeId) -> Result<ContextId> {
        stacker::grow(32 * 1024 * 1024, || {
            let ctx = self.current;
            let epoch = self.document_epoch(ctx);
            self.click_node(node, Modifiers::none())?;
            if self.current != ctx || self.document_epoch(ctx) != epoch {
                return Ok(self.current);
            }
            self.click_node(node, Modifiers::none())?;
            if self.current != ctx || self.document_epoch(ctx) != epoch {
                return Ok(self.current);
            }
            self.dispatch_prepared(EventState::new("dblclick", node));
            Ok(self.current)
        })
    }

    pub fn focus(&mut self, node: NodeId) {
        stacker::grow(32 * 1024 * 1024, || self.focus_node(node));
    }

    pub fn blur(&mut self, node: NodeId) {
        stacker::grow(32 * 1024 * 1024, || self.blur_node(node));
    }

    pub(crate) fn click_node(&mut self, target: NodeId, modifiers: Modifiers) -> Result<ContextId> {
        let ctx = self.current;
        if !self.is_clickable(target) {
            return Ok(ctx);
        }
        let contexts_before = self.contexts.len();
        let epoch = self.document_epoch(ctx);

        let down =
            self.dispatch_prepared(EventState::new("mousedown", target).with_modifiers(modifiers));
        if self.document_epoch(ctx) != epoch {
            return Ok(self.current);
        }
        // A cancelled mousedown keeps focus where it is; the click still runs.
        if !down.default_prevented {
            if let Some(focus_target) = self.focus_target_for_click(target) {
                self.focus_node(focus_target);
                if self.document_epoch(ctx) != epoch {
                    return Ok(self.current);
                }
            }
        }

        self.dispatch_prepared(EventState::new("mouseup", target).with_modifiers(modifiers));
        if self.document_epoch(ctx) != epoch {
            return Ok(self.current);
        }

        let click =
            self.dispatch_prepared(EventState::new("click", target).with_modifiers(modifiers));
        if self.document_epoch(ctx) != epoch {
            return Ok(self.current);
        }
        if click.default_prevented {
            return Ok(self.current);
        }

        self.run_default_actions(target, modifiers, contexts_before)?;
        Ok(self.current)
    }

    fn is_clickable(&self, target: NodeId) -> bool {
        let doc = self.document();
        if doc.kind(target).is_none() {
            return false;
        }
        if target != doc.root() && !doc.is_descendant_of(target, doc.root()) {
            return false;
        }
        // A disabled ancestor silences the whole subtree.
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            if doc.is_effectively_disabled(node) {
                return false;
            }
            cursor = doc.parent(node);
        }
        true
    }

    fn focus_target_for_click(&self, target: NodeId) -> Option<NodeId> {
        let doc = self.document();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            if self.is_focusable(node) {
                return Some(node);
            }
            cursor = doc.parent(node);
        }
        None
    }

    pub(crate) fn is_focusable(&self, node: NodeId) -> bool {
        let doc = self.document();
        let Some(kind) = doc.kind(node) else {
            return false;
        };
        if doc.is_effectively_disabled(node) || doc.element(node).is_some_and(|e| e.hidden) {
            return false;
        }
        if doc.has_attr(node, "tabindex") {
            return true;
        }
        if kind == ElementKind::Anchor {
            return doc.has_attr(node, "href");
        }
        kind.is_form_control() && kind != ElementKind::HiddenInput
    }

    pub(crate) fn focus_node(&mut self, node: NodeId) {
        if self.document().is_effectively_disabled(node) {
            return;
        }
        if self.document().active_element == Some(node) {
            return;
        }
        if let Some(current) = self.document().active_element {
            self.blur_node(current);
        }
        self.document_mut().active_element = Some(node);
        self.dispatch_prepared(EventState::new("focusin", node));
        self.dispatch_prepared(EventState::new("focus", node));
    }

    pub(crate) fn blur_node(&mut self, node: NodeId) {
        if self.document().active_element != Some(node) {
            return;
        }
        self.dispatch_prepared(EventState::new("focusout", node));
        self.dispatch_prepared(EventState::new("blur", node));
        self.document_mut().active_element = None;
    }

    // Innermost action first. Toggles let an enclosing anchor still
    // navigate; everything else swallows the click.
    fn run_default_actions(
        &mut self,
        origin: NodeId,
        modifiers: Modifiers,
        contexts_before: usize,
    ) -> Result<()> {
        let ctx = self.current;
        let epoch = self.document_epoch(ctx);
        let mut anchors_only = false;
        let mut cursor = Some(origin);
        while let Some(node) = cursor {
            cursor = self.document().parent(node);
            if self.document().is_effectively_disabled(node) {
                continue;
            }
            if anchors_only && self.document().kind(node) != Some(ElementKind::Anchor) {
                continue;
            }
            let outcome = self.run_element_action(node, origin, modifiers, contexts_before)?;
            if self.current != ctx || self.document_epoch(ctx) != epoch {
                return Ok(());
            }
            match outcome {
                ActionOutcome::Consumed => return Ok(()),
                ActionOutcome::Passthrough => anchors_only = true,
                ActionOutcome::NotHandled => {}
            }
        }
        Ok(())
    }

    fn run_element_action(
        &mut self,
        node: NodeId,
        origin: NodeId,
        modifiers: Modifiers,
        contexts_before: usize,
    ) -> Result<ActionOutcome> {
        let Some(kind) = self.document().kind(node) else {
            return Ok(ActionOutcome::NotHandled);
        };
        match kind {
            ElementKind::Checkbox => {
                let next = self.document().checked(node) != Some(true);
                if let Some(element) = self.document_mut().element_mut(node) {
                    element.checked = next;
                }
                self.dispatch_prepared(EventState::new("input", node));
                self.dispatch_prepared(EventState::new("change", node));
                Ok(ActionOutcome::Passthrough)
            }
            ElementKind::RadioButton => {
                if self.document().checked(node) == Some(true) {
                    return Ok(ActionOutcome::Passthrough);
                }
                for member in self.document().radio_group(node) {
                    if let Some(element) = self.document_mut().element_mut(member) {
                        element.checked = member == node;
                    }
                }
                self.dispatch_prepared(EventState::new("input", node));
                self.dispatch_prepared(EventState::new("change", node));
                Ok(ActionOutcome::Passthrough)
            }
            ElementKind::SelectOption => {
                let doc = self.document();
                let Some(select) = doc.ancestor_of_kind(node, ElementKind::Select) else {
                    return Ok(ActionOutcome::Passthrough);
                };
                let multiple = doc.has_attr(select, "multiple");
                let before = doc.selected_options(select);
                if multiple {
                    if let Some(element) = self.document_mut().element_mut(node) {
                        element.selected = !element.selected;
                    }
                } else {
                    for option in self.document().option_nodes(select) {
                        if let Some(element) = self.document_mut().element_mut(option) {
                            element.selected = option == node;
                        }
                    }
                }
                if self.document().selected_options(select) != before {
                    self.dispatch_prepared(EventState::new("input", select));
                    self.dispatch_prepared(EventState::new("change", select));
                }
                Ok(ActionOutcome::Passthrough)
            }
            ElementKind::Summary => {
                let Some(details) = self.document().details_for_summary(node) else {
                    return Ok(ActionOutcome::NotHandled);
                };
                if self.document().has_attr(details, "open") {
                    self.document_mut().remove_attr(details, "open");
                } else {
                    self.document_mut().set_attr(details, "open", "true");
                }
                self.dispatch_prepared(EventState::new("toggle", details));
                Ok(ActionOutcome::Passthrough)
            }
            // No built-in chooser; selection arrives through set_files.
            ElementKind::FileInput => Ok(ActionOutcome::Passthrough),
            ElementKind::SubmitInput | ElementKind::SubmitButton | ElementKind::ImageInput => {
                if let Some(form) = self.document().form_owner(node) {
                    self.submit_form(form, Some(node), modifiers, contexts_before)?;
                }
                Ok(ActionOutcome::Consumed)
            }
            ElementKind::ResetInput | ElementKind::ResetButton => {
                if let Some(form) = self.document().form_owner(node) {
                    self.reset_form(form);
                }
                Ok(ActionOutcome::Consumed)
            }
            ElementKind::PlainButton | ElementKind::PlainButtonInput => {
                Ok(ActionOutcome::Consumed)
            }
            ElementKind::Label => {
                let Some(control) = self.document().label_control(node) else {
                    return Ok(ActionOutcome::NotHandled);
                };
                if control == origin {
                    return Ok(ActionOutcome::NotHandled);
                }
                self.click_node(control, modifiers)?;
                Ok(ActionOutcome::Consumed)
            }
            ElementKind::Anchor => {
                if !self.document().has_attr(node, "href") {
                    return Ok(ActionOutcome::NotHandled);
                }
                self.activate_anchor(node, modifiers, contexts_before)?;
                Ok(ActionOutcome::Consumed)
            }
            _ => Ok(ActionOutcome::NotHandled),
        }
    }

    fn activate_anchor(
        &mut self,
        anchor: NodeId,
        modifiers: Modifiers,
        contexts_before: usize,
    ) -> Result<()> {
        let ctx = self.current;
        let Some(href) = self.document().attr(anchor, "href").map(str::to_string) else {
            return Ok(());
        };

        if let Some(source) = url::javascript_source(&href) {
            if let Some(text) = self.run_script_snippet(&source) {
                self.document_mut().replace_body_with_text(&text);
            }
            return Ok(());
        }

        let base = self.context_url(ctx);
        let resolved = url::resolve_url(&base, &href);

        if self.document().has_attr(anchor, "download") {
            return self.download_link(anchor, &resolved);
        }

        let target_attr = self.document().attr(anchor, "target").map(str::to_string);
        let (target_ctx, modifier_forced) =
            self.pick_activation_target(ctx, contexts_before, modifiers, target_attr.as_deref());

        if target_ctx == ctx
            && !modifier_forced
            && url::is_fragment_only_navigation(&self.context_url(ctx), &resolved)
        {
            self.update_fragment(ctx, &resolved);
            return Ok(());
        }

        let response = self.send_request(WebRequest::get(&resolved))?;
        let document = self
            .mocked_document(&resolved)
            .unwrap_or_else(|| Document::with_body_text(&response.body_text()));
        self.install_page(target_ctx, &resolved, document);

        self.current = if modifier_forced { ctx } else { target_ctx };
        Ok(())
    }

    fn download_link(&mut self, anchor: NodeId, resolved: &str) -> Result<()> {
        let response = self.send_request(WebRequest::get(resolved))?;
        let filename = self
            .document()
            .attr(anchor, "download")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| url_basename(resolved));
        let mime_type = response
            .content_type
            .clone()
            .or_else(|| Some(crate::request::sniff_content_type(&response.body).to_string()));
        self.trace_nav_line(format!(
            "[nav] download url={} filename={:?}",
            resolved, filename
        ));
        self.downloads.push(DownloadArtifact {
            filename,
            mime_type,
            bytes: response.body.clone(),
        });

        // The saved response also lands in an offscreen context; the
        // caller's page stays where it is.
        let target_ctx = self.open_fresh_context("", false, Some(self.current));
        let document = self
            .mocked_document(resolved)
            .unwrap_or_else(|| Document::with_body_text(&response.body_text()));
        self.install_page(target_ctx, resolved, document);
        Ok(())
    }

    // Precedence: a window a handler opened mid-dispatch, then modifier
    // keys, then the target attribute, then the owner context.
    pub(crate) fn pick_activation_target(
        &mut self,
        owner: ContextId,
        contexts_before: usize,
        modifiers: Modifiers,
        target_attr: Option<&str>,
    ) -> (ContextId, bool) {
        if self.contexts.len() > contexts_before {
            return (ContextId(self.contexts.len() - 1), false);
        }
        if modifiers.ctrl || modifiers.shift {
            return (self.open_fresh_context("", true, Some(owner)), true);
        }
        (self.resolve_target_context(target_attr, owner), false)
    }
}

fn url_basename(url: &str) -> Option<String> {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let tail = path.rsplit('/').next().unwrap_or("");
    if tail.is_empty() || tail.contains(':') {
        return None;
    }
    Some(tail.to_string())
}
