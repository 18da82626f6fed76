use crate::context::ContextId;
use crate::dom::{Document, ElementKind, NodeId};
use crate::events::{EventState, Modifiers};
use crate::request::{
    DatumValue, Enctype, FormDatum, Method, RequestBody, SelectedFile, WebRequest,
};
use crate::session::Session;
use crate::url::{self, UrlParts};
use crate::Result;

impl Session {
    pub fn submit(&mut self, form: NodeId) -> Result<ContextId> {
        stacker::grow(32 * 1024 * 1024, || {
            let contexts_before = self.contexts.len();
            self.submit_form(form, None, Modifiers::none(), contexts_before)
        })
    }

    pub fn request_submit(&mut self, form: NodeId, submitter: Option<NodeId>) -> Result<ContextId> {
        if let Some(submitter) = submitter {
            let kind = self.document().kind(submitter);
            if !kind.is_some_and(ElementKind::is_submit_control) {
                return Err(crate::Error::TypeMismatch {
                    node: self.node_label(submitter),
                    expected: "submit button".into(),
                    actual: kind
                        .map(|k| format!("{k:?}"))
                        .unwrap_or_else(|| "non-element".into()),
                });
            }
            if self.document().form_owner(submitter) != Some(form) {
                return Err(crate::Error::TypeMismatch {
                    node: self.node_label(submitter),
                    expected: "submitter owned by the form".into(),
                    actual: "foreign control".into(),
                });
            }
        }
        stacker::grow(32 * 1024 * 1024, || {
            let contexts_before = self.contexts.len();
            self.submit_form(form, submitter, Modifiers::none(), contexts_before)
        })
    }

    pub fn reset(&mut self, form: NodeId) {
        stacker::grow(32 * 1024 * 1024, || self.reset_form(form));
    }

    // `contexts_before` is the caller's baseline for handler-opened windows;
    // for a submit-button click it predates the whole mousedown sequence.
    pub(crate) fn submit_form(
        &mut self,
        form: NodeId,
        submitter: Option<NodeId>,
        modifiers: Modifiers,
        contexts_before: usize,
    ) -> Result<ContextId> {
        let ctx = self.current;
        if self.document().kind(form) != Some(ElementKind::Form) {
            return Ok(ctx);
        }

        let epoch = self.document_epoch(ctx);

        let event = self.dispatch_prepared(EventState::new("submit", form));
        if self.document_epoch(ctx) != epoch {
            return Ok(self.current);
        }
        if event.default_prevented {
            self.trace_submit_line(format!(
                "[submit] cancelled form={}",
                self.node_label(form)
            ));
            return Ok(self.current);
        }

        let no_validate = self.document().has_attr(form, "novalidate")
            || submitter.is_some_and(|s| self.document().has_attr(s, "formnovalidate"));
        if !no_validate {
            let valid = self.run_form_validation(form, true);
            if self.document_epoch(ctx) != epoch {
                return Ok(self.current);
            }
            if !valid {
                self.trace_submit_line(format!(
                    "[submit] blocked_invalid form={}",
                    self.node_label(form)
                ));
                return Ok(self.current);
            }
        }

        let dataset = self.build_form_dataset(form, submitter);

        let doc = self.document();
        let action_attr = submitter
            .and_then(|s| doc.attr(s, "formaction"))
            .or_else(|| doc.attr(form, "action"))
            .unwrap_or_default()
            .to_string();
        let method = Method::parse(
            submitter
                .and_then(|s| doc.attr(s, "formmethod"))
                .or_else(|| doc.attr(form, "method")),
        );
        let enctype = Enctype::parse(
            submitter
                .and_then(|s| doc.attr(s, "formenctype"))
                .or_else(|| doc.attr(form, "enctype")),
        );
        let target_attr = submitter
            .and_then(|s| doc.attr(s, "formtarget"))
            .or_else(|| doc.attr(form, "target"))
            .map(str::to_string);

        let base = self.context_url(ctx);
        let resolved_action = url::resolve_url(&base, &action_attr);

        let request = match method {
            Method::Get => {
                let query = url::serialize_form_urlencoded_pairs(&flatten_for_query(&dataset));
                let target_url = replace_query(&resolved_action, &query);
                WebRequest::get(&target_url)
            }
            Method::Post => match enctype {
                Enctype::UrlEncoded => {
                    let body =
                        url::serialize_form_urlencoded_pairs(&flatten_for_urlencoded(&dataset));
                    WebRequest {
                        method: Method::Post,
                        url: resolved_action.clone(),
                        headers: vec![(
                            "content-type".to_string(),
                            Enctype::UrlEncoded.as_str().to_string(),
                        )],
                        body: RequestBody::UrlEncoded(body),
                    }
                }
                Enctype::Multipart => {
                    let boundary = self.generate_boundary();
                    let bytes = encode_multipart(&dataset, &boundary);
                    WebRequest {
                        method: Method::Post,
                        url: resolved_action.clone(),
                        headers: vec![(
                            "content-type".to_string(),
                            format!("multipart/form-data; boundary={boundary}"),
                        )],
                        body: RequestBody::Multipart { boundary, bytes },
                    }
                }
            },
        };

        self.trace_submit_line(format!(
            "[submit] request method={} enctype={} url={}",
            method.as_str(),
            enctype.as_str(),
            request.url
        ));

        let (target_ctx, modifier_forced) =
            self.pick_activation_target(ctx, contexts_before, modifiers, target_attr.as_deref());
        let target_url = request.url.clone();
        let response = self.send_request(request)?;
        let document = self
            .mocked_document(&target_url)
            .unwrap_or_else(|| Document::with_body_text(&response.body_text()));
        self.install_page(target_ctx, &target_url, document);

        let observed = if modifier_forced { ctx } else { target_ctx };
        self.current = observed;
        Ok(observed)
    }

    pub(crate) fn reset_form(&mut self, form: NodeId) {
        if self.document().kind(form) != Some(ElementKind::Form) {
            return;
        }
        let event = self.dispatch_prepared(EventState::new("reset", form));
        if event.default_prevented {
            return;
        }
        let controls = self.collect_submittable(form);
        for control in controls {
            let Some(kind) = self.document().kind(control) else {
                continue;
            };
            if kind == ElementKind::Select {
                for option in self.document().option_nodes(control) {
                    if let Some(element) = self.document_mut().element_mut(option) {
                        element.selected = element.default_selected;
                    }
                }
                continue;
            }
            if let Some(element) = self.document_mut().element_mut(control) {
                element.checked = element.default_checked;
                element.value = element.default_value.clone();
                element.files.clear();
            }
        }
    }

    // Validates every owned candidate, firing `invalid` on each failure.
    // Submission uses the focus_first form, mirroring interactive validation.
    pub(crate) fn run_form_validation(&mut self, form: NodeId, focus_first: bool) -> bool {
        let controls = self.collect_submittable(form);
        let mut first_invalid = None;
        for control in controls {
            if self.check_control_validity(control) {
                continue;
            }
            if first_invalid.is_none() {
                first_invalid = Some(control);
            }
        }
        let Some(first) = first_invalid else {
            return true;
        };
        if focus_first {
            self.focus(first);
        }
        false
    }

    pub(crate) fn collect_submittable(&self, form: NodeId) -> Vec<NodeId> {
        let doc = self.document();
        doc.descendant_elements(doc.root())
            .into_iter()
            .filter(|&node| doc.kind(node).is_some_and(ElementKind::is_form_control))
            .filter(|&node| doc.form_owner(node) == Some(form))
            .collect()
    }

    pub(crate) fn build_form_dataset(
        &self,
        form: NodeId,
        submitter: Option<NodeId>,
    ) -> Vec<FormDatum> {
        let doc = self.document();
        let mut dataset = Vec::new();
        for control in self.collect_submittable(form) {
            if doc.is_effectively_disabled(control) {
                continue;
            }
            let Some(kind) = doc.kind(control) else {
                continue;
            };
            let name = doc.attr(control, "name").unwrap_or_default().to_string();

            if kind == ElementKind::ImageInput {
                // Image buttons contribute coordinates, only as the submitter.
                if Some(control) == submitter {
                    let (x, y) = if name.is_empty() {
                        ("x".to_string(), "y".to_string())
                    } else {
                        (format!("{name}.x"), format!("{name}.y"))
                    };
                    dataset.push(FormDatum::text(&normalize_crlf(&x), "0"));
                    dataset.push(FormDatum::text(&normalize_crlf(&y), "0"));
                }
                continue;
            }

            if name.is_empty() {
                continue;
            }

            match kind {
                ElementKind::SubmitInput
                | ElementKind::SubmitButton
                | ElementKind::ResetInput
                | ElementKind::ResetButton
                | ElementKind::PlainButton
                | ElementKind::PlainButtonInput => {
                    if Some(control) == submitter {
                        dataset.push(FormDatum::text(
                            &normalize_crlf(&name),
                            &normalize_crlf(&doc.element(control).map(|e| e.value.clone()).unwrap_or_default()),
                        ));
                    }
                }
                ElementKind::Checkbox | ElementKind::RadioButton => {
                    if doc.checked(control) == Some(true) {
                        let value = doc
                            .attr(control, "value")
                            .unwrap_or("on")
                            .to_string();
                        dataset.push(FormDatum::text(&normalize_crlf(&name), &normalize_crlf(&value)));
                    }
                }
                ElementKind::Select => {
                    for option in doc.selected_options(control) {
                        if doc.element(option).is_some_and(|e| e.disabled) {
                            continue;
                        }
                        dataset.push(FormDatum::text(
                            &normalize_crlf(&name),
                            &normalize_crlf(&doc.option_value(option)),
                        ));
                    }
                }
                ElementKind::FileInput => {
                    let files = doc
                        .element(control)
                        .map(|e| e.files.clone())
                        .unwrap_or_default();
                    if files.is_empty() {
                        // An empty selection still submits one empty entry.
                        dataset.push(FormDatum {
                            name: normalize_crlf(&name),
                            value: DatumValue::File(SelectedFile::new("", None, Vec::new())),
                        });
                    } else {
                        for file in files {
                            dataset.push(FormDatum {
                                name: normalize_crlf(&name),
                                value: DatumValue::File(file),
                            });
                        }
                    }
                }
                _ => {
                    let value = doc
                        .element(control)
                        .map(|e| e.value.clone())
                        .unwrap_or_default();
                    dataset.push(FormDatum::text(&normalize_crlf(&name), &normalize_crlf(&value)));
                }
            }
        }
        dataset
    }

    pub(crate) fn generate_boundary(&mut self) -> String {
        const ALPHABET: &[u8; 62] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut suffix = String::with_capacity(16);
        for _ in 0..16 {
            let roll = self.next_random_f64();
            let idx = (roll * ALPHABET.len() as f64) as usize % ALPHABET.len();
            suffix.push(ALPHABET[idx] as char);
        }
        format!("----HeadlessPageBoundary{suffix}")
    }
}

pub(crate) fn normalize_crlf(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                out.push_str("\r\n");
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\n' => out.push_str("\r\n"),
            _ => out.push(ch),
        }
    }
    out
}

// Files never reach a query string.
fn flatten_for_query(dataset: &[FormDatum]) -> Vec<(String, String)> {
    dataset
        .iter()
        .filter_map(|datum| match &datum.value {
            DatumValue::Text(value) => Some((datum.name.clone(), value.clone())),
            DatumValue::File(_) => None,
        })
        .collect()
}

// Without multipart a file entry degrades to its basename.
fn flatten_for_urlencoded(dataset: &[FormDatum]) -> Vec<(String, String)> {
    dataset
        .iter()
        .map(|datum| match &datum.value {
            DatumValue::Text(value) => (datum.name.clone(), value.clone()),
            DatumValue::File(file) => (datum.name.clone(), file.basename().to_string()),
        })
        .collect()
}

fn replace_query(action: &str, query: &str) -> String {
    let Some(mut parts) = UrlParts::parse(action) else {
        let trimmed = action.split(['?', '#']).next().unwrap_or(action);
        if query.is_empty() {
            return trimmed.to_string();
        }
        return format!("{trimmed}?{query}");
    };
    parts.search = url::ensure_search_prefix(query);
    parts.hash.clear();
    parts.href()
}

pub(crate) fn encode_multipart(dataset: &[FormDatum], boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for datum in dataset {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match &datum.value {
            DatumValue::Text(value) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        escape_for_disposition(&datum.name)
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            DatumValue::File(file) => {
                let content_type = file
                    .content_type
                    .clone()
                    .unwrap_or_else(|| part_content_type(file).to_string());
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        escape_for_disposition(&datum.name),
                        escape_for_disposition(file.basename()),
                        content_type
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&file.bytes);
                out.extend_from_slice(b"\r\n");
            }
        }
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

fn part_content_type(file: &SelectedFile) -> &'static str {
    // The no-selection placeholder entry is always an octet stream.
    if file.name.is_empty() && file.bytes.is_empty() {
        return "application/octet-stream";
    }
    crate::request::sniff_content_type(&file.bytes)
}

// Quotes and line breaks never appear raw inside a disposition parameter.
fn escape_for_disposition(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            _ => out.push(ch),
        }
    }
    out
}
