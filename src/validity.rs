use fancy_regex::Regex;

use crate::dom::{Document, ElementKind, NodeId};
use crate::session::Session;
use crate::url::UrlParts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidityState {
    pub value_missing: bool,
    pub type_mismatch: bool,
    pub pattern_mismatch: bool,
    pub too_long: bool,
    pub too_short: bool,
    pub range_underflow: bool,
    pub range_overflow: bool,
    pub step_mismatch: bool,
    pub bad_input: bool,
    pub custom_error: bool,
}

impl ValidityState {
    pub fn valid(&self) -> bool {
        !self.value_missing
            && !self.type_mismatch
            && !self.pattern_mismatch
            && !self.too_long
            && !self.too_short
            && !self.range_underflow
            && !self.range_overflow
            && !self.step_mismatch
            && !self.bad_input
            && !self.custom_error
    }
}

pub(crate) fn compute_validity(doc: &Document, node: NodeId) -> ValidityState {
    let mut state = ValidityState::default();
    let Some(element) = doc.element(node) else {
        return state;
    };
    state.custom_error = !element.custom_validity.is_empty();

    let kind = element.kind;
    if kind.is_text_entry() {
        let value = element.value.as_str();
        if element.required && value.is_empty() {
            state.value_missing = true;
        }
        let chars = value.chars().count();
        if let Some(max) = parse_length_attr(doc.attr(node, "maxlength")) {
            if chars > max {
                state.too_long = true;
            }
        }
        if let Some(min) = parse_length_attr(doc.attr(node, "minlength")) {
            if !value.is_empty() && chars < min {
                state.too_short = true;
            }
        }
        if kind != ElementKind::TextArea {
            if let Some(pattern) = doc.attr(node, "pattern") {
                if pattern_mismatches(pattern, value.trim()) {
                    state.pattern_mismatch = true;
                }
            }
        }
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            match kind {
                ElementKind::EmailInput if !is_valid_email(trimmed) => {
                    state.type_mismatch = true;
                }
                ElementKind::UrlInput if UrlParts::parse(trimmed).is_none() => {
                    state.type_mismatch = true;
                }
                _ => {}
            }
        }
        return state;
    }

    match kind {
        ElementKind::NumberInput => {
            let value = element.value.trim();
            if element.required && value.is_empty() {
                state.value_missing = true;
            }
            if !value.is_empty() {
                match parse_float(value) {
                    None => state.bad_input = true,
                    Some(number) => {
                        let min = doc.attr(node, "min").and_then(parse_float_attr);
                        let max = doc.attr(node, "max").and_then(parse_float_attr);
                        if let Some(min) = min {
                            if number < min {
                                state.range_underflow = true;
                            }
                        }
                        if let Some(max) = max {
                            if number > max {
                                state.range_overflow = true;
                            }
                        }
                        if let Some(step) = parse_step_attr(doc.attr(node, "step")) {
                            let base = min.unwrap_or(0.0);
                            if step_mismatches(number, base, step) {
                                state.step_mismatch = true;
                            }
                        }
                    }
                }
            }
        }
        ElementKind::Checkbox => {
            if element.required && !element.checked {
                state.value_missing = true;
            }
        }
        ElementKind::RadioButton => {
            // An unchecked group with any required member leaves every
            // member missing a value.
            let group = doc.radio_group(node);
            let group_required = group
                .iter()
                .any(|&member| doc.element(member).is_some_and(|e| e.required));
            let any_checked = group
                .iter()
                .any(|&member| doc.element(member).is_some_and(|e| e.checked));
            if group_required && !any_checked {
                state.value_missing = true;
            }
        }
        ElementKind::Select => {
            if element.required && doc.select_value(node).is_empty() {
                state.value_missing = true;
            }
        }
        ElementKind::FileInput => {
            if element.required && element.files.is_empty() {
                state.value_missing = true;
            }
        }
        _ => {}
    }
    state
}

// Structural half of willValidate; the session adds the display oracle.
pub(crate) fn is_validation_candidate(doc: &Document, node: NodeId) -> bool {
    let Some(element) = doc.element(node) else {
        return false;
    };
    let kind = element.kind;
    if !kind.is_form_control() {
        return false;
    }
    if kind == ElementKind::HiddenInput || kind.is_button() {
        return false;
    }
    if doc.is_effectively_disabled(node) {
        return false;
    }
    if element.readonly && (kind.is_text_entry() || kind == ElementKind::NumberInput) {
        return false;
    }
    true
}

fn parse_length_attr(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.trim().parse::<usize>().ok())
}

fn parse_float(value: &str) -> Option<f64> {
    let number = value.parse::<f64>().ok()?;
    number.is_finite().then_some(number)
}

fn parse_float_attr(value: &str) -> Option<f64> {
    parse_float(value.trim())
}

fn parse_step_attr(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.eq_ignore_ascii_case("any") {
        return None;
    }
    let step = parse_float(value)?;
    (step > 0.0).then_some(step)
}

fn step_mismatches(number: f64, base: f64, step: f64) -> bool {
    let diff = number - base;
    let steps = (diff / step).round();
    (diff - steps * step).abs() > 1e-9
}

fn pattern_mismatches(pattern: &str, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let anchored = format!("^(?:{pattern})$");
    // A pattern that does not compile constrains nothing.
    let Ok(regex) = Regex::new(&anchored) else {
        return false;
    };
    !regex.is_match(value).unwrap_or(true)
}

fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    let local_ok = local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-/=?^_`{|}~.".contains(&b));
    if !local_ok {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

impl Session {
    pub fn validity(&mut self, node: NodeId) -> ValidityState {
        self.recompute_validity(node)
    }

    pub fn will_validate(&self, node: NodeId) -> bool {
        let doc = self.document();
        is_validation_candidate(doc, node) && self.oracle.is_displayed(doc, node)
    }

    pub fn check_validity(&mut self, node: NodeId) -> bool {
        if self.document().kind(node) == Some(ElementKind::Form) {
            return self.run_form_validation(node, false);
        }
        self.check_control_validity(node)
    }

    pub fn report_validity(&mut self, node: NodeId) -> bool {
        if self.document().kind(node) == Some(ElementKind::Form) {
            return self.run_form_validation(node, true);
        }
        let ok = self.check_control_validity(node);
        if !ok {
            self.focus(node);
        }
        ok
    }

    pub fn set_custom_validity(&mut self, node: NodeId, message: &str) {
        if let Some(element) = self.document_mut().element_mut(node) {
            element.custom_validity = message.to_string();
            element.validity.custom_error = !message.is_empty();
        }
    }

    pub fn custom_validity(&self, node: NodeId) -> String {
        self.document()
            .element(node)
            .map(|e| e.custom_validity.clone())
            .unwrap_or_default()
    }

    pub(crate) fn recompute_validity(&mut self, node: NodeId) -> ValidityState {
        let state = compute_validity(self.document(), node);
        if let Some(element) = self.document_mut().element_mut(node) {
            element.validity = state;
        }
        state
    }

    // Fires `invalid` on a failing candidate; returns true when the control
    // does not block submission.
    pub(crate) fn check_control_validity(&mut self, node: NodeId) -> bool {
        if !self.will_validate(node) {
            return true;
        }
        if self.recompute_validity(node).valid() {
            return true;
        }
        self.dispatch_trusted(node, "invalid");
        false
    }
}
