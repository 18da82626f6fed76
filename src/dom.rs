use std::collections::HashMap;

use crate::events::ListenerStore;
use crate::request::SelectedFile;
use crate::validity::ValidityState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Html,
    Body,
    Div,
    Paragraph,
    Span,
    Anchor,
    Form,
    Label,
    Fieldset,
    Details,
    Summary,
    Select,
    SelectOption,
    TextArea,
    TextInput,
    PasswordInput,
    EmailInput,
    UrlInput,
    NumberInput,
    HiddenInput,
    FileInput,
    Checkbox,
    RadioButton,
    SubmitInput,
    ResetInput,
    ImageInput,
    PlainButtonInput,
    SubmitButton,
    ResetButton,
    PlainButton,
    Generic,
}

impl ElementKind {
    pub fn resolve(tag: &str, type_attr: Option<&str>) -> Self {
        let type_attr = type_attr.map(|t| t.to_ascii_lowercase());
        match tag.to_ascii_lowercase().as_str() {
            "html" => Self::Html,
            "body" => Self::Body,
            "div" => Self::Div,
            "p" => Self::Paragraph,
            "span" => Self::Span,
            "a" => Self::Anchor,
            "form" => Self::Form,
            "label" => Self::Label,
            "fieldset" => Self::Fieldset,
            "details" => Self::Details,
            "summary" => Self::Summary,
            "select" => Self::Select,
            "option" => Self::SelectOption,
            "textarea" => Self::TextArea,
            "button" => match type_attr.as_deref() {
                Some("reset") => Self::ResetButton,
                Some("button") => Self::PlainButton,
                // Missing or unrecognized type means the button submits.
                _ => Self::SubmitButton,
            },
            "input" => match type_attr.as_deref() {
                Some("password") => Self::PasswordInput,
                Some("email") => Self::EmailInput,
                Some("url") => Self::UrlInput,
                Some("number") => Self::NumberInput,
                Some("hidden") => Self::HiddenInput,
                Some("file") => Self::FileInput,
                Some("checkbox") => Self::Checkbox,
                Some("radio") => Self::RadioButton,
                Some("submit") => Self::SubmitInput,
                Some("reset") => Self::ResetInput,
                Some("image") => Self::ImageInput,
                Some("button") => Self::PlainButtonInput,
                // Unrecognized input types behave as plain text fields.
                _ => Self::TextInput,
            },
            _ => Self::Generic,
        }
    }

    pub(crate) fn is_form_control(self) -> bool {
        matches!(
            self,
            Self::Select
                | Self::TextArea
                | Self::TextInput
                | Self::PasswordInput
                | Self::EmailInput
                | Self::UrlInput
                | Self::NumberInput
                | Self::HiddenInput
                | Self::FileInput
                | Self::Checkbox
                | Self::RadioButton
                | Self::SubmitInput
                | Self::ResetInput
                | Self::ImageInput
                | Self::PlainButtonInput
                | Self::SubmitButton
                | Self::ResetButton
                | Self::PlainButton
        )
    }

    pub(crate) fn is_button(self) -> bool {
        matches!(
            self,
            Self::SubmitInput
                | Self::ResetInput
                | Self::ImageInput
                | Self::PlainButtonInput
                | Self::SubmitButton
                | Self::ResetButton
                | Self::PlainButton
        )
    }

    pub(crate) fn is_submit_control(self) -> bool {
        matches!(self, Self::SubmitInput | Self::ImageInput | Self::SubmitButton)
    }

    pub(crate) fn is_reset_control(self) -> bool {
        matches!(self, Self::ResetInput | Self::ResetButton)
    }

    pub(crate) fn is_text_entry(self) -> bool {
        matches!(
            self,
            Self::TextInput
                | Self::PasswordInput
                | Self::EmailInput
                | Self::UrlInput
                | Self::TextArea
        )
    }

    pub(crate) fn is_labelable(self) -> bool {
        self.is_form_control() && self != Self::HiddenInput
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) tag_name: String,
    pub(crate) attrs: HashMap<String, String>,
    pub(crate) value: String,
    pub(crate) checked: bool,
    pub(crate) selected: bool,
    pub(crate) default_value: String,
    pub(crate) default_checked: bool,
    pub(crate) default_selected: bool,
    pub(crate) disabled: bool,
    pub(crate) readonly: bool,
    pub(crate) required: bool,
    pub(crate) hidden: bool,
    pub(crate) files: Vec<SelectedFile>,
    pub(crate) custom_validity: String,
    pub(crate) validity: ValidityState,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) id_index: HashMap<String, NodeId>,
    pub(crate) listeners: ListenerStore,
    pub(crate) active_element: Option<NodeId>,
    pub(crate) title: String,
    pub(crate) epoch: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
            listeners: ListenerStore::new(),
            active_element: None,
            title: String::new(),
            epoch: 0,
        }
    }

    pub fn with_body_text(text: &str) -> Self {
        let mut doc = Self::new();
        let body = doc.ensure_body();
        doc.create_text(body, text);
        doc
    }

    pub fn ensure_body(&mut self) -> NodeId {
        if let Some(body) = self.first_of_kind(ElementKind::Body) {
            return body;
        }
        let html = self
            .first_of_kind(ElementKind::Html)
            .unwrap_or_else(|| self.create_element(self.root, "html", &[]));
        self.create_element(html, "body", &[])
    }

    fn first_of_kind(&self, kind: ElementKind) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|&node| self.kind(node) == Some(kind))
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub fn create_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        if !self.contains(parent) {
            return self.create_detached_element(tag, attrs);
        }
        let element = Self::build_element(tag, attrs);
        let id = self.create_node(Some(parent), NodeType::Element(element));
        if let Some(id_attr) = self
            .element(id)
            .and_then(|element| element.attrs.get("id").cloned())
        {
            self.id_index.insert(id_attr, id);
        }
        id
    }

    pub fn create_detached_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let element = Self::build_element(tag, attrs);
        let id = self.create_node(None, NodeType::Element(element));
        if let Some(id_attr) = self
            .element(id)
            .and_then(|element| element.attrs.get("id").cloned())
        {
            self.id_index.insert(id_attr, id);
        }
        id
    }

    fn build_element(tag: &str, attrs: &[(&str, &str)]) -> Element {
        let mut map = HashMap::new();
        for (name, value) in attrs {
            map.insert(name.to_ascii_lowercase(), (*value).to_string());
        }
        let kind = ElementKind::resolve(tag, map.get("type").map(String::as_str));
        let value = map.get("value").cloned().unwrap_or_default();
        let checked = map.contains_key("checked");
        let selected = map.contains_key("selected");
        Element {
            kind,
            tag_name: tag.to_ascii_lowercase(),
            attrs: map.clone(),
            default_value: value.clone(),
            value,
            checked,
            selected,
            default_checked: checked,
            default_selected: selected,
            disabled: map.contains_key("disabled"),
            readonly: map.contains_key("readonly"),
            required: map.contains_key("required"),
            hidden: map.contains_key("hidden"),
            files: Vec::new(),
            custom_validity: String::new(),
            validity: ValidityState::default(),
        }
    }

    pub fn create_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        if !self.contains(parent) {
            return self.create_node(None, NodeType::Text(text.to_string()));
        }
        // Text under a textarea seeds its value, mirroring how markup does.
        if self.kind(parent) == Some(ElementKind::TextArea) {
            if let Some(element) = self.element_mut(parent) {
                element.value.push_str(text);
                element.default_value.push_str(text);
            }
        }
        self.create_node(Some(parent), NodeType::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        // Prevent cycles: parent must not be inside child's subtree.
        if self.is_descendant_of(parent, child) {
            return;
        }
        if let Some(old_parent) = self.nodes[child.0].parent {
            self.nodes[old_parent.0].children.retain(|&c| c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub(crate) fn contains(&self, node: NodeId) -> bool {
        node.0 < self.nodes.len()
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        if !self.contains(node_id) {
            return None;
        }
        match &self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        if !self.contains(node_id) {
            return None;
        }
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        if !self.contains(node_id) {
            return None;
        }
        self.nodes[node_id.0].parent
    }

    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        if !self.contains(node_id) {
            return &[];
        }
        &self.nodes[node_id.0].children
    }

    pub fn kind(&self, node_id: NodeId) -> Option<ElementKind> {
        self.element(node_id).map(|e| e.kind)
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)
            .and_then(|e| e.attrs.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    pub fn has_attr(&self, node_id: NodeId, name: &str) -> bool {
        self.element(node_id)
            .is_some_and(|e| e.attrs.contains_key(&name.to_ascii_lowercase()))
    }

    pub fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if name == "id" {
            self.id_index.retain(|_, id| *id != node_id);
            self.id_index.insert(value.to_string(), node_id);
        }
        let Some(element) = self.element_mut(node_id) else {
            return;
        };
        element.attrs.insert(name.clone(), value.to_string());
        match name.as_str() {
            "value" => {
                element.default_value = value.to_string();
                element.value = value.to_string();
            }
            "checked" => {
                element.default_checked = true;
                element.checked = true;
            }
            "selected" => {
                element.default_selected = true;
                element.selected = true;
            }
            "disabled" => element.disabled = true,
            "readonly" => element.readonly = true,
            "required" => element.required = true,
            "hidden" => element.hidden = true,
            _ => {}
        }
    }

    pub fn remove_attr(&mut self, node_id: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        if name == "id" {
            self.id_index.retain(|_, id| *id != node_id);
        }
        let Some(element) = self.element_mut(node_id) else {
            return;
        };
        element.attrs.remove(&name);
        match name.as_str() {
            "checked" => {
                element.default_checked = false;
                element.checked = false;
            }
            "selected" => {
                element.default_selected = false;
                element.selected = false;
            }
            "disabled" => element.disabled = false,
            "readonly" => element.readonly = false,
            "required" => element.required = false,
            "hidden" => element.hidden = false,
            _ => {}
        }
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn checked(&self, node_id: NodeId) -> Option<bool> {
        self.element(node_id).map(|e| e.checked)
    }

    pub fn value(&self, node_id: NodeId) -> Option<String> {
        let element = self.element(node_id)?;
        match element.kind {
            ElementKind::Select => Some(self.select_value(node_id)),
            ElementKind::FileInput => {
                let scripted = element
                    .files
                    .first()
                    .map(|file| format!("C:\\fakepath\\{}", file.basename()))
                    .unwrap_or_default();
                Some(scripted)
            }
            ElementKind::SelectOption => Some(self.option_value(node_id)),
            _ => Some(element.value.clone()),
        }
    }

    pub(crate) fn set_value_internal(&mut self, node_id: NodeId, value: &str) {
        if let Some(element) = self.element_mut(node_id) {
            element.value = value.to_string();
        }
    }

    pub fn text_content(&self, node_id: NodeId) -> String {
        if !self.contains(node_id) {
            return String::new();
        }
        match &self.nodes[node_id.0].node_type {
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
        }
    }

    pub fn set_text_content(&mut self, node_id: NodeId, value: &str) {
        if self.element(node_id).is_none() {
            return;
        }
        let old_children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in old_children {
            self.nodes[child.0].parent = None;
        }
        if !value.is_empty() {
            self.create_text(node_id, value);
        }
    }

    pub(crate) fn replace_body_with_text(&mut self, text: &str) {
        let body = self.ensure_body();
        self.set_text_content(body, text);
    }

    pub fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub(crate) fn ancestor_of_kind(&self, node_id: NodeId, kind: ElementKind) -> Option<NodeId> {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if self.kind(current) == Some(kind) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    pub(crate) fn descendant_elements(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.push_descendant_elements(node_id, &mut out);
        out
    }

    fn push_descendant_elements(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        if !self.contains(node_id) {
            return;
        }
        for &child in &self.nodes[node_id.0].children {
            if self.element(child).is_some() {
                out.push(child);
            }
            self.push_descendant_elements(child, out);
        }
    }

    pub(crate) fn is_effectively_disabled(&self, node_id: NodeId) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };
        if element.disabled {
            return true;
        }
        if !element.kind.is_form_control() {
            return false;
        }
        let mut cursor = self.parent(node_id);
        while let Some(parent) = cursor {
            if self.kind(parent) == Some(ElementKind::Fieldset)
                && self.element(parent).is_some_and(|e| e.disabled)
            {
                return true;
            }
            cursor = self.parent(parent);
        }
        false
    }

    pub(crate) fn form_owner(&self, node_id: NodeId) -> Option<NodeId> {
        let element = self.element(node_id)?;
        if !element.kind.is_form_control() && element.kind != ElementKind::SelectOption {
            return None;
        }
        if let Some(form_id) = element.attrs.get("form") {
            // An explicit reference wins outright; dangling means no owner.
            let owner = self.element_by_id(form_id)?;
            return (self.kind(owner) == Some(ElementKind::Form)).then_some(owner);
        }
        self.ancestor_of_kind(node_id, ElementKind::Form)
    }

    pub(crate) fn radio_group(&self, radio: NodeId) -> Vec<NodeId> {
        let name = self.attr(radio, "name").unwrap_or_default().to_string();
        if name.is_empty() {
            return vec![radio];
        }
        let owner = self.form_owner(radio);
        self.descendant_elements(self.root)
            .into_iter()
            .filter(|&node| {
                self.kind(node) == Some(ElementKind::RadioButton)
                    && self.attr(node, "name") == Some(name.as_str())
                    && self.form_owner(node) == owner
            })
            .collect()
    }

    pub(crate) fn label_control(&self, label: NodeId) -> Option<NodeId> {
        if self.kind(label) != Some(ElementKind::Label) {
            return None;
        }
        if let Some(target_id) = self.attr(label, "for") {
            if let Some(target) = self.element_by_id(target_id) {
                if self.kind(target).is_some_and(ElementKind::is_labelable) {
                    return Some(target);
                }
            }
        }
        self.descendant_elements(label)
            .into_iter()
            .find(|&candidate| self.kind(candidate).is_some_and(ElementKind::is_labelable))
    }

    // Only the first summary child of a details element toggles it.
    pub(crate) fn details_for_summary(&self, target: NodeId) -> Option<NodeId> {
        let summary = if self.kind(target) == Some(ElementKind::Summary) {
            Some(target)
        } else {
            self.ancestor_of_kind(target, ElementKind::Summary)
        }?;
        let details = self.parent(summary)?;
        if self.kind(details) != Some(ElementKind::Details) {
            return None;
        }
        let first_summary = self
            .children(details)
            .iter()
            .copied()
            .find(|&child| self.kind(child) == Some(ElementKind::Summary));
        (first_summary == Some(summary)).then_some(details)
    }

    pub(crate) fn option_value(&self, option: NodeId) -> String {
        if let Some(value) = self.attr(option, "value") {
            return value.to_string();
        }
        self.text_content(option).trim().to_string()
    }

    pub(crate) fn option_nodes(&self, select: NodeId) -> Vec<NodeId> {
        self.descendant_elements(select)
            .into_iter()
            .filter(|&node| self.kind(node) == Some(ElementKind::SelectOption))
            .collect()
    }

    pub(crate) fn selected_options(&self, select: NodeId) -> Vec<NodeId> {
        let options = self.option_nodes(select);
        let selected: Vec<NodeId> = options
            .iter()
            .copied()
            .filter(|&node| self.element(node).is_some_and(|e| e.selected))
            .collect();
        if !selected.is_empty() || self.has_attr(select, "multiple") {
            return selected;
        }
        // A single select shows its first enabled option when nothing is marked.
        options
            .into_iter()
            .find(|&node| !self.element(node).is_some_and(|e| e.disabled))
            .into_iter()
            .collect()
    }

    pub(crate) fn select_value(&self, select: NodeId) -> String {
        self.selected_options(select)
            .first()
            .map(|&option| self.option_value(option))
            .unwrap_or_default()
    }

    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        if !self.contains(node_id) {
            return String::new();
        }
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => {
                let mut out = String::new();
                for &child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
            NodeType::Element(element) => {
                let mut out = String::new();
                out.push('<');
                out.push_str(&element.tag_name);
                let mut names: Vec<&String> = element.attrs.keys().collect();
                names.sort();
                for name in names {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&element.attrs[name]);
                    out.push('"');
                }
                out.push('>');
                for &child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(child));
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
                out
            }
        }
    }

    pub(crate) fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dump_node(node_id), 200)
    }
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    let mut it = value.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        let Some(ch) = it.next() else {
            return out;
        };
        out.push(ch);
    }
    if it.next().is_some() {
        out.push_str("...");
    }
    out
}
