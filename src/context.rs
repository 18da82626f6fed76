use crate::dom::{Document, ElementKind};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub document: Document,
}

impl Page {
    pub fn new(url: &str, document: Document) -> Self {
        Self {
            url: url.to_string(),
            document,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BrowsingContext {
    pub(crate) name: String,
    pub(crate) opener: Option<ContextId>,
    pub(crate) rendered: bool,
    pub(crate) page: Page,
    pub(crate) visited: Vec<String>,
}

impl Session {
    pub fn current_context(&self) -> ContextId {
        self.current
    }

    pub fn set_current_context(&mut self, ctx: ContextId) {
        if ctx.0 < self.contexts.len() {
            self.current = ctx;
        }
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        (0..self.contexts.len()).map(ContextId).collect()
    }

    pub fn context_by_name(&self, name: &str) -> Option<ContextId> {
        if name.is_empty() {
            return None;
        }
        self.contexts
            .iter()
            .position(|ctx| ctx.name == name)
            .map(ContextId)
    }

    pub fn context_name(&self, ctx: ContextId) -> String {
        self.context(ctx).name.clone()
    }

    pub fn context_opener(&self, ctx: ContextId) -> Option<ContextId> {
        self.context(ctx).opener
    }

    pub fn context_rendered(&self, ctx: ContextId) -> bool {
        self.context(ctx).rendered
    }

    pub fn context_url(&self, ctx: ContextId) -> String {
        self.context(ctx).page.url.clone()
    }

    pub fn visited_urls(&self, ctx: ContextId) -> Vec<String> {
        self.context(ctx).visited.clone()
    }

    pub fn page_url(&self) -> String {
        self.context_url(self.current)
    }

    pub fn page_title(&self) -> String {
        self.document().title().to_string()
    }

    pub fn body_text(&self) -> String {
        let doc = self.document();
        let body = doc
            .descendant_elements(doc.root())
            .into_iter()
            .find(|&node| doc.kind(node) == Some(ElementKind::Body));
        doc.text_content(body.unwrap_or(doc.root()))
    }

    pub fn open_window(&mut self, name: &str) -> ContextId {
        let opener = Some(self.current);
        self.open_fresh_context(name, true, opener)
    }

    pub(crate) fn context(&self, ctx: ContextId) -> &BrowsingContext {
        &self.contexts[ctx.0]
    }

    pub(crate) fn context_mut(&mut self, ctx: ContextId) -> &mut BrowsingContext {
        &mut self.contexts[ctx.0]
    }

    pub(crate) fn document_epoch(&self, ctx: ContextId) -> u64 {
        self.context(ctx).page.document.epoch
    }

    pub(crate) fn open_fresh_context(
        &mut self,
        name: &str,
        rendered: bool,
        opener: Option<ContextId>,
    ) -> ContextId {
        let ctx = ContextId(self.contexts.len());
        self.contexts.push(BrowsingContext {
            name: name.to_string(),
            opener,
            rendered,
            page: Page::new("about:blank", Document::new()),
            visited: vec!["about:blank".to_string()],
        });
        self.trace_nav_line(format!(
            "[nav] open context={} name={:?} rendered={}",
            ctx.0, name, rendered
        ));
        ctx
    }

    // `_self`, `_parent` and `_top` all land on the owner because the
    // emulation has no frame tree. Unknown names create a named context.
    pub(crate) fn resolve_target_context(
        &mut self,
        target: Option<&str>,
        owner: ContextId,
    ) -> ContextId {
        let Some(target) = target else {
            return owner;
        };
        let target = target.trim();
        if target.is_empty() || target.eq_ignore_ascii_case("_self") {
            return owner;
        }
        if target.eq_ignore_ascii_case("_parent") || target.eq_ignore_ascii_case("_top") {
            return owner;
        }
        if target.eq_ignore_ascii_case("_blank") {
            return self.open_fresh_context("", true, Some(owner));
        }
        if let Some(existing) = self.context_by_name(target) {
            return existing;
        }
        self.open_fresh_context(target, true, Some(owner))
    }

    pub(crate) fn install_page(&mut self, ctx: ContextId, url: &str, mut document: Document) {
        let slot = self.context_mut(ctx);
        document.epoch = slot.page.document.epoch + 1;
        slot.page = Page::new(url, document);
        slot.visited.push(url.to_string());
        self.trace_nav_line(format!("[nav] load context={} url={}", ctx.0, url));
    }

    pub(crate) fn mocked_document(&self, url: &str) -> Option<Document> {
        self.page_mocks.get(url).map(|page| page.document.clone())
    }

    pub(crate) fn update_fragment(&mut self, ctx: ContextId, url: &str) {
        let slot = self.context_mut(ctx);
        slot.page.url = url.to_string();
        slot.visited.push(url.to_string());
        self.trace_nav_line(format!("[nav] fragment context={} url={}", ctx.0, url));
    }
}
