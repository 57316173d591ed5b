use tera::Context;

use crate::config::SiteInfo;
use crate::site::{Page, PageView};

/// Evaluation context shared by every region of one build stage: the
/// `pages` collection and `site_info`. The `page` key is replaced in place
/// for each page, so the collection is serialized once per stage.
#[derive(Debug, Clone)]
pub struct RenderContext {
    context: Context,
}

impl RenderContext {
    pub fn new(pages: &[Page], site_info: &SiteInfo) -> Self {
        let views: Vec<PageView> = pages.iter().map(Page::view).collect();

        let mut context = Context::new();
        context.insert("pages", &views);
        context.insert("site_info", site_info);

        Self { context }
    }

    pub fn for_page(&mut self, page: &Page) -> &Context {
        self.context.insert("page", &page.view());
        &self.context
    }
}
