//! Task list rendering: `- [ ] todo` and `- [x] done` list items become
//! disabled checkboxes.

use std::sync::OnceLock;

use regex::{Captures, Regex};

pub const ITEM_CLASS: &str = "task-list-item";
pub const LIST_CLASS: &str = "task-list";

static ITEM: OnceLock<Regex> = OnceLock::new();
static LIST_TAG: OnceLock<Regex> = OnceLock::new();

fn item() -> &'static Regex {
    ITEM.get_or_init(|| Regex::new(r"<li>\[([ Xx])\]").unwrap())
}

fn list_tag() -> &'static Regex {
    LIST_TAG.get_or_init(|| Regex::new(r"<(/?)(ul|ol)\b[^>]*>").unwrap())
}

/// Rewrite checklist items in rendered HTML.
///
/// Only the first list holding a checklist item is tagged with
/// [`LIST_CLASS`]; every item gets [`ITEM_CLASS`].
pub fn rewrite(html: &str) -> String {
    let html = item().replace_all(html, |caps: &Captures| {
        let checked = if &caps[1] == " " { "" } else { " checked" };
        format!(r#"<li class="{ITEM_CLASS}"><input type="checkbox" disabled{checked}>"#)
    });

    let marker = format!(r#"<li class="{ITEM_CLASS}">"#);
    let Some(first_item) = html.find(&marker) else {
        return html.into_owned();
    };

    match enclosing_list(&html[..first_item]) {
        Some(name_end) => {
            let mut out = String::with_capacity(html.len() + LIST_CLASS.len() + 9);
            out.push_str(&html[..name_end]);
            out.push_str(&format!(r#" class="{LIST_CLASS}""#));
            out.push_str(&html[name_end..]);
            out
        }
        None => html.into_owned(),
    }
}

/// Offset just past the tag name of the innermost list still open at the
/// end of `before`.
fn enclosing_list(before: &str) -> Option<usize> {
    let mut open: Vec<usize> = Vec::new();
    for caps in list_tag().captures_iter(before) {
        if caps[1].is_empty() {
            let name = caps.get(2)?;
            open.push(name.end());
        } else {
            open.pop();
        }
    }
    open.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchecked_and_checked_items() {
        let html = "<ul>\n<li>[ ] todo</li>\n<li>[x] done</li>\n<li>[X] also done</li>\n</ul>\n";
        let out = rewrite(html);
        assert!(out.contains(r#"<li class="task-list-item"><input type="checkbox" disabled> todo</li>"#));
        assert!(out.contains(r#"<li class="task-list-item"><input type="checkbox" disabled checked> done</li>"#));
        assert!(out.contains(r#"<input type="checkbox" disabled checked> also done"#));
        assert_eq!(out.matches(r#"class="task-list""#).count(), 1);
        assert!(out.starts_with(r#"<ul class="task-list">"#));
    }

    #[test]
    fn test_only_first_list_is_marked() {
        let html = "<ul>\n<li>[ ] a</li>\n</ul>\n<p>gap</p>\n<ul>\n<li>[ ] b</li>\n</ul>\n";
        let out = rewrite(html);
        assert_eq!(out.matches(r#"class="task-list""#).count(), 1);
        assert_eq!(out.matches(r#"class="task-list-item""#).count(), 2);
    }

    #[test]
    fn test_enclosing_list_skips_closed_nested_lists() {
        let html = "<ul>\n<li>plain\n<ul>\n<li>nested</li>\n</ul>\n</li>\n<li>[ ] task</li>\n</ul>\n";
        let out = rewrite(html);
        assert!(out.starts_with(r#"<ul class="task-list">"#));
        assert!(out.contains("<ul>\n<li>nested"));
    }

    #[test]
    fn test_ordered_list_with_start() {
        let out = rewrite("<ol start=\"3\">\n<li>[ ] third</li>\n</ol>\n");
        assert!(out.starts_with(r#"<ol class="task-list" start="3">"#));
    }

    #[test]
    fn test_plain_lists_untouched() {
        let html = "<ul>\n<li>no box</li>\n</ul>\n";
        assert_eq!(rewrite(html), html);
    }
}
