//! Locating the element that receives page HTML.

use std::ops::Range;

use regex::Regex;

/// Where page HTML goes in a template: `text[replace]` becomes
/// `prefix + html + suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub replace: Range<usize>,
    pub prefix: String,
    pub suffix: String,
    /// Number of elements carrying the id; only the first is used
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceError {
    NotFound,
    Unclosed { tag: String },
}

/// Find the element whose `id` is `id` and the point just before its
/// closing tag. A self-closing element is expanded into an open/close pair.
pub fn locate(html: &str, id: &str) -> Result<Insertion, SpliceError> {
    let id = regex::escape(id);
    let opening = Regex::new(&format!(
        r#"<([A-Za-z][A-Za-z0-9-]*)[^>]*?\sid\s*=\s*(?:"{id}"|'{id}'|{id})(?:\s[^>]*|/)?>"#
    ))
    .map_err(|_| SpliceError::NotFound)?;

    let mut found = opening.captures_iter(html);
    let caps = found.next().ok_or(SpliceError::NotFound)?;
    let matches = 1 + found.count();

    let (Some(open), Some(tag)) = (caps.get(0), caps.get(1)) else {
        return Err(SpliceError::NotFound);
    };
    let tag = tag.as_str();

    if open.as_str().ends_with("/>") {
        let open_tag = open.as_str().trim_end_matches("/>").trim_end();
        return Ok(Insertion {
            replace: open.range(),
            prefix: format!("{open_tag}>"),
            suffix: format!("</{tag}>"),
            matches,
        });
    }

    let close = matching_close(html, open.end(), tag).ok_or_else(|| SpliceError::Unclosed {
        tag: tag.to_string(),
    })?;

    Ok(Insertion {
        replace: close..close,
        prefix: String::new(),
        suffix: String::new(),
        matches,
    })
}

/// Offset of the closing tag that balances an element of `tag` opened just
/// before `from`.
fn matching_close(html: &str, from: usize, tag: &str) -> Option<usize> {
    let tags = Regex::new(&format!(r"(?i)<(/?){}\b[^>]*>", regex::escape(tag))).ok()?;
    let mut depth = 1usize;

    for caps in tags.captures_iter(&html[from..]) {
        let whole = caps.get(0)?;
        if !caps[1].is_empty() {
            depth -= 1;
            if depth == 0 {
                return Some(from + whole.start());
            }
        } else if !whole.as_str().ends_with("/>") {
            depth += 1;
        }
    }

    None
}
