//! `Key: value` metadata block at the top of a markdown document.
//!
//! ```text
//! Title: Notes on tides
//! Tags: ocean
//!       moon
//! Date: 2020-01-05
//!
//! Body starts here.
//! ```
//!
//! Keys are lower-cased. A line indented by four or more spaces adds another
//! value to the previous key, so every key maps to a list of values. An
//! optional `---` line may open the block, and `---` or `...` may close it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Front-matter values, keyed by lower-cased name, in source order.
pub type Metadata = BTreeMap<String, Vec<String>>;

static KEY_LINE: OnceLock<Regex> = OnceLock::new();
static MORE_LINE: OnceLock<Regex> = OnceLock::new();
static BEGIN_LINE: OnceLock<Regex> = OnceLock::new();
static END_LINE: OnceLock<Regex> = OnceLock::new();

fn key_line() -> &'static Regex {
    KEY_LINE.get_or_init(|| Regex::new(r"^[ ]{0,3}([A-Za-z0-9_-]+):\s*(.*)").unwrap())
}

fn more_line() -> &'static Regex {
    MORE_LINE.get_or_init(|| Regex::new(r"^[ ]{4,}(.*)").unwrap())
}

fn begin_line() -> &'static Regex {
    BEGIN_LINE.get_or_init(|| Regex::new(r"^-{3}(\s.*)?$").unwrap())
}

fn end_line() -> &'static Regex {
    END_LINE.get_or_init(|| Regex::new(r"^(-{3}|\.{3})(\s.*)?$").unwrap())
}

/// Split a document into its metadata and the remaining markdown body.
///
/// Never fails: a document without a metadata block yields empty metadata
/// and the whole text as the body.
pub fn split(text: &str) -> (Metadata, &str) {
    let mut metadata = Metadata::new();
    let mut current: Option<String> = None;
    let mut offset = 0;
    let mut lines = text.split_inclusive('\n').peekable();

    if let Some(first) = lines.peek() {
        if begin_line().is_match(strip_eol(first)) {
            offset += first.len();
            lines.next();
        }
    }

    for raw in lines {
        let line = strip_eol(raw);

        if line.trim().is_empty() || end_line().is_match(line) {
            offset += raw.len();
            break;
        }

        if let Some(caps) = key_line().captures(line) {
            let key = caps[1].to_lowercase();
            let value = caps[2].trim().to_string();
            metadata.entry(key.clone()).or_default().push(value);
            current = Some(key);
        } else if let (Some(caps), Some(key)) = (more_line().captures(line), current.as_ref()) {
            if let Some(values) = metadata.get_mut(key) {
                values.push(caps[1].trim().to_string());
            }
        } else {
            break;
        }

        offset += raw.len();
    }

    (metadata, &text[offset..])
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_block() {
        let (meta, body) = split("Title: Hello\nDate: 2020-01-05\n\n# Heading\n");
        assert_eq!(meta["title"], vec!["Hello"]);
        assert_eq!(meta["date"], vec!["2020-01-05"]);
        assert_eq!(body, "# Heading\n");
    }

    #[test]
    fn test_multi_valued_keys() {
        let text = "tags: rust\n    markdown\n    notebooks\nauthor: ada\nauthor: grace\n\nbody";
        let (meta, body) = split(text);
        assert_eq!(meta["tags"], vec!["rust", "markdown", "notebooks"]);
        assert_eq!(meta["author"], vec!["ada", "grace"]);
        assert_eq!(body, "body");
    }

    #[test]
    fn test_yaml_style_fences() {
        let (meta, body) = split("---\ntitle: Fenced\n---\nText\n");
        assert_eq!(meta["title"], vec!["Fenced"]);
        assert_eq!(body, "Text\n");
    }

    #[test]
    fn test_no_front_matter() {
        let text = "# Just a heading\n\nSome text.";
        let (meta, body) = split(text);
        assert!(meta.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn test_non_key_line_ends_block_and_stays_in_body() {
        let (meta, body) = split("title: x\nnot a key line\nmore\n");
        assert_eq!(meta["title"], vec!["x"]);
        assert_eq!(body, "not a key line\nmore\n");
    }

    #[test]
    fn test_crlf_line_endings() {
        let (meta, body) = split("Title: Windows\r\n\r\nBody\r\n");
        assert_eq!(meta["title"], vec!["Windows"]);
        assert_eq!(body, "Body\r\n");
    }

    #[test]
    fn test_empty_value_then_continuation() {
        let (meta, _) = split("tags:\n    one\n    two\n\n");
        assert_eq!(meta["tags"], vec!["", "one", "two"]);
    }
}
