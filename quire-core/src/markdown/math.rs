//! Protection of `$...$` and `$$...$$` spans from markdown inline processing.
//!
//! Math is pulled out of the source before the markdown parser sees it and
//! replaced by opaque placeholders, so emphasis, escapes and the like never
//! touch TeX. After parsing, each placeholder is swapped back for the original
//! delimited text, ready for a client-side renderer such as MathJax.

use std::sync::OnceLock;

use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::{Captures, Regex};

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| Regex::new(r"\x{E000}(\d+)\x{E001}").unwrap())
}

/// The math spans lifted out of one document, indexed by placeholder number.
#[derive(Debug, Default)]
pub struct MathSpans {
    spans: Vec<String>,
}

impl MathSpans {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn lookup(&self, caps: &Captures) -> Option<&str> {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| self.spans.get(index))
            .map(String::as_str)
    }

    fn restore_raw(&self, text: &str) -> String {
        placeholder()
            .replace_all(text, |caps: &Captures| {
                self.lookup(caps).unwrap_or(&caps[0]).to_string()
            })
            .into_owned()
    }

    /// Put placeholders back into rendered HTML, escaped as text.
    ///
    /// Catches the spans that ended up somewhere other than a text event,
    /// such as link titles and image alt text.
    pub fn restore_html(&self, html: &str) -> String {
        if self.is_empty() {
            return html.to_string();
        }
        placeholder()
            .replace_all(html, |caps: &Captures| match self.lookup(caps) {
                Some(math) => html_escape::encode_text(math).into_owned(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Swap placeholders in the event stream back for the original math.
    ///
    /// In prose each span becomes its own inline HTML node; inside code and
    /// raw HTML the original text is put back untouched.
    pub fn restore_events<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        if self.is_empty() {
            return events;
        }

        let mut result = Vec::with_capacity(events.len());
        let mut in_code_block = false;

        for event in events {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    result.push(Event::Start(Tag::CodeBlock(kind)));
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    result.push(Event::End(TagEnd::CodeBlock));
                }
                Event::Text(text) if in_code_block => {
                    result.push(Event::Text(self.restore_raw(&text).into()));
                }
                Event::Text(text) => self.split_text(&text, &mut result),
                Event::Code(code) => result.push(Event::Code(self.restore_raw(&code).into())),
                Event::Html(html) => result.push(Event::Html(self.restore_raw(&html).into())),
                Event::InlineHtml(html) => {
                    result.push(Event::InlineHtml(self.restore_raw(&html).into()))
                }
                other => result.push(other),
            }
        }

        result
    }

    fn split_text<'a>(&self, text: &CowStr<'a>, out: &mut Vec<Event<'a>>) {
        if !text.contains(OPEN) {
            out.push(Event::Text(text.clone()));
            return;
        }

        let mut last = 0;
        for caps in placeholder().captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(math) = self.lookup(&caps) else { continue };

            if whole.start() > last {
                out.push(Event::Text(text[last..whole.start()].to_string().into()));
            }
            let node = html_escape::encode_text(math).into_owned();
            out.push(Event::InlineHtml(node.into()));
            last = whole.end();
        }
        if last < text.len() {
            out.push(Event::Text(text[last..].to_string().into()));
        }
    }
}

/// Replace every math span in `text` with a placeholder.
///
/// A span opens at `$$` or `$` not preceded by a backslash and closes at the
/// next matching delimiter on the same line; it must enclose at least one
/// character. Fenced code blocks and inline code spans are left alone. An
/// escaped `\$` is doubled up so that it renders as the literal `\$`.
pub fn protect(text: &str) -> (String, MathSpans) {
    let mut spans = MathSpans::default();
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<(char, usize)> = None;

    for line in text.split_inclusive('\n') {
        match fence {
            Some((ch, len)) => {
                if closes_fence(line, ch, len) {
                    fence = None;
                }
                out.push_str(line);
            }
            None => {
                if let Some(opened) = opens_fence(line) {
                    fence = Some(opened);
                    out.push_str(line);
                } else {
                    protect_line(line, &mut out, &mut spans);
                }
            }
        }
    }

    (out, spans)
}

fn protect_line(line: &str, out: &mut String, spans: &mut MathSpans) {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'$') => {
                // never a delimiter, and must survive the parser's escapes
                out.push_str(&line[copied..i]);
                out.push_str("\\\\$");
                i += 2;
                copied = i;
            }
            b'`' => {
                let run = bytes[i..].iter().take_while(|&&b| b == b'`').count();
                i += run;
                if let Some(end) = find_backtick_run(&line[i..], run) {
                    i += end + run;
                }
            }
            b'$' => match find_math(line, i) {
                Some(end) => {
                    out.push_str(&line[copied..i]);
                    out.push(OPEN);
                    out.push_str(&spans.spans.len().to_string());
                    out.push(CLOSE);
                    spans.spans.push(line[i..end].to_string());
                    i = end;
                    copied = end;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    out.push_str(&line[copied..]);
}

/// End offset (exclusive) of the math span starting at `start`, if any.
fn find_math(line: &str, start: usize) -> Option<usize> {
    let delimiters: &[&str] = if line[start..].starts_with("$$") {
        &["$$", "$"]
    } else {
        &["$"]
    };

    delimiters.iter().find_map(|delim| {
        let content = start + delim.len();
        let first = line[content..].chars().next()?;
        if first == '\n' || first == '\r' {
            return None;
        }
        let search_from = content + first.len_utf8();
        let rest = &line[search_from..];
        let close = rest.find(delim)?;
        if rest[..close].contains('\n') {
            return None;
        }
        Some(search_from + close + delim.len())
    })
}

fn find_backtick_run(rest: &str, run: usize) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let len = bytes[i..].iter().take_while(|&&b| b == b'`').count();
            if len == run {
                return Some(i);
            }
            i += len;
        } else {
            i += 1;
        }
    }
    None
}

fn opens_fence(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn closes_fence(line: &str, ch: char, len: usize) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    run >= len && trimmed[run * ch.len_utf8()..].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans_of(text: &str) -> Vec<String> {
        protect(text).1.spans
    }

    #[test]
    fn test_inline_and_display_delimiters() {
        assert_eq!(spans_of("a $x^2$ b"), vec!["$x^2$"]);
        assert_eq!(spans_of("a $$\\sum_i x_i$$ b"), vec!["$$\\sum_i x_i$$"]);
        assert_eq!(spans_of("$a$ and $b$"), vec!["$a$", "$b$"]);
    }

    #[test]
    fn test_escaped_dollar_is_not_a_delimiter() {
        let (text, spans) = protect("Cost is \\$5 but $x^2$ is math");
        assert_eq!(spans.spans, vec!["$x^2$"]);
        assert!(text.starts_with("Cost is \\\\$5 but "));
    }

    #[test]
    fn test_empty_and_unclosed_spans_are_ignored() {
        assert!(spans_of("$$").is_empty());
        assert!(spans_of("just $5 here").is_empty());
        assert!(spans_of("open $x\nclose$").is_empty());
    }

    #[test]
    fn test_code_is_left_alone() {
        assert!(spans_of("use `$x$` literally").is_empty());
        assert!(spans_of("```\n$x$\n```\n").is_empty());
        assert_eq!(spans_of("```\n$x$\n```\nafter $y$\n"), vec!["$y$"]);
    }

    #[test]
    fn test_restore_html_escapes() {
        let (text, spans) = protect("$a<b$");
        assert_eq!(spans.restore_html(&text), "$a&lt;b$");
    }
}
