//! Markdown to HTML conversion.
//!
//! Conversion is a fixed sequence of stages over one document:
//!
//! 1. split off the front-matter ([`front_matter`])
//! 2. lift math spans out of the source ([`math::protect`])
//! 3. parse with pulldown-cmark
//! 4. put math back as opaque inline nodes
//! 5. highlight fenced code ([`highlight`])
//! 6. write HTML
//! 7. run the HTML stages ([`checklist`])
//!
//! Every call starts from scratch and returns a [`Conversion`]; nothing is
//! carried over from one document to the next.

pub mod checklist;
pub mod front_matter;
pub mod highlight;
pub mod math;

use pulldown_cmark::{Event, Options, Parser, TextMergeStream, html};

pub use front_matter::Metadata;

/// Body HTML and metadata of one converted document. They are produced
/// together and only ever stored together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub html: String,
    pub metadata: Metadata,
}

type HtmlStage = fn(&str) -> String;

const HTML_STAGES: &[HtmlStage] = &[checklist::rewrite];

#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: Options,
    syntax_theme: String,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        // Math and task lists are handled by our own stages

        Self {
            options,
            syntax_theme: highlight::DEFAULT_THEME.to_string(),
        }
    }

    pub fn syntax_theme<S: Into<String>>(mut self, theme: S) -> Self {
        self.syntax_theme = theme.into();
        self
    }

    pub fn convert(&self, text: &str) -> Conversion {
        let (metadata, body) = front_matter::split(text);
        let (body, math) = math::protect(body);

        let events: Vec<Event> = TextMergeStream::new(Parser::new_ext(&body, self.options)).collect();
        let events = math.restore_events(events);
        let events = highlight::highlight_events(events, &self.syntax_theme);

        let mut out = String::new();
        html::push_html(&mut out, events.into_iter());

        let out = HTML_STAGES.iter().fold(out, |html, stage| stage(&html));
        let html = math.restore_html(&out);

        Conversion { html, metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(text: &str) -> Conversion {
        MarkdownConverter::new().convert(text)
    }

    #[test]
    fn test_front_matter_and_body() {
        let result = convert("Title: Hello\nTags: a\n    b\n\n# Heading\n\nSome *text*.\n");
        assert_eq!(result.metadata["title"], vec!["Hello"]);
        assert_eq!(result.metadata["tags"], vec!["a", "b"]);
        assert_eq!(result.html, "<h1>Heading</h1>\n<p>Some <em>text</em>.</p>\n");
    }

    #[test]
    fn test_math_is_preserved_verbatim() {
        let result = convert("Cost is \\$5 but $x^2$ is math\n");
        assert_eq!(result.html, "<p>Cost is \\$5 but $x^2$ is math</p>\n");
    }

    #[test]
    fn test_no_emphasis_inside_math() {
        let result = convert("$a_1 * b_1 * c$ and $$x_i_j$$ but *this*\n");
        assert!(result.html.contains("$a_1 * b_1 * c$"));
        assert!(result.html.contains("$$x_i_j$$"));
        assert!(result.html.contains("<em>this</em>"));
        assert_eq!(result.html.matches("<em>").count(), 1);
    }

    #[test]
    fn test_math_with_html_characters_is_escaped() {
        let result = convert("$a<b$\n");
        assert_eq!(result.html, "<p>$a&lt;b$</p>\n");
    }

    #[test]
    fn test_checklist() {
        let result = convert("- [ ] task\n- [x] done\n- [X] shouting\n");
        assert!(result.html.contains(r#"<input type="checkbox" disabled> task"#));
        assert_eq!(result.html.matches("disabled checked").count(), 2);
        assert_eq!(result.html.matches(r#"class="task-list""#).count(), 1);
    }

    #[test]
    fn test_fenced_code_is_highlighted_and_keeps_dollars() {
        let result = convert("```python\nprice = \"$5 and $6\"\n```\n");
        assert!(result.html.starts_with("<pre style="));
        assert!(result.html.contains("$5"));
        assert!(result.html.contains("$6"));
        assert!(!result.html.contains('\u{E000}'));
    }

    #[test]
    fn test_no_state_leaks_between_documents() {
        let converter = MarkdownConverter::new();
        let first = converter.convert("title: First\n\n$x$ body\n");
        let second = converter.convert("Plain body\n");
        assert_eq!(first.metadata["title"], vec!["First"]);
        assert!(second.metadata.is_empty());
        assert_eq!(second.html, "<p>Plain body</p>\n");
    }
}
