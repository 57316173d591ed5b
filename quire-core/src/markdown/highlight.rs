use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Tag, TagEnd};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};

// Initialize syntax highlighting resources once
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(|| SyntaxSet::load_defaults_newlines());
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(|| ThemeSet::load_defaults());

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_token(lang).or_else(|| {
        // Fallback mappings for unsupported languages
        match lang {
            "nix" => SYNTAX_SET.find_syntax_by_name("JavaScript"),
            "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
            "ipython" | "ipython3" => SYNTAX_SET.find_syntax_by_name("Python"),
            _ => None,
        }
    })
}

fn plain_block(lang: &str, code: &str) -> String {
    let code = html_escape::encode_text(code);
    if lang.is_empty() {
        format!("<pre><code>{code}</code></pre>\n")
    } else {
        let lang = html_escape::encode_double_quoted_attribute(lang);
        format!("<pre><code class=\"language-{lang}\">{code}</code></pre>\n")
    }
}

/// Render one fenced block, highlighted when the language is known.
pub fn highlight_block(lang: &str, code: &str, theme: &str) -> String {
    let theme = THEME_SET
        .themes
        .get(theme)
        .or_else(|| THEME_SET.themes.get(DEFAULT_THEME));

    match (find_syntax(lang), theme) {
        (Some(syntax), Some(theme)) => {
            highlighted_html_for_string(code, &SYNTAX_SET, syntax, theme)
                .unwrap_or_else(|_| plain_block(lang, code))
        }
        _ => plain_block(lang, code),
    }
}

/// Replace fenced code blocks in an event stream with highlighted HTML.
///
/// Indented code blocks are left for the HTML writer.
pub fn highlight_events<'a>(events: Vec<Event<'a>>, theme: &str) -> Vec<Event<'a>> {
    let mut processed = Vec::with_capacity(events.len());
    let mut fenced: Option<(String, String)> = None;

    for event in events {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                // Info strings may carry attributes after the language
                let lang = lang.split_whitespace().next().unwrap_or("").to_string();
                fenced = Some((lang, String::new()));
            }
            Event::Text(text) if fenced.is_some() => {
                if let Some((_, code)) = fenced.as_mut() {
                    code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) if fenced.is_some() => {
                if let Some((lang, code)) = fenced.take() {
                    processed.push(Event::Html(highlight_block(&lang, &code, theme).into()));
                }
            }
            other => processed.push(other),
        }
    }

    processed
}
