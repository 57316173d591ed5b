//! The template engine.
//!
//! A template is literal text with two kinds of regions in it:
//!
//! - expression regions, `{{ page.title }}`, replaced by the value of the
//!   expression;
//! - code regions, `<!--% {% for p in pages %}{{ p.title }} {% endfor %} %-->`,
//!   replaced by whatever the statements write out, minus one trailing
//!   newline.
//!
//! Each region is compiled into its own [`tera`] template and rendered into a
//! fresh buffer. Tera is set up as a sandbox: no autoescaping and no
//! functions that read the clock, the environment or a random source.
//!
//! Region output is never scanned again, so a value that happens to contain
//! `{{` comes through as text.

pub mod region;
pub mod splice;

use std::collections::HashMap;

use tera::{Context, Tera, Value};
use thiserror::Error;
use tracing::warn;

use region::{RegionKind, Segment};
use splice::SpliceError;

const DISABLED_FUNCTIONS: &[&str] = &["now", "get_random", "get_env"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{document}: unterminated region `{region}`")]
    Unterminated { document: String, region: String },

    #[error("{document}: region `{region}` failed: {}", describe(.source))]
    Region {
        document: String,
        region: String,
        #[source]
        source: tera::Error,
    },

    #[error("{document}: no element with id=\"{id}\" to receive page content")]
    MissingInsertionPoint { document: String, id: String },

    #[error("{document}: element <{tag} id=\"{id}\"> is never closed")]
    UnclosedInsertionPoint {
        document: String,
        id: String,
        tag: String,
    },

    #[error("{document}: element with id=\"{id}\" sits inside a template region")]
    InsertionInRegion { document: String, id: String },
}

/// Tera reports the useful part of an error in its source chain.
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Region {
        kind: RegionKind,
        name: String,
        raw: String,
    },
    Body,
}

/// A template document split into text, compiled regions and the point
/// where page HTML goes.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    document: String,
    parts: Vec<Part>,
}

impl CompiledTemplate {
    pub fn region_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::Region { .. }))
            .count()
    }
}

pub struct TemplateEngine {
    tera: Tera,
    compiled: usize,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        for &name in DISABLED_FUNCTIONS {
            tera.register_function(name, move |_: &HashMap<String, Value>| {
                Err(tera::Error::msg(format!(
                    "`{name}` is not available in templates"
                )))
            });
        }

        Self { tera, compiled: 0 }
    }

    /// Compile the shared page template. Every region is checked here, and
    /// so is the element with `insertion_id`, before any page is rendered.
    pub fn compile_template(
        &mut self,
        document: &str,
        text: &str,
        insertion_id: &str,
    ) -> Result<CompiledTemplate, TemplateError> {
        let segments = self.scan(document, text, &[RegionKind::Expression, RegionKind::Code])?;

        let insertion = splice::locate(text, insertion_id).map_err(|err| match err {
            SpliceError::NotFound => TemplateError::MissingInsertionPoint {
                document: document.to_string(),
                id: insertion_id.to_string(),
            },
            SpliceError::Unclosed { tag } => TemplateError::UnclosedInsertionPoint {
                document: document.to_string(),
                id: insertion_id.to_string(),
                tag,
            },
        })?;
        if insertion.matches > 1 {
            warn!(
                "{document}: {} elements have id=\"{insertion_id}\", using the first",
                insertion.matches
            );
        }

        let mut parts = Vec::with_capacity(segments.len() + 3);
        let mut placed = false;

        for segment in segments {
            match segment {
                Segment::Text(span)
                    if !placed
                        && span.start <= insertion.replace.start
                        && insertion.replace.end <= span.end =>
                {
                    push_text(&mut parts, &text[span.start..insertion.replace.start]);
                    push_text(&mut parts, &insertion.prefix);
                    parts.push(Part::Body);
                    push_text(&mut parts, &insertion.suffix);
                    push_text(&mut parts, &text[insertion.replace.end..span.end]);
                    placed = true;
                }
                Segment::Text(span) => push_text(&mut parts, &text[span]),
                Segment::Region { kind, span, body } => {
                    parts.push(self.compile_region(document, kind, &text[span], &text[body])?);
                }
            }
        }

        if !placed {
            return Err(TemplateError::InsertionInRegion {
                document: document.to_string(),
                id: insertion_id.to_string(),
            });
        }

        Ok(CompiledTemplate {
            document: document.to_string(),
            parts,
        })
    }

    /// Render a compiled template for one page: code regions first, then
    /// expression regions, then `body` goes into the insertion element.
    pub fn render(
        &self,
        template: &CompiledTemplate,
        context: &Context,
        body: &str,
    ) -> Result<String, TemplateError> {
        let mut outputs: Vec<Option<String>> = vec![None; template.parts.len()];

        for pass in [RegionKind::Code, RegionKind::Expression] {
            for (index, part) in template.parts.iter().enumerate() {
                if let Part::Region { kind, name, raw } = part {
                    if *kind == pass {
                        outputs[index] =
                            Some(self.evaluate(&template.document, *kind, name, raw, context)?);
                    }
                }
            }
        }

        let mut html = String::new();
        for (part, output) in template.parts.iter().zip(outputs) {
            match part {
                Part::Text(text) => html.push_str(text),
                Part::Body => html.push_str(body),
                Part::Region { .. } => html.push_str(output.as_deref().unwrap_or_default()),
            }
        }

        Ok(html)
    }

    /// Run the code regions of a page source, leaving everything else
    /// (including `{{`) as it is.
    pub fn expand_source(
        &mut self,
        document: &str,
        text: &str,
        context: &Context,
    ) -> Result<String, TemplateError> {
        if !text.contains(region::CODE_OPEN) {
            return Ok(text.to_string());
        }

        let mut expanded = String::with_capacity(text.len());
        for segment in self.scan(document, text, &[RegionKind::Code])? {
            match segment {
                Segment::Text(span) => expanded.push_str(&text[span]),
                Segment::Region { kind, span, body } => {
                    let raw = &text[span];
                    let Part::Region { name, .. } =
                        self.compile_region(document, kind, raw, &text[body])?
                    else {
                        continue;
                    };
                    expanded.push_str(&self.evaluate(document, kind, &name, raw, context)?);
                }
            }
        }

        Ok(expanded)
    }

    fn scan(
        &self,
        document: &str,
        text: &str,
        kinds: &[RegionKind],
    ) -> Result<Vec<Segment>, TemplateError> {
        region::scan(text, kinds).map_err(|err| TemplateError::Unterminated {
            document: document.to_string(),
            region: snippet(&text[err.offset..]),
        })
    }

    fn compile_region(
        &mut self,
        document: &str,
        kind: RegionKind,
        raw: &str,
        body: &str,
    ) -> Result<Part, TemplateError> {
        let source = match kind {
            RegionKind::Expression => format!("{{{{{body}}}}}"),
            RegionKind::Code => body.trim().to_string(),
        };

        self.compiled += 1;
        let name = format!("{document}#{}", self.compiled);
        self.tera
            .add_raw_template(&name, &source)
            .map_err(|source| TemplateError::Region {
                document: document.to_string(),
                region: raw.to_string(),
                source,
            })?;

        Ok(Part::Region {
            kind,
            name,
            raw: raw.to_string(),
        })
    }

    fn evaluate(
        &self,
        document: &str,
        kind: RegionKind,
        name: &str,
        raw: &str,
        context: &Context,
    ) -> Result<String, TemplateError> {
        let mut buffer = Vec::new();
        self.tera
            .render_to(name, context, &mut buffer)
            .map_err(|source| TemplateError::Region {
                document: document.to_string(),
                region: raw.to_string(),
                source,
            })?;

        let output = String::from_utf8_lossy(&buffer).into_owned();
        Ok(match kind {
            RegionKind::Code => match output.strip_suffix('\n') {
                Some(stripped) => stripped.to_string(),
                None => output,
            },
            RegionKind::Expression => output,
        })
    }
}

fn push_text(parts: &mut Vec<Part>, text: &str) {
    if !text.is_empty() {
        parts.push(Part::Text(text.to_string()));
    }
}

/// First line of an unterminated region, for error messages.
fn snippet(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(40) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}
