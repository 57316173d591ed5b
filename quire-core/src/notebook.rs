//! Jupyter notebook (nbformat 4) export to markdown.
//!
//! Markdown cells are copied through, code cells become fenced blocks
//! followed by their outputs. Image outputs are returned as separate
//! resources and linked from the markdown by file name, so they have to be
//! written next to the page that embeds them. Resource names start with the
//! notebook's stem so sibling notebooks never share one.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("invalid notebook JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cell {cell}: could not decode {mime} output: {source}")]
    Decode {
        cell: usize,
        mime: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// A notebook rendered to markdown, plus the binary outputs it links to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Export {
    pub markdown: String,
    pub resources: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: NotebookMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct NotebookMetadata {
    #[serde(default)]
    language_info: Option<NamedLanguage>,
    #[serde(default)]
    kernelspec: Option<KernelSpec>,
}

#[derive(Debug, Deserialize)]
struct NamedLanguage {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KernelSpec {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
enum Cell {
    Markdown {
        source: MultiLine,
    },
    Raw {
        source: MultiLine,
    },
    Code {
        source: MultiLine,
        #[serde(default)]
        outputs: Vec<Output>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
enum Output {
    Stream {
        text: MultiLine,
    },
    ExecuteResult {
        data: BTreeMap<String, Value>,
    },
    DisplayData {
        data: BTreeMap<String, Value>,
    },
    Error {
        ename: String,
        evalue: String,
    },
}

/// nbformat stores text either as one string or as a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MultiLine {
    One(String),
    Many(Vec<String>),
}

impl MultiLine {
    fn joined(&self) -> String {
        match self {
            MultiLine::One(s) => s.clone(),
            MultiLine::Many(lines) => lines.concat(),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect(),
        other => other.to_string(),
    }
}

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpeg"),
    ("image/svg+xml", "svg"),
];

/// Convert notebook JSON into markdown and resources. `stem` prefixes every
/// resource name.
pub fn export(json: &str, stem: &str) -> Result<Export, NotebookError> {
    let notebook: Notebook = serde_json::from_str(json)?;
    let language = notebook
        .metadata
        .language_info
        .as_ref()
        .and_then(|l| l.name.clone())
        .or_else(|| notebook.metadata.kernelspec.as_ref().and_then(|k| k.language.clone()))
        .unwrap_or_else(|| "python".to_string());

    let mut export = Export::default();

    for (index, cell) in notebook.cells.iter().enumerate() {
        match cell {
            Cell::Markdown { source } | Cell::Raw { source } => {
                push_block(&mut export.markdown, &source.joined());
            }
            Cell::Code { source, outputs } => {
                let code = source.joined();
                if !code.trim().is_empty() {
                    let block = format!("```{language}\n{}\n```", code.trim_end_matches('\n'));
                    push_block(&mut export.markdown, &block);
                }
                for (output_index, output) in outputs.iter().enumerate() {
                    export_output(&mut export, stem, index, output_index, output)?;
                }
            }
        }
    }

    Ok(export)
}

fn export_output(
    export: &mut Export,
    stem: &str,
    cell: usize,
    output_index: usize,
    output: &Output,
) -> Result<(), NotebookError> {
    match output {
        Output::Stream { text } => push_block(&mut export.markdown, &indent(&text.joined())),
        Output::Error { ename, evalue } => {
            push_block(&mut export.markdown, &indent(&format!("{ename}: {evalue}")))
        }
        Output::ExecuteResult { data } | Output::DisplayData { data } => {
            for (mime, ext) in IMAGE_TYPES {
                let Some(value) = data.get(*mime) else { continue };
                let name = format!("{stem}_output_{cell}_{output_index}.{ext}");
                let bytes = if *ext == "svg" {
                    value_text(value).into_bytes()
                } else {
                    let encoded: String = value_text(value).split_whitespace().collect();
                    STANDARD
                        .decode(encoded)
                        .map_err(|source| NotebookError::Decode {
                            cell,
                            mime: mime.to_string(),
                            source,
                        })?
                };
                push_block(&mut export.markdown, &format!("![{ext}](<{name}>)"));
                export.resources.insert(name, bytes);
                return Ok(());
            }

            let text_like = ["text/html", "text/markdown", "text/latex"];
            if let Some(value) = text_like.iter().find_map(|mime| data.get(*mime)) {
                push_block(&mut export.markdown, &value_text(value));
            } else if let Some(value) = data.get("text/plain") {
                push_block(&mut export.markdown, &indent(&value_text(value)));
            }
        }
    }

    Ok(())
}

fn push_block(markdown: &mut String, block: &str) {
    let block = block.trim_end_matches('\n');
    if block.is_empty() {
        return;
    }
    markdown.push_str(block);
    markdown.push_str("\n\n");
}

fn indent(text: &str) -> String {
    text.trim_end_matches('\n')
        .lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
