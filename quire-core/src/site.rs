use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use crate::markdown::{Conversion, Metadata};

static EMPTY_METADATA: Metadata = BTreeMap::new();

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y"];

pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdown", "markdown"];
pub const NOTEBOOK_EXTENSIONS: &[&str] = &["ipynb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Markdown,
    Notebook,
}

impl SourceKind {
    /// Classify a file by extension. `None` means the file is an asset.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if MARKDOWN_EXTENSIONS.contains(&ext) {
            Some(SourceKind::Markdown)
        } else if NOTEBOOK_EXTENSIONS.contains(&ext) {
            Some(SourceKind::Notebook)
        } else {
            None
        }
    }
}

/// Parse a front-matter date, trying each supported format in turn.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// One source document and everything the build learns about it.
#[derive(Debug, Clone)]
pub struct Page {
    source_path: PathBuf,
    /// Output location relative to the output root
    relative_path: PathBuf,
    output_path: PathBuf,
    kind: SourceKind,
    raw_content: String,
    conversion: Option<Conversion>,
    resources: BTreeMap<String, Vec<u8>>,
}

impl Page {
    /// `relative_source` is the source path relative to the source root; the
    /// page lands at the same place under `output_root`, as `.html`.
    pub fn new<P: AsRef<Path>>(
        source_path: PathBuf,
        relative_source: &Path,
        output_root: P,
        kind: SourceKind,
        raw_content: String,
    ) -> Self {
        let relative_path = relative_source.with_extension("html");
        let output_path = output_root.as_ref().join(&relative_path);

        Self {
            source_path,
            relative_path,
            output_path,
            kind,
            raw_content,
            conversion: None,
            resources: BTreeMap::new(),
        }
    }

    pub fn with_resources(mut self, resources: BTreeMap<String, Vec<u8>>) -> Self {
        self.resources = resources;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn resources(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.resources
    }

    /// Store the converted body and metadata. A page is converted once.
    pub fn set_conversion(&mut self, conversion: Conversion) {
        debug_assert!(self.conversion.is_none(), "page converted twice");
        if self.conversion.is_none() {
            self.conversion = Some(conversion);
        }
    }

    pub fn html(&self) -> Option<&str> {
        self.conversion.as_ref().map(|c| c.html.as_str())
    }

    pub fn metadata(&self) -> &Metadata {
        self.conversion
            .as_ref()
            .map(|c| &c.metadata)
            .unwrap_or(&EMPTY_METADATA)
    }

    /// First value recorded for `key`, if any.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata()
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn title(&self) -> String {
        match self.meta("title") {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => self
                .source_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn url(&self) -> String {
        self.relative_path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.meta("date").and_then(parse_date)
    }

    /// The shape templates see as `page` and as each entry of `pages`.
    pub fn view(&self) -> PageView<'_> {
        PageView {
            title: self.title(),
            url: self.url(),
            date: self.date().map(|d| d.format("%Y-%m-%d").to_string()),
            meta: self
                .metadata()
                .iter()
                .filter_map(|(key, values)| Some((key.as_str(), values.first()?.as_str())))
                .collect(),
            metadata: self.metadata(),
            html: self.html(),
            source: &self.raw_content,
            source_path: self.source_path.to_string_lossy().to_string(),
            output_path: self.output_path.to_string_lossy().to_string(),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageView<'a> {
    pub title: String,
    pub url: String,
    pub date: Option<String>,
    pub meta: BTreeMap<&'a str, &'a str>,
    pub metadata: &'a Metadata,
    pub html: Option<&'a str>,
    pub source: &'a str,
    pub source_path: String,
    pub output_path: String,
    pub kind: SourceKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::MarkdownConverter;

    fn page(relative: &str, content: &str) -> Page {
        let relative = Path::new(relative);
        Page::new(
            Path::new("site").join(relative),
            relative,
            "out",
            SourceKind::from_path(relative).unwrap(),
            content.to_string(),
        )
    }

    fn converted(relative: &str, content: &str) -> Page {
        let mut page = page(relative, content);
        page.set_conversion(MarkdownConverter::new().convert(content));
        page
    }

    #[test]
    fn test_classification() {
        assert_eq!(SourceKind::from_path(Path::new("a.md")), Some(SourceKind::Markdown));
        assert_eq!(SourceKind::from_path(Path::new("a.mdown")), Some(SourceKind::Markdown));
        assert_eq!(SourceKind::from_path(Path::new("a.markdown")), Some(SourceKind::Markdown));
        assert_eq!(SourceKind::from_path(Path::new("a.ipynb")), Some(SourceKind::Notebook));
        assert_eq!(SourceKind::from_path(Path::new("a.png")), None);
        assert_eq!(SourceKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_paths_and_url() {
        let page = page("notes/deep/tides.md", "");
        assert_eq!(page.output_path(), Path::new("out/notes/deep/tides.html"));
        assert_eq!(page.url(), "notes/deep/tides.html");
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        assert_eq!(converted("tides.md", "# No front matter\n").title(), "tides");
        assert_eq!(converted("tides.md", "title: Moon Pull\n\nbody\n").title(), "Moon Pull");
        assert_eq!(page("tides.md", "title: Unconverted\n").title(), "tides");
    }

    #[test]
    fn test_date_formats_agree() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 5);
        assert_eq!(parse_date("2020-01-05"), expected);
        assert_eq!(parse_date("01/05/2020"), expected);
        assert_eq!(parse_date("January 5, 2020"), expected);
        assert_eq!(parse_date("not-a-date"), None);
    }

    #[test]
    fn test_page_date_from_metadata() {
        let page = converted("a.md", "date: January 5, 2020\n\nbody\n");
        assert_eq!(page.date(), NaiveDate::from_ymd_opt(2020, 1, 5));
        assert_eq!(converted("b.md", "date: someday\n\nbody\n").date(), None);
        assert_eq!(converted("c.md", "body\n").date(), None);
    }

    #[test]
    fn test_html_and_metadata_arrive_together() {
        let mut page = page("a.md", "title: T\n\nbody\n");
        assert!(page.html().is_none());
        assert!(page.metadata().is_empty());

        page.set_conversion(MarkdownConverter::new().convert(page.raw_content()));
        assert_eq!(page.html(), Some("<p>body</p>\n"));
        assert_eq!(page.meta("title"), Some("T"));
    }

    #[test]
    fn test_view_serializes_first_values() {
        let page = converted("a.md", "title: T\ntags: x\n    y\ndate: 2020-01-05\n\nbody\n");
        let view = serde_json::to_value(page.view()).unwrap();
        assert_eq!(view["title"], "T");
        assert_eq!(view["meta"]["tags"], "x");
        assert_eq!(view["metadata"]["tags"], serde_json::json!(["x", "y"]));
        assert_eq!(view["date"], "2020-01-05");
        assert_eq!(view["url"], "a.html");
        assert_eq!(view["kind"], "markdown");
    }
}
