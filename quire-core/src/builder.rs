use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ErrorPolicy};
use crate::markdown::MarkdownConverter;
use crate::notebook::{self, NotebookError};
use crate::renderer::RenderContext;
use crate::scanner::{FileKind, ScanError, SiteScanner, SourceFile};
use crate::site::{Page, SourceKind};
use crate::template::{CompiledTemplate, TemplateEngine, TemplateError};

/// Written into every output directory so a later build knows it may clear it.
pub const BUILD_MARKER: &str = ".quire-build";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("source is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Notebook(#[from] NotebookError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("source directory not specified or missing: {0}")]
    MissingSourceDir(PathBuf),

    #[error("failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to clear {output}: it contains the source directory {source_dir}")]
    UnsafeOutputDir { output: PathBuf, source_dir: PathBuf },

    #[error(
        "refusing to clear {output}: it is inside the source directory {source_dir} and was not written by a build"
    )]
    OutputInsideSource { output: PathBuf, source_dir: PathBuf },

    #[error(transparent)]
    Walk(#[from] ScanError),

    #[error("failed to read {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to convert {path}: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: ConvertError,
    },

    #[error("template error for {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Errors that only concern one page. The error policy decides whether
    /// they stop the build.
    pub fn is_page_scoped(&self) -> bool {
        matches!(self, BuildError::Conversion { .. } | BuildError::Template { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            BuildError::MissingSourceDir(path)
            | BuildError::TemplateRead { path, .. }
            | BuildError::SourceRead { path, .. }
            | BuildError::Conversion { path, .. }
            | BuildError::Template { path, .. }
            | BuildError::OutputWrite { path, .. } => Some(path),
            BuildError::UnsafeOutputDir { output, .. }
            | BuildError::OutputInsideSource { output, .. } => Some(output),
            BuildError::Walk(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub pages_written: usize,
    pub assets_copied: usize,
    pub resources_written: usize,
    pub failures: Vec<PageFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SiteBuilder {
    source_dir: Option<PathBuf>,
    output_dir: PathBuf,
    template_path: PathBuf,
    config: Config,
}

impl Default for SiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self {
            source_dir: None,
            output_dir: PathBuf::from("./out"),
            template_path: PathBuf::from("./template.html"),
            config: Config::default(),
        }
    }

    // Required configuration
    pub fn source_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source_dir = Some(path.as_ref().to_path_buf());
        self
    }

    // Optional paths
    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn template<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.template_path = path.as_ref().to_path_buf();
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Check the paths, compile the template and discover the source tree.
    /// Nothing is written until [`Site::render_all`].
    pub fn build(self) -> Result<Site, BuildError> {
        let source_dir = self
            .source_dir
            .ok_or_else(|| BuildError::MissingSourceDir(PathBuf::new()))?;
        if !source_dir.is_dir() {
            return Err(BuildError::MissingSourceDir(source_dir));
        }

        if contains(&self.output_dir, &source_dir) {
            return Err(BuildError::UnsafeOutputDir {
                output: self.output_dir,
                source_dir,
            });
        }
        if contains(&source_dir, &self.output_dir) && !is_disposable(&self.output_dir) {
            return Err(BuildError::OutputInsideSource {
                output: self.output_dir,
                source_dir,
            });
        }

        let template_text =
            fs::read_to_string(&self.template_path).map_err(|source| BuildError::TemplateRead {
                path: self.template_path.clone(),
                source,
            })?;

        let mut engine = TemplateEngine::new();
        let template = engine
            .compile_template(
                &self.template_path.to_string_lossy(),
                &template_text,
                &self.config.render.insertion_id,
            )
            .map_err(|source| BuildError::Template {
                path: self.template_path.clone(),
                source,
            })?;
        debug!(
            "Compiled {} with {} regions",
            self.template_path.display(),
            template.region_count()
        );

        info!("Scanning: {}", source_dir.display());
        let files = SiteScanner::new(&source_dir)
            .exclude(&self.template_path)
            .exclude(&self.output_dir)
            .scan()?;

        let converter =
            MarkdownConverter::new().syntax_theme(self.config.render.syntax_theme.as_str());

        Ok(Site {
            files,
            engine,
            template,
            converter,
            config: self.config,
            output_dir: self.output_dir,
        })
    }
}

/// One build: the discovered files, the compiled template and the
/// settings they are rendered with.
pub struct Site {
    files: Vec<SourceFile>,
    engine: TemplateEngine,
    template: CompiledTemplate,
    converter: MarkdownConverter,
    config: Config,
    output_dir: PathBuf,
}

impl Site {
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Run the build: clear the output directory, convert every page, copy
    /// assets, then render and write each page in discovery order.
    pub fn render_all(&mut self) -> Result<BuildReport, BuildError> {
        let mut report = BuildReport::default();

        self.prepare_output()?;

        let mut pages = Vec::new();
        for file in &self.files {
            match file.kind {
                FileKind::Asset => {
                    self.copy_asset(file)?;
                    report.assets_copied += 1;
                }
                FileKind::Page(kind) => match self.load_page(file, kind) {
                    Ok(page) => pages.push(page),
                    Err(err) => self.page_failed(&mut report, err)?,
                },
            }
        }
        info!("Copied {} assets", report.assets_copied);

        let pages = self.convert_pages(pages, &mut report)?;
        info!("Converted {} pages", pages.len());

        let mut context = RenderContext::new(&pages, &self.config.site);
        for page in &pages {
            match self.render_page(page, &mut context) {
                Ok(html) => {
                    report.resources_written += self.write_resources(page)?;
                    write_file(page.output_path(), html.as_bytes())?;
                    debug!("Wrote {}", page.output_path().display());
                    report.pages_written += 1;
                }
                Err(err) => self.page_failed(&mut report, err)?,
            }
        }

        info!(
            "Built {} pages into {}",
            report.pages_written,
            self.output_dir.display()
        );
        if !report.is_success() {
            warn!("{} pages failed", report.failures.len());
        }

        Ok(report)
    }

    fn prepare_output(&self) -> Result<(), BuildError> {
        let output_write = |source| BuildError::OutputWrite {
            path: self.output_dir.clone(),
            source,
        };

        if self.output_dir.exists() {
            debug!("Clearing {}", self.output_dir.display());
            fs::remove_dir_all(&self.output_dir).map_err(output_write)?;
        }
        fs::create_dir_all(&self.output_dir).map_err(output_write)?;
        fs::write(self.output_dir.join(BUILD_MARKER), b"").map_err(output_write)
    }

    fn copy_asset(&self, file: &SourceFile) -> Result<(), BuildError> {
        let target = self.output_dir.join(&file.relative);
        ensure_parent(&target)?;
        fs::copy(&file.path, &target).map_err(|source| BuildError::OutputWrite {
            path: target.clone(),
            source,
        })?;
        debug!("Copied {}", file.relative.display());
        Ok(())
    }

    /// Read a page source; notebooks are exported to markdown here. Content
    /// that cannot be decoded only fails this page.
    fn load_page(&self, file: &SourceFile, kind: SourceKind) -> Result<Page, BuildError> {
        let bytes = fs::read(&file.path).map_err(|source| BuildError::SourceRead {
            path: file.path.clone(),
            source,
        })?;
        let conversion = |err: ConvertError| BuildError::Conversion {
            path: file.path.clone(),
            source: err,
        };
        let text = String::from_utf8(bytes).map_err(|err| conversion(err.into()))?;

        let page = match kind {
            SourceKind::Markdown => {
                Page::new(file.path.clone(), &file.relative, &self.output_dir, kind, text)
            }
            SourceKind::Notebook => {
                let stem = file
                    .path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy())
                    .unwrap_or_default();
                let export = notebook::export(&text, &stem).map_err(|err| conversion(err.into()))?;
                Page::new(
                    file.path.clone(),
                    &file.relative,
                    &self.output_dir,
                    kind,
                    export.markdown,
                )
                .with_resources(export.resources)
            }
        };

        Ok(page)
    }

    /// Expand each page's own code regions, then convert it. Source regions
    /// see the collection as it was before any page was converted.
    fn convert_pages(
        &mut self,
        pages: Vec<Page>,
        report: &mut BuildReport,
    ) -> Result<Vec<Page>, BuildError> {
        let mut snapshot = RenderContext::new(&pages, &self.config.site);
        let mut converted = Vec::with_capacity(pages.len());

        for mut page in pages {
            let document = page.source_path().to_string_lossy().to_string();
            let expanded = self
                .engine
                .expand_source(&document, page.raw_content(), snapshot.for_page(&page));

            match expanded {
                Ok(text) => {
                    page.set_conversion(self.converter.convert(&text));
                    converted.push(page);
                }
                Err(source) => {
                    let err = BuildError::Template {
                        path: page.source_path().to_path_buf(),
                        source,
                    };
                    self.page_failed(report, err)?;
                }
            }
        }

        Ok(converted)
    }

    fn render_page(&self, page: &Page, context: &mut RenderContext) -> Result<String, BuildError> {
        self.engine
            .render(
                &self.template,
                context.for_page(page),
                page.html().unwrap_or_default(),
            )
            .map_err(|source| BuildError::Template {
                path: page.source_path().to_path_buf(),
                source,
            })
    }

    /// Resources go next to the page's output file.
    fn write_resources(&self, page: &Page) -> Result<usize, BuildError> {
        let dir = page.output_path().parent().unwrap_or(self.output_dir.as_path());
        for (name, bytes) in page.resources() {
            write_file(&dir.join(name), bytes)?;
        }
        Ok(page.resources().len())
    }

    fn page_failed(&self, report: &mut BuildReport, err: BuildError) -> Result<(), BuildError> {
        if !err.is_page_scoped() || self.config.render.on_error == ErrorPolicy::Abort {
            return Err(err);
        }

        error!("{err}");
        report.failures.push(PageFailure {
            path: err.path().map(Path::to_path_buf).unwrap_or_default(),
            message: err.to_string(),
        });
        Ok(())
    }
}

/// Build a site in one call.
pub fn build_site<P: AsRef<Path>>(
    config: &Config,
    source_dir: P,
    output_dir: P,
    template_path: P,
) -> Result<BuildReport, BuildError> {
    let mut site = SiteBuilder::new()
        .source_dir(source_dir)
        .output_dir(output_dir)
        .template(template_path)
        .config(config.clone())
        .build()?;

    site.render_all()
}

fn ensure_parent(path: &Path) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::OutputWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    ensure_parent(path)?;
    fs::write(path, bytes).map_err(|source| BuildError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether `outer` is `inner` or one of its ancestors.
fn contains(outer: &Path, inner: &Path) -> bool {
    match (absolute(outer), absolute(inner)) {
        (Some(outer), Some(inner)) => inner.starts_with(outer),
        _ => false,
    }
}

/// A missing or empty directory, or one a previous build wrote.
fn is_disposable(dir: &Path) -> bool {
    if dir.join(BUILD_MARKER).is_file() {
        return true;
    }
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(err) => err.kind() == std::io::ErrorKind::NotFound,
    }
}

fn absolute(path: &Path) -> Option<PathBuf> {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .ok()
}
