pub mod builder;
pub mod config;
pub mod markdown;
pub mod notebook;
pub mod renderer;
pub mod scanner;
pub mod site;
pub mod template;

// Re-export main types
pub use builder::{BuildError, BuildReport, PageFailure, Site, SiteBuilder, build_site};
pub use config::{Config, ErrorPolicy};
pub use markdown::{Conversion, MarkdownConverter};
pub use site::{Page, SourceKind};
pub use template::{TemplateEngine, TemplateError};
