use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parsing(#[from] toml::de::Error),
}

/// Free-form data exposed to every template evaluation as `site_info`.
pub type SiteInfo = BTreeMap<String, serde_json::Value>;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub site: SiteInfo,
    pub render: RenderConfig,
}

impl Config {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&data)?;

        Ok(config)
    }
}

/// What a page-scoped failure (conversion or template evaluation) does to
/// the rest of the build.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Report the failing page and keep building the others.
    #[default]
    SkipPage,
    /// Stop the build at the first failing page.
    Abort,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct RenderConfig {
    /// `id` of the template element that receives each page's HTML.
    pub insertion_id: String,
    pub on_error: ErrorPolicy,
    pub syntax_theme: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            insertion_id: "post".to_string(),
            on_error: ErrorPolicy::SkipPage,
            syntax_theme: "base16-ocean.dark".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.site.is_empty());
        assert_eq!(config.render.insertion_id, "post");
        assert_eq!(config.render.on_error, ErrorPolicy::SkipPage);
    }

    #[test]
    fn test_parse_site_and_render_tables() {
        let config: Config = toml::from_str(
            r#"
[site]
name = "Field Notes"
authors = ["ada", "grace"]

[render]
on_error = "abort"
"#,
        )
        .unwrap();

        assert_eq!(config.site["name"], serde_json::json!("Field Notes"));
        assert_eq!(config.site["authors"], serde_json::json!(["ada", "grace"]));
        assert_eq!(config.render.on_error, ErrorPolicy::Abort);
        assert_eq!(config.render.insertion_id, "post");
    }

    #[test]
    fn test_read_missing_file() {
        let err = Config::read("/definitely/not/here/quire.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
