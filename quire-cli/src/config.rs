use anyhow::Result;
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "./quire.toml";

/// Complete configuration that merges CLI args, env vars, config files, and defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QuireConfig {
    /// Build configuration
    #[serde(default)]
    pub build: BuildConfig,
    /// Site and render configuration (from quire-core)
    #[serde(flatten)]
    pub site: quire_core::Config,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source directory containing markdown files and notebooks
    pub source: String,
    /// Output directory for generated site
    pub output: String,
    /// Page template
    pub template: String,
    /// Configuration file path
    pub config: String,
    /// Host for dev server
    pub host: String,
    /// Port for dev server
    pub port: u16,
    /// Open browser automatically
    pub open: bool,
    /// Rebuild when sources change while serving
    pub watch: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source: "./site".to_string(),
            output: "./out".to_string(),
            template: "./template.html".to_string(),
            config: DEFAULT_CONFIG_FILE.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: false,
            watch: true,
        }
    }
}

impl QuireConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (QUIRE_*)
    /// 3. Configuration file
    /// 4. Defaults (lowest priority)
    pub fn load(args: &ArgMatches) -> Result<Self> {
        let config_file = args
            .get_one::<String>("config")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let mut builder = ConfigBuilder::builder();

        // 1. Start with defaults
        let defaults = Self::default();
        builder = builder.add_source(ConfigBuilder::try_from(&defaults)?);

        // 2. Add configuration file if it exists
        if Path::new(&config_file).exists() {
            builder = builder.add_source(File::new(&config_file, FileFormat::Toml));
        }

        // 3. Add environment variables with QUIRE_ prefix
        builder = builder.add_source(
            Environment::with_prefix("QUIRE")
                .prefix_separator("_")
                .separator("__"), // Use double underscore for nested keys
        );

        // 4. Override with CLI arguments (highest priority)
        for (key, value) in cli_overrides(args) {
            builder = builder.set_override(key, value)?;
        }

        let config = builder.build()?;
        let quire_config: QuireConfig = config.try_deserialize()?;

        Ok(quire_config)
    }
}

/// Settings given on the command line. Only args defined for the running
/// subcommand are looked at.
fn cli_overrides(args: &ArgMatches) -> Vec<(&'static str, String)> {
    let mut overrides = Vec::new();

    for (arg, key) in [
        ("source", "build.source"),
        ("output", "build.output"),
        ("template", "build.template"),
        ("config", "build.config"),
        ("host", "build.host"),
    ] {
        if let Some(value) = args.try_get_one::<String>(arg).unwrap_or(None) {
            overrides.push((key, value.clone()));
        }
    }
    if let Some(port) = args.try_get_one::<u16>("port").unwrap_or(None) {
        overrides.push(("build.port", port.to_string()));
    }
    if flag(args, "open") {
        overrides.push(("build.open", "true".to_string()));
    }
    if flag(args, "no-watch") {
        overrides.push(("build.watch", "false".to_string()));
    }
    if flag(args, "strict") {
        overrides.push(("render.on_error", "abort".to_string()));
    }

    overrides
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    args.try_get_one::<bool>(id)
        .unwrap_or(None)
        .copied()
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd;
    use quire_core::ErrorPolicy;
    use std::fs;

    fn serve_args(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["serve"];
        argv.extend_from_slice(args);
        cmd::serve::make_subcommand()
            .try_get_matches_from(argv)
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = QuireConfig::default();
        assert_eq!(config.build.source, "./site");
        assert_eq!(config.build.output, "./out");
        assert_eq!(config.build.template, "./template.html");
        assert_eq!(config.build.port, 3000);
        assert!(config.build.watch);
        assert_eq!(config.site.render.insertion_id, "post");
    }

    #[test]
    fn test_cli_args_override() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        let matches = serve_args(&[
            "--source", "/custom/source",
            "--output", "/custom/output",
            "--config", missing.to_str().unwrap(),
            "--port", "4000",
            "--no-watch",
            "--strict",
        ]);

        let config = QuireConfig::load(&matches).unwrap();
        assert_eq!(config.build.source, "/custom/source");
        assert_eq!(config.build.output, "/custom/output");
        assert_eq!(config.build.port, 4000);
        assert!(!config.build.watch);
        assert_eq!(config.site.render.on_error, ErrorPolicy::Abort);
        // Should still have defaults for non-overridden values
        assert_eq!(config.build.template, "./template.html");
    }

    #[test]
    fn test_config_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("quire.toml");
        fs::write(
            &file,
            r#"
[build]
output = "public"

[site]
name = "Notes"

[render]
insertion_id = "content"
"#,
        )
        .unwrap();

        let matches = serve_args(&["--config", file.to_str().unwrap(), "--output", "dist"]);
        let config = QuireConfig::load(&matches).unwrap();

        // CLI beats the file, the file beats the defaults
        assert_eq!(config.build.output, "dist");
        assert_eq!(config.site.render.insertion_id, "content");
        assert_eq!(config.site.site["name"], "Notes");
        assert_eq!(config.build.source, "./site");
    }
}
