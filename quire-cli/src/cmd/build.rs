use anyhow::{Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use quire_core::{BuildReport, build_site};
use std::path::Path;
use tracing::info;

use crate::config::QuireConfig;

pub fn add_build_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("DIR")
                .help("Source directory containing markdown files and notebooks [default: ./site]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for generated site [default: ./out]"),
        )
        .arg(
            Arg::new("template")
                .short('t')
                .long("template")
                .value_name("FILE")
                .help("Page template [default: ./template.html]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file [default: ./quire.toml]"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Stop at the first page that fails instead of skipping it")
                .action(ArgAction::SetTrue),
        )
}

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("build")).about("Build static site from markdown files and notebooks")
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    // Load cascading configuration
    let config = QuireConfig::load(args)?;
    let report = run(&config)?;

    if !report.is_success() {
        bail!(
            "{} of {} pages failed",
            report.failures.len(),
            report.failures.len() + report.pages_written
        );
    }

    Ok(())
}

/// One full build with the given configuration.
pub fn run(config: &QuireConfig) -> Result<BuildReport> {
    let source_dir = Path::new(&config.build.source);
    let output_dir = Path::new(&config.build.output);
    let template = Path::new(&config.build.template);

    let report = build_site(&config.site, source_dir, output_dir, template)?;

    info!(
        "Site built in {}: {} pages, {} assets, {} resources",
        output_dir.display(),
        report.pages_written,
        report.assets_copied,
        report.resources_written
    );

    Ok(report)
}
