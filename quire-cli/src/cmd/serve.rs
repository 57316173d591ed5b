use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use quire_dev_server::{PreviewConfig, PreviewServer};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, error, info};

use crate::cmd::build;
use crate::config::QuireConfig;

pub fn make_subcommand() -> Command {
    build::add_build_args(Command::new("serve"))
        .about("Build, serve the output and rebuild when sources change")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to serve on [default: 3000]")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host to bind to [default: 127.0.0.1]"),
        )
        .arg(
            Arg::new("open")
                .long("open")
                .help("Open browser automatically")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-watch")
                .long("no-watch")
                .help("Build once and serve without watching for changes")
                .action(ArgAction::SetTrue),
        )
}

pub async fn execute(args: &ArgMatches) -> Result<()> {
    // Load cascading configuration
    let config = QuireConfig::load(args)?;
    build::run(&config)?;

    let server = PreviewServer::new(PreviewConfig {
        host: config.build.host.clone(),
        port: config.build.port,
        root: PathBuf::from(&config.build.output),
        open: config.build.open,
    });

    if !config.build.watch {
        return server.run().await;
    }

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Dev server error: {:#}", e);
        }
    });

    // Watch source files and rebuild on changes
    let watch_args = args.clone();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watch_sources(config, watch_args).await {
            error!("Source watcher error: {:#}", e);
        }
    });

    // Wait for both tasks
    let _ = tokio::try_join!(server_handle, watcher_handle)?;

    Ok(())
}

/// Paths whose changes trigger a rebuild.
struct WatchedPaths {
    source_dir: PathBuf,
    template: PathBuf,
    config_file: PathBuf,
    output_dir: PathBuf,
}

impl WatchedPaths {
    fn new(config: &QuireConfig) -> Self {
        Self {
            source_dir: absolute(Path::new(&config.build.source)),
            template: absolute(Path::new(&config.build.template)),
            config_file: absolute(Path::new(&config.build.config)),
            output_dir: absolute(Path::new(&config.build.output)),
        }
    }

    fn triggers_rebuild(&self, path: &Path) -> bool {
        let path = absolute(path);
        if path.starts_with(&self.output_dir) {
            return false;
        }
        path.starts_with(&self.source_dir) || path == self.template || path == self.config_file
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

async fn watch_sources(config: QuireConfig, args: ArgMatches) -> Result<()> {
    let paths = WatchedPaths::new(&config);
    let (tx, mut rx) = tokio::sync::mpsc::channel(100);

    let mut debouncer = new_debouncer(
        Duration::from_millis(500),
        move |res: DebounceEventResult| {
            if let Ok(events) = res {
                for event in events {
                    let _ = tx.blocking_send(event.path);
                }
            }
        },
    )?;

    debouncer
        .watcher()
        .watch(&paths.source_dir, RecursiveMode::Recursive)?;
    info!("Watching source directory: {}", paths.source_dir.display());

    for file in [&paths.template, &paths.config_file] {
        if file.exists() {
            debouncer.watcher().watch(file, RecursiveMode::NonRecursive)?;
            info!("Watching {}", file.display());
        }
    }

    while let Some(path) = rx.recv().await {
        if !paths.triggers_rebuild(&path) {
            debug!("Skipping non-source change: {}", path.display());
            continue;
        }
        // Drain the rest of this batch so it causes a single rebuild
        while rx.try_recv().is_ok() {}
        info!("Source changed: {}", path.display());

        // Reload so that config file edits take effect
        let args = args.clone();
        let rebuilt = tokio::task::spawn_blocking(move || {
            QuireConfig::load(&args).and_then(|config| build::run(&config))
        })
        .await?;

        match rebuilt {
            Ok(report) if report.is_success() => info!("Site rebuilt successfully"),
            Ok(report) => error!("Site rebuilt with {} failed pages", report.failures.len()),
            Err(e) => error!("Build error: {:#}", e),
        }
    }

    Ok(())
}
