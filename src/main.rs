use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filewatch::{FileEvent, FnListener, Settings, WatcherRegistry, logging};

#[derive(Parser)]
#[command(name = "filewatch")]
#[command(about = "Watch files and directories and print every change")]
struct Cli {
    /// Path to a settings file (defaults to the nearest .filewatch/settings.toml)
    #[arg(long, global = true, env = "FW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch one or more files or directories (non-recursive)
    Watch {
        /// Paths to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Stop after this many seconds instead of waiting for Enter
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Create a default .filewatch/settings.toml
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Watch { paths, duration } => watch(&settings, &paths, duration),
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("failed to write settings")?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn watch(settings: &Settings, paths: &[PathBuf], duration: Option<u64>) -> Result<()> {
    let registry = WatcherRegistry::with_settings(settings);
    let printer = Arc::new(FnListener::new(|event: &FileEvent| {
        println!("{:<8} {}", event.kind(), event.path().display());
    }));

    for path in paths {
        if !path.exists() {
            eprintln!("skipping {}: no such file or directory", path.display());
            continue;
        }
        let watcher = registry
            .create_watcher(path)
            .with_context(|| format!("cannot watch {}", path.display()))?;
        watcher.add_listener(printer.clone());
        watcher
            .start()
            .with_context(|| format!("cannot watch {}", path.display()))?;
        eprintln!("watching {}", watcher.watcher_key().display());
    }

    match duration {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            eprintln!("press Enter to stop");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
        }
    }

    if !registry.stop_register() {
        eprintln!("some listeners were still running at shutdown");
    }
    Ok(())
}
