//! EngineHost CLI - launch the engine and embed it into a host window.
//!
//! The host application passes the native handle of its render surface with
//! `run --host`. Engine location and scene paths can be inspected on their
//! own with `locate` and `scene-path`.

mod run;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enginehost_core::engine::{default_project_root, scene_resource_path, ExecutableResolver};
use enginehost_core::{FileEnginePathStore, LifecycleOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "enginehost")]
#[command(about = "Launch the engine and embed its window into a host surface")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the engine executable that would be launched
    Locate {
        /// Project root to probe next to
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Remember an engine executable for future runs
    SetEnginePath { path: PathBuf },
    /// Print the res:// path of a scene
    ScenePath {
        scene: PathBuf,
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Print the default lifecycle options as JSON
    Defaults,
    /// Launch the engine and embed it into a host window
    Run(run::RunArgs),
}

/// Parse a native window handle given in decimal or `0x` hex.
pub(crate) fn parse_handle(raw: &str) -> std::result::Result<isize, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => isize::from_str_radix(hex, 16),
        None => raw.parse::<isize>(),
    };
    match parsed {
        Ok(0) => Err("window handle must not be null".to_string()),
        Ok(handle) => Ok(handle),
        Err(e) => Err(format!("invalid window handle '{}': {}", raw, e)),
    }
}

fn init_logging(debug: bool, json: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn project_or_default(project: Option<PathBuf>) -> Result<PathBuf> {
    match project {
        Some(path) => Ok(path),
        None => default_project_root()
            .context("No project.godot found near the executable or working directory; pass --project"),
    }
}

fn resolver() -> Result<ExecutableResolver> {
    let store = FileEnginePathStore::default_location()?;
    Ok(ExecutableResolver::new(Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    match args.command {
        Command::Locate { project } => {
            let mut resolver = resolver()?;
            if let Some(project) = project.or_else(default_project_root) {
                resolver = resolver.with_project_root(project);
            }
            match resolver.resolve() {
                Ok(path) => println!("{}", path.display()),
                Err(e) => {
                    for candidate in resolver.candidates() {
                        eprintln!("  probed {}", candidate.display());
                    }
                    return Err(e.into());
                }
            }
        }
        Command::SetEnginePath { path } => {
            let saved = resolver()?.set_override(path)?;
            info!("Engine path set to {}", saved.display());
        }
        Command::ScenePath { scene, project } => {
            let project = project_or_default(project)?;
            println!("{}", scene_resource_path(&scene, &project));
        }
        Command::Defaults => {
            println!("{}", serde_json::to_string_pretty(&LifecycleOptions::default())?);
        }
        Command::Run(run_args) => run::run(run_args).await?,
    }

    Ok(())
}
