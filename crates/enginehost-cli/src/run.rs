//! The `run` command: launch, embed, then wait for Ctrl-C or the engine to exit.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Args;
use enginehost_core::engine::ExecutableResolver;
use enginehost_core::{
    DiscoveryTimeoutPolicy, EngineLaunch, FileEnginePathStore, LifecycleController,
    LifecycleEvent, LifecycleOptions, StartRequest, WindowHandle,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Native handle of the host surface (decimal or 0x hex)
    #[arg(long, value_parser = crate::parse_handle)]
    pub host: isize,

    /// Scene to open, relative to the project root or as res://
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Project root (defaults to the nearest project.godot)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Engine executable, bypassing discovery
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Lifecycle options file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Forwarded to the engine as --user
    #[arg(long)]
    pub user: Option<String>,

    /// Forwarded to the engine as --avatar
    #[arg(long)]
    pub avatar: Option<String>,

    /// Engine rendering driver
    #[arg(long)]
    pub rendering_driver: Option<String>,

    /// Pass --verbose to the engine
    #[arg(long)]
    pub verbose_engine: bool,

    /// Directory for a timestamped engine output log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Keep the engine alive when its window never appears
    #[arg(long)]
    pub leave_running_on_timeout: bool,
}

/// `engine_YYYYMMDD_HHMMSS.log` inside `dir`.
fn log_file_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("engine_{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Interpret one line typed at the engine prompt.
fn parse_selection(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim().trim_matches('"');
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// Ask on the terminal for the engine location.
fn prompt_for_engine(candidates: &[PathBuf]) -> Option<PathBuf> {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "Engine executable not found. Looked in:");
    for candidate in candidates {
        let _ = writeln!(stderr, "  {}", candidate.display());
    }
    let _ = write!(stderr, "Path to the engine executable (empty to cancel): ");
    let _ = stderr.flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => parse_selection(&line),
        Err(e) => {
            warn!("Failed to read engine path: {}", e);
            None
        }
    }
}

fn load_options(args: &RunArgs) -> Result<LifecycleOptions> {
    let options = match &args.config {
        Some(path) => LifecycleOptions::from_file(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => LifecycleOptions::default(),
    };
    Ok(if args.leave_running_on_timeout {
        options.with_timeout_policy(DiscoveryTimeoutPolicy::LeaveRunning)
    } else {
        options
    })
}

fn build_launch(args: &RunArgs, engine: PathBuf, project: &Path) -> EngineLaunch {
    let mut launch = EngineLaunch::new(engine, project)
        .windowed_borderless(true)
        .verbose(args.verbose_engine);
    if let Some(scene) = &args.scene {
        launch = launch.with_scene(scene);
    }
    if let Some(user) = &args.user {
        launch = launch.with_user(user);
    }
    if let Some(avatar) = &args.avatar {
        launch = launch.with_avatar(avatar);
    }
    if let Some(driver) = &args.rendering_driver {
        launch = launch.with_rendering_driver(driver);
    }
    if let Some(dir) = &args.log_dir {
        launch = launch.with_log_file(log_file_path(dir, Local::now()));
    }
    launch
}

pub async fn run(args: RunArgs) -> Result<()> {
    let options = load_options(&args)?;
    let project = crate::project_or_default(args.project.clone())?;
    info!("Project root: {}", project.display());

    let engine = match &args.engine {
        Some(path) => path.clone(),
        None => {
            let store = FileEnginePathStore::default_location()?;
            ExecutableResolver::new(Arc::new(store))
                .with_project_root(&project)
                .resolve_or_select(prompt_for_engine)?
        }
    };
    info!("Engine: {}", engine.display());

    if let Some(dir) = &args.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let launch = build_launch(&args, engine, &project);

    let controller = LifecycleController::native(options);
    let mut events = controller.subscribe();
    let host = WindowHandle::from_raw(args.host);

    let pid = controller
        .start(StartRequest::engine(launch, host))
        .await
        .context("Failed to start the engine")?;

    // Intentional stdout for the host application to read
    println!("ENGINE_PID={}", pid);
    info!("Engine running as pid {}, press Ctrl-C to stop", pid);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(LifecycleEvent::ProcessStopped { exit, unexpected, .. }) => {
                    if unexpected {
                        warn!("Engine exited unexpectedly (code {:?})", exit.code);
                    }
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} lifecycle events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    controller.stop().await;
    info!("Engine session ended in state {}", controller.state());
    Ok(())
}
