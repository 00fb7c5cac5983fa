//! Process launching functionality.

use super::managed::{
    ManagedProcess, OutputLine, OutputStream, ProcessControl, ProcessDriver, ProcessExit,
    ProcessInfo,
};
use crate::error::{EmbedError, Result};
use crate::platform;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long the supervisor waits for the output pipes to drain after exit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to start a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable path, or a bare name looked up on `PATH`.
    pub executable: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory. Inherited when unset.
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set.
    pub env_vars: HashMap<String, String>,
    /// Mirror output lines into this file.
    pub log_file: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Set the log file path.
    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Something that can turn a [`LaunchSpec`] into a [`ManagedProcess`].
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn the process described by `spec`.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<ManagedProcess>;
}

/// Spawns OS processes with piped output and a supervising task.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Launch a process.
    ///
    /// stdin is closed, stdout and stderr are read line by line. On Windows
    /// no console window is created for the child. The returned handle
    /// buffers output until the caller takes or discards it.
    pub async fn launch(spec: &LaunchSpec) -> Result<ManagedProcess> {
        let executable = resolve_executable(&spec.executable)?;

        let mut cmd = Command::new(&executable);
        cmd.args(&spec.args)
            .envs(&spec.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let log_tx = match &spec.log_file {
            Some(path) => Some(open_log(path).await?),
            None => None,
        };

        info!(
            "Launching {} {}",
            executable.display(),
            spec.args.join(" ")
        );

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", executable.display(), e);
            if e.kind() == std::io::ErrorKind::NotFound {
                EmbedError::ExecutableNotFound(executable.clone())
            } else {
                EmbedError::SpawnFailed {
                    executable: executable.clone(),
                    message: e.to_string(),
                    source: Some(e),
                }
            }
        })?;

        let Some(pid) = child.id() else {
            return Err(EmbedError::SpawnFailed {
                executable,
                message: "process exited before its pid could be read".to_string(),
                source: None,
            });
        };
        info!("Launched process with PID {}", pid);

        let (process, driver) = ManagedProcess::with_driver(ProcessInfo {
            pid,
            executable,
            working_dir: spec.working_dir.clone(),
            args: spec.args.clone(),
        });

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(
                stdout,
                OutputStream::Stdout,
                driver.output_sender(),
                log_tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(
                stderr,
                OutputStream::Stderr,
                driver.output_sender(),
                log_tx,
            )));
        }

        tokio::spawn(supervise(child, pid, driver, readers));
        Ok(process)
    }
}

#[async_trait]
impl ProcessSpawner for ProcessLauncher {
    async fn spawn(&self, spec: &LaunchSpec) -> Result<ManagedProcess> {
        Self::launch(spec).await
    }
}

/// Resolve `executable` to an existing file, searching `PATH` for bare names.
pub fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    let is_bare = executable.components().count() == 1 && !executable.is_absolute();
    if !is_bare {
        return if executable.is_file() {
            Ok(executable.to_path_buf())
        } else {
            Err(EmbedError::ExecutableNotFound(executable.to_path_buf()))
        };
    }

    platform::paths::path_dirs()
        .into_iter()
        .flat_map(|dir| {
            let plain = dir.join(executable);
            let exe = cfg!(windows).then(|| plain.with_extension("exe"));
            std::iter::once(plain).chain(exe)
        })
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EmbedError::ExecutableNotFound(executable.to_path_buf()))
}

async fn open_log(path: &Path) -> Result<mpsc::UnboundedSender<String>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EmbedError::io_with_path(e, parent))?;
    }
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| EmbedError::io_with_path(e, path))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let path = path.to_path_buf();
    tokio::spawn(async move {
        let mut writer = tokio::io::BufWriter::new(file);
        while let Some(line) = rx.recv().await {
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                warn!("Failed to write process log {}: {}", path.display(), e);
                break;
            }
        }
    });
    Ok(tx)
}

async fn pump_lines<R>(
    reader: R,
    stream: OutputStream,
    output_tx: mpsc::UnboundedSender<OutputLine>,
    log_tx: Option<mpsc::UnboundedSender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(mut bytes)) => {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                let line = String::from_utf8_lossy(&bytes).into_owned();
                if let Some(log) = &log_tx {
                    let _ = log.send(format!("[{}] {}", stream, line));
                }
                let _ = output_tx.send(OutputLine { stream, line });
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading {}: {}", stream, e);
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    pid: u32,
    mut driver: ProcessDriver,
    readers: Vec<JoinHandle<()>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            control = driver.next_control() => match control {
                Some(ProcessControl::Terminate) => match platform::request_graceful_exit(pid) {
                    Ok(true) => {}
                    Ok(false) => driver.decline_terminate(),
                    Err(e) => {
                        warn!("Graceful exit request for {} failed: {}", pid, e);
                        driver.decline_terminate();
                    }
                },
                Some(ProcessControl::Kill) => {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill process {}: {}", pid, e);
                    }
                }
                // Handle dropped; nothing can ask us to stop any more.
                None => break child.wait().await,
            },
        }
    };

    for reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            debug!("Output of process {} still open after exit", pid);
        }
    }

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            success: status.success(),
        },
        Err(e) => {
            warn!("Failed to wait for process {}: {}", pid, e);
            ProcessExit::killed()
        }
    };
    info!("Process {} exited ({:?})", pid, exit.code);
    driver.exit(exit);
}
