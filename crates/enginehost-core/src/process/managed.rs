//! Handle to a spawned process and the channels that describe it.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of process output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

impl OutputLine {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            line: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            line: line.into(),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    pub success: bool,
}

impl ProcessExit {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }

    /// Exit caused by a signal or forced termination.
    pub fn killed() -> Self {
        Self {
            code: None,
            success: false,
        }
    }
}

/// Static facts about a spawned process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub executable: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Requests sent from a [`ManagedProcess`] to whatever owns the OS process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessControl {
    /// Ask the process to exit on its own.
    Terminate,
    /// Terminate the process forcibly.
    Kill,
}

/// A running (or finished) external process.
///
/// The OS handle is owned by a supervisor task; this handle talks to it over
/// channels. Exit is published exactly once on a `watch` channel whether or
/// not anyone is waiting.
#[derive(Debug)]
pub struct ManagedProcess {
    info: ProcessInfo,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    control_tx: mpsc::UnboundedSender<ProcessControl>,
    kill_issued: AtomicBool,
    terminate_declined: Arc<Notify>,
    output_rx: Mutex<Option<mpsc::UnboundedReceiver<OutputLine>>>,
}

/// The owning side of a [`ManagedProcess`].
///
/// [`ProcessLauncher`](super::ProcessLauncher) drives one from its supervisor
/// task; other spawners use it to feed output and exit without an OS process.
#[derive(Debug)]
pub struct ProcessDriver {
    exit_tx: watch::Sender<Option<ProcessExit>>,
    control_rx: mpsc::UnboundedReceiver<ProcessControl>,
    terminate_declined: Arc<Notify>,
    output_tx: mpsc::UnboundedSender<OutputLine>,
}

impl ManagedProcess {
    /// Create a process handle together with the driver that backs it.
    pub fn with_driver(info: ProcessInfo) -> (Self, ProcessDriver) {
        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let terminate_declined = Arc::new(Notify::new());

        let process = Self {
            info,
            exit_rx,
            control_tx,
            kill_issued: AtomicBool::new(false),
            terminate_declined: terminate_declined.clone(),
            output_rx: Mutex::new(Some(output_rx)),
        };
        let driver = ProcessDriver {
            exit_tx,
            control_rx,
            terminate_declined,
            output_tx,
        };
        (process, driver)
    }

    pub fn pid(&self) -> u32 {
        self.info.pid
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    /// A receiver that observes the exit notification.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    /// The exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `true` if the process exited within the window. A driver that
    /// went away without reporting an exit counts as exited.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut rx = self.exit_rx.clone();
        let exited = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => true,
            Err(_) => false,
        };
        exited
    }

    /// Ask the process to exit gracefully.
    ///
    /// Returns `false` if the process has already exited.
    pub fn terminate(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        debug!("Requesting graceful exit of process {}", self.info.pid);
        self.control_tx.send(ProcessControl::Terminate).is_ok()
    }

    /// Ask the process to exit and wait up to `timeout` for it to do so.
    ///
    /// Returns `true` once the process has exited. Returns `false` early when
    /// the owner reports that the request could not be delivered, so the
    /// caller can go straight to [`kill`](Self::kill).
    pub async fn terminate_and_wait(&self, timeout: Duration) -> bool {
        if !self.terminate() {
            return self.has_exited();
        }
        tokio::select! {
            exited = self.wait_for_exit(timeout) => exited,
            _ = self.terminate_declined.notified() => {
                debug!("Process {} could not be asked to exit", self.info.pid);
                self.has_exited()
            }
        }
    }

    /// Forcibly terminate the process.
    ///
    /// Only the first call issues a kill; later calls (and calls after the
    /// process exited) return `false`.
    pub fn kill(&self) -> bool {
        if self.kill_issued.swap(true, Ordering::SeqCst) {
            return false;
        }
        if self.has_exited() {
            return false;
        }
        debug!("Killing process {}", self.info.pid);
        self.control_tx.send(ProcessControl::Kill).is_ok()
    }

    /// Whether [`kill`](Self::kill) has been called.
    pub fn kill_issued(&self) -> bool {
        self.kill_issued.load(Ordering::SeqCst)
    }

    /// Take the ordered output receiver. Only the first call gets it.
    ///
    /// Until it is taken (or [`discard_output`](Self::discard_output) is
    /// called) every line the process prints is buffered in memory.
    pub fn take_output(&self) -> Option<mpsc::UnboundedReceiver<OutputLine>> {
        self.output_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Drop the output receiver so lines are no longer buffered.
    ///
    /// Returns `false` if the output was already taken.
    pub fn discard_output(&self) -> bool {
        self.take_output().is_some()
    }

    /// Deliver every output line to `on_line` from a background task.
    ///
    /// Returns `None` if the output was already taken.
    pub fn observe_output<F>(&self, mut on_line: F) -> Option<JoinHandle<()>>
    where
        F: FnMut(OutputLine) + Send + 'static,
    {
        let mut rx = self.take_output()?;
        Some(tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                on_line(line);
            }
        }))
    }
}

impl ProcessDriver {
    /// Publish one output line. Returns `false` if nobody can receive it.
    pub fn emit(&self, line: OutputLine) -> bool {
        self.output_tx.send(line).is_ok()
    }

    pub fn output_sender(&self) -> mpsc::UnboundedSender<OutputLine> {
        self.output_tx.clone()
    }

    /// Publish the exit. Only the first call has an effect.
    pub fn exit(&self, exit: ProcessExit) -> bool {
        self.exit_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit);
            true
        })
    }

    pub fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    /// Report that a [`ProcessControl::Terminate`] request reached nobody.
    pub fn decline_terminate(&self) {
        self.terminate_declined.notify_one();
    }

    /// Wait for the next control request. `None` once the handle is dropped.
    pub async fn next_control(&mut self) -> Option<ProcessControl> {
        self.control_rx.recv().await
    }

    /// Poll for a pending control request without waiting.
    pub fn try_next_control(&mut self) -> Option<ProcessControl> {
        self.control_rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ProcessInfo {
        ProcessInfo {
            pid: 4242,
            executable: PathBuf::from("godot"),
            working_dir: None,
            args: vec![],
        }
    }

    #[tokio::test]
    async fn test_kill_is_issued_once() {
        let (process, mut driver) = ManagedProcess::with_driver(info());
        assert!(process.kill());
        assert!(!process.kill());
        assert_eq!(driver.try_next_control(), Some(ProcessControl::Kill));
        assert_eq!(driver.try_next_control(), None);
        assert!(process.kill_issued());
    }

    #[tokio::test]
    async fn test_exit_published_once() {
        let (process, driver) = ManagedProcess::with_driver(info());
        assert!(driver.exit(ProcessExit::from_code(3)));
        assert!(!driver.exit(ProcessExit::from_code(0)));
        assert_eq!(process.exit_status(), Some(ProcessExit::from_code(3)));
        assert!(!process.terminate());
        assert!(!process.kill());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_exit_times_out() {
        let (process, driver) = ManagedProcess::with_driver(info());
        assert!(!process.wait_for_exit(Duration::from_millis(200)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            driver.exit(ProcessExit::killed());
            // Keep the sender alive past the waiter.
            tokio::time::sleep(Duration::from_secs(1)).await;
        });
        assert!(process.wait_for_exit(Duration::from_millis(200)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_and_wait_stops_early_when_declined() {
        let (process, mut driver) = ManagedProcess::with_driver(info());
        let owner = tokio::spawn(async move {
            assert_eq!(driver.next_control().await, Some(ProcessControl::Terminate));
            driver.decline_terminate();
            driver
        });

        let started = tokio::time::Instant::now();
        assert!(!process.terminate_and_wait(Duration::from_secs(3)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
        let _driver = owner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_and_wait_reports_exit() {
        let (process, mut driver) = ManagedProcess::with_driver(info());
        let owner = tokio::spawn(async move {
            driver.next_control().await;
            driver.exit(ProcessExit::from_code(0));
            driver
        });

        assert!(process.terminate_and_wait(Duration::from_secs(3)).await);
        let _driver = owner.await.unwrap();
    }

    #[tokio::test]
    async fn test_discarded_output_is_not_buffered() {
        let (process, driver) = ManagedProcess::with_driver(info());
        assert!(process.discard_output());
        assert!(!driver.emit(OutputLine::stdout("dropped")));
        assert!(process.take_output().is_none());
        assert!(!process.discard_output());
    }

    #[tokio::test]
    async fn test_output_taken_once() {
        let (process, driver) = ManagedProcess::with_driver(info());
        driver.emit(OutputLine::stdout("one"));
        driver.emit(OutputLine::stderr("two"));

        let mut rx = process.take_output().unwrap();
        assert!(process.take_output().is_none());
        assert_eq!(rx.recv().await.unwrap(), OutputLine::stdout("one"));
        assert_eq!(rx.recv().await.unwrap().stream, OutputStream::Stderr);
    }

    #[tokio::test]
    async fn test_observe_output_callback() {
        let (process, driver) = ManagedProcess::with_driver(info());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = process
            .observe_output(move |line| {
                let _ = tx.send(line.line);
            })
            .unwrap();

        driver.emit(OutputLine::stdout("hello"));
        assert_eq!(rx.recv().await.unwrap(), "hello");

        drop(driver);
        task.await.unwrap();
    }
}
