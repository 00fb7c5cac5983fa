//! The launch → locate → embed → run → stop state machine.
//!
//! `start` holds the operation lock for its whole duration. `stop` first
//! moves the state to `Stopping` and cancels the running session, then waits
//! for the lock, so an in-flight `start` gives up within one poll interval.
//! State transitions made by `start` are conditional on the state it left
//! behind, so once `Stopping` is set nothing can move the machine forward.

use super::events::LifecycleEvent;
use super::state::LifecycleState;
use crate::cancel::CancellationToken;
use crate::config::{DiscoveryTimeoutPolicy, LifecycleOptions};
use crate::engine::EngineLaunch;
use crate::error::{EmbedError, Result};
use crate::platform::{self, Size, WindowHandle, WindowSystem};
use crate::process::{
    LaunchSpec, ManagedProcess, OutputStream, ProcessExit, ProcessLauncher, ProcessSpawner,
};
use crate::window::{
    EmbeddedWindow, InputForwarder, PositionSynchronizer, WindowEmbedder, WindowLocator,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// What to launch.
#[derive(Debug, Clone)]
pub enum LaunchTarget {
    /// The engine on a project scene; validated when `start` runs.
    Engine(EngineLaunch),
    /// An arbitrary command line.
    Process(LaunchSpec),
}

/// Input to [`LifecycleController::start`].
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub target: LaunchTarget,
    /// Native handle of the surface the window is embedded into.
    pub host: WindowHandle,
}

impl StartRequest {
    pub fn engine(launch: EngineLaunch, host: WindowHandle) -> Self {
        Self {
            target: LaunchTarget::Engine(launch),
            host,
        }
    }

    pub fn process(spec: LaunchSpec, host: WindowHandle) -> Self {
        Self {
            target: LaunchTarget::Process(spec),
            host,
        }
    }

    fn launch_spec(&self) -> Result<LaunchSpec> {
        match &self.target {
            LaunchTarget::Engine(launch) => launch.to_launch_spec(),
            LaunchTarget::Process(spec) => Ok(spec.clone()),
        }
    }
}

struct Session {
    generation: u64,
    process: Arc<ManagedProcess>,
    sync: Option<PositionSynchronizer>,
}

struct Inner {
    windows: Arc<dyn WindowSystem>,
    spawner: Arc<dyn ProcessSpawner>,
    options: LifecycleOptions,
    embedder: Arc<WindowEmbedder>,
    input: InputForwarder,
    state_tx: watch::Sender<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    op_lock: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
    cancel: Mutex<CancellationToken>,
    generation: AtomicU64,
}

/// Orchestrates one embedded engine session at a time.
pub struct LifecycleController {
    inner: Arc<Inner>,
}

impl LifecycleController {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        spawner: Arc<dyn ProcessSpawner>,
        options: LifecycleOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let embedder = Arc::new(WindowEmbedder::new(
            windows.clone(),
            options.host_ready_attempts,
            options.host_ready_interval,
        ));
        let input = InputForwarder::new(windows.clone());

        Self {
            inner: Arc::new(Inner {
                windows,
                spawner,
                options,
                embedder,
                input,
                state_tx,
                events,
                op_lock: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// A controller using the platform window system and real processes.
    pub fn native(options: LifecycleOptions) -> Self {
        Self::new(
            platform::native_window_system(),
            Arc::new(ProcessLauncher::new()),
            options,
        )
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.inner.options
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Pid of the current session's process.
    pub fn pid(&self) -> Option<u32> {
        self.inner
            .session_slot()
            .as_ref()
            .map(|session| session.process.pid())
    }

    pub fn embedded_window(&self) -> Option<EmbeddedWindow> {
        self.inner.embedder.embedded()
    }

    /// Launch, locate, embed and start synchronizing.
    ///
    /// Accepted from `Idle`, `Stopped` and `Failed`. Returns the engine pid
    /// once `Running`. Any failure leaves the controller `Failed` and is
    /// returned here; a `stop` during the call makes it return `Cancelled`.
    pub async fn start(&self, request: StartRequest) -> Result<u32> {
        self.inner.start(request).await
    }

    /// Tear the session down: stop synchronizing, detach the window, ask the
    /// process to exit, then kill it if it does not.
    ///
    /// Idempotent; a no-op when nothing is running. After a start that failed
    /// but left its process running, this ends that process too.
    pub async fn stop(&self) {
        self.inner.stop().await
    }

    /// Resize the embedded window to the new host size.
    ///
    /// Returns `false` unless running with a window embedded.
    pub fn resize(&self, width: i32, height: i32) -> Result<bool> {
        self.inner.resize(width, height)
    }

    /// Apply every size published on `sizes` until the sender goes away.
    pub fn follow_host_resizes(&self, mut sizes: watch::Receiver<Size>) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while sizes.changed().await.is_ok() {
                let size = *sizes.borrow_and_update();
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if let Err(e) = inner.resize(size.width, size.height) {
                    warn!("Host resize to {}x{} failed: {}", size.width, size.height, e);
                }
            }
        })
    }

    /// Give the embedded window keyboard focus.
    pub fn focus_engine(&self) -> Result<()> {
        let window = self.embedded_handle("focus")?;
        self.inner.input.focus(window)
    }

    /// Post a virtual-key message to the embedded window.
    pub fn send_key(&self, key: u32, down: bool) -> Result<()> {
        let window = self.embedded_handle("send input")?;
        self.inner.input.send_key(window, key, down)
    }

    fn embedded_handle(&self, action: &'static str) -> Result<WindowHandle> {
        self.inner
            .embedder
            .window()
            .ok_or_else(|| EmbedError::InvalidState {
                action,
                state: self.state(),
            })
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.inner.current_cancel().cancel();
        let Some(mut session) = self.inner.take_session(None) else {
            return;
        };

        drop(session.sync.take());
        if let Err(e) = self.inner.embedder.detach() {
            warn!("Failed to detach engine window on drop: {}", e);
        }
        if session.process.kill() {
            info!("Killed engine process {} on drop", session.process.pid());
        }
        let active = [
            LifecycleState::Launching,
            LifecycleState::WaitingForWindow,
            LifecycleState::Embedding,
            LifecycleState::Running,
            LifecycleState::Stopping,
            LifecycleState::Failed,
        ];
        self.inner.transition(&active, LifecycleState::Stopped);
    }
}

impl Inner {
    fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Move to `to` if the current state is one of `from`.
    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> bool {
        let mut previous = None;
        self.state_tx.send_if_modified(|state| {
            if *state == to || !from.contains(state) {
                return false;
            }
            previous = Some(*state);
            *state = to;
            true
        });

        match previous {
            Some(from) => {
                info!("Lifecycle {} -> {}", from, to);
                let _ = self.events.send(LifecycleEvent::StateChanged { from, to });
                true
            }
            None => false,
        }
    }

    /// Transition for `start`: fails with `Cancelled` if `stop` got there first.
    fn advance(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        if self.transition(&[from], to) {
            Ok(())
        } else {
            Err(EmbedError::Cancelled)
        }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_generation(&self) -> Option<u64> {
        self.session_slot().as_ref().map(|s| s.generation)
    }

    fn pid_of(&self, generation: u64) -> Option<u32> {
        self.session_slot()
            .as_ref()
            .filter(|s| s.generation == generation)
            .map(|s| s.process.pid())
    }

    /// Take the session, optionally only if it belongs to `generation`.
    fn take_session(&self, generation: Option<u64>) -> Option<Session> {
        let mut slot = self.session_slot();
        match (slot.as_ref(), generation) {
            (Some(session), Some(wanted)) if session.generation != wanted => None,
            _ => slot.take(),
        }
    }

    async fn start(self: &Arc<Self>, request: StartRequest) -> Result<u32> {
        let _op = self.op_lock.lock().await;

        // Installed before leaving a startable state so a `stop` that sees
        // `Launching` always cancels this attempt.
        let cancel = CancellationToken::new();
        *self.current_cancel() = cancel.clone();

        if !self.transition(&LifecycleState::STARTABLE, LifecycleState::Launching) {
            return Err(EmbedError::InvalidState {
                action: "start",
                state: self.state(),
            });
        }

        if let Some(leftover) = self.take_session(None) {
            info!(
                "Stopping process {} left from the previous start",
                leftover.process.pid()
            );
            self.teardown(leftover, true).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let spec = match request.launch_spec() {
            Ok(spec) => spec,
            Err(e) => return Err(self.fail_start(e, generation).await),
        };
        let process = match self.spawner.spawn(&spec).await {
            Ok(process) => Arc::new(process),
            Err(e) => return Err(self.fail_start(e, generation).await),
        };
        let pid = process.pid();

        *self.session_slot() = Some(Session {
            generation,
            process: process.clone(),
            sync: None,
        });
        self.spawn_output_pump(&process);
        self.spawn_exit_monitor(generation, &process);

        match self.run_start(generation, &process, request.host, &cancel).await {
            Ok(()) => {
                info!("Engine process {} is running", pid);
                Ok(pid)
            }
            Err(EmbedError::Cancelled) => {
                info!("Start of process {} cancelled", pid);
                Err(EmbedError::Cancelled)
            }
            Err(e) => Err(self.fail_start(e, generation).await),
        }
    }

    async fn run_start(
        &self,
        generation: u64,
        process: &ManagedProcess,
        host: WindowHandle,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pid = process.pid();
        self.probe_immediate_exit(process, cancel).await?;

        self.advance(LifecycleState::Launching, LifecycleState::WaitingForWindow)?;
        let locator = WindowLocator::new(self.windows.clone(), self.options.poll_schedule());
        let window = locator
            .find_window(pid, process.exit_watch(), cancel)
            .await?;

        self.advance(LifecycleState::WaitingForWindow, LifecycleState::Embedding)?;
        self.embedder.embed(window, host, cancel).await?;

        let sync = PositionSynchronizer::start(
            self.embedder.clone(),
            self.options.sync_interval,
            self.state_tx.subscribe(),
        );
        if let Some(session) = self.session_slot().as_mut() {
            if session.generation == generation {
                session.sync = Some(sync);
            }
        }

        self.advance(LifecycleState::Embedding, LifecycleState::Running)?;
        if process.has_exited() {
            return Err(EmbedError::ProcessExited { pid });
        }
        Ok(())
    }

    async fn probe_immediate_exit(
        &self,
        process: &ManagedProcess,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let window = self.options.immediate_exit_window;
        if window.is_zero() {
            return Ok(());
        }

        tokio::select! {
            exited = process.wait_for_exit(window) => {
                if exited {
                    let code = process.exit_status().and_then(|exit| exit.code);
                    return Err(EmbedError::ExitedImmediately {
                        pid: process.pid(),
                        code,
                    });
                }
                Ok(())
            }
            _ = cancel.cancelled() => Err(EmbedError::Cancelled),
        }
    }

    async fn fail_start(&self, error: EmbedError, generation: u64) -> EmbedError {
        warn!("Start failed: {}", error);

        let leave_running = matches!(error, EmbedError::DiscoveryTimeout { .. })
            && self.options.discovery_timeout_policy == DiscoveryTimeoutPolicy::LeaveRunning;

        if leave_running {
            // Kept in the slot so `stop`, the next `start` or drop can end it.
            if let Some(pid) = self.pid_of(generation) {
                info!("Leaving process {} running after discovery timeout", pid);
            }
        } else if let Some(session) = self.take_session(Some(generation)) {
            self.teardown(session, false).await;
        }

        let failing = [
            LifecycleState::Launching,
            LifecycleState::WaitingForWindow,
            LifecycleState::Embedding,
            LifecycleState::Running,
        ];
        if self.transition(&failing, LifecycleState::Failed) {
            let _ = self.events.send(LifecycleEvent::StartFailed {
                kind: error.kind(),
                message: error.to_string(),
            });
        }
        error
    }

    async fn stop(&self) {
        let mut state = self.state();
        if state == LifecycleState::Failed && self.session_generation().is_some() {
            // A process left running after a discovery timeout.
            state = if self.transition(&[LifecycleState::Failed], LifecycleState::Stopping) {
                LifecycleState::Stopping
            } else {
                self.state()
            };
        }
        if !state.is_active() {
            debug!("Stop ignored while {}", state);
            return;
        }

        let running = [
            LifecycleState::Launching,
            LifecycleState::WaitingForWindow,
            LifecycleState::Embedding,
            LifecycleState::Running,
        ];
        if self.transition(&running, LifecycleState::Stopping) {
            self.current_cancel().cancel();
        }

        let _op = self.op_lock.lock().await;
        if let Some(session) = self.take_session(None) {
            self.teardown(session, true).await;
        }
        self.transition(&[LifecycleState::Stopping], LifecycleState::Stopped);
    }

    /// Synchronizer, then window, then process.
    async fn teardown(&self, mut session: Session, graceful: bool) {
        let process = session.process.clone();
        let pid = process.pid();

        if let Some(sync) = session.sync.take() {
            sync.stop().await;
        }

        match self.embedder.detach() {
            Ok(true) => debug!("Detached window of process {}", pid),
            Ok(false) => {}
            Err(e) => warn!("Failed to detach window of process {}: {}", pid, e),
        }

        if graceful && !process.has_exited() {
            let timeout = self.options.graceful_exit_timeout;
            if process.terminate_and_wait(timeout).await {
                info!("Process {} exited gracefully", pid);
                return;
            }
            warn!("Process {} did not exit gracefully, killing", pid);
        }

        if process.kill() && !process.wait_for_exit(self.options.kill_timeout).await {
            warn!("Process {} still running after kill", pid);
        }
    }

    fn spawn_output_pump(&self, process: &ManagedProcess) {
        let Some(mut lines) = process.take_output() else {
            return;
        };
        let events = self.events.clone();
        let pid = process.pid();
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                match line.stream {
                    OutputStream::Stdout => debug!(pid = pid, "{}", line.line),
                    OutputStream::Stderr => warn!(pid = pid, "{}", line.line),
                }
                let _ = events.send(LifecycleEvent::Output { pid, line });
            }
        });
    }

    fn spawn_exit_monitor(self: &Arc<Self>, generation: u64, process: &ManagedProcess) {
        let inner = Arc::downgrade(self);
        let pid = process.pid();
        let mut exit_rx = process.exit_watch();
        tokio::spawn(async move {
            let exit = loop {
                if let Some(exit) = *exit_rx.borrow_and_update() {
                    break exit;
                }
                if exit_rx.changed().await.is_err() {
                    break (*exit_rx.borrow()).unwrap_or_else(ProcessExit::killed);
                }
            };
            if let Some(inner) = inner.upgrade() {
                inner.on_process_exit(generation, pid, exit).await;
            }
        });
    }

    async fn on_process_exit(&self, generation: u64, pid: u32, exit: ProcessExit) {
        let current = self.session_generation() == Some(generation);
        let unexpected =
            current && self.transition(&[LifecycleState::Running], LifecycleState::Stopping);

        if unexpected {
            warn!(
                "Engine process {} exited unexpectedly (code {:?})",
                pid, exit.code
            );
        } else {
            info!("Engine process {} exited (code {:?})", pid, exit.code);
        }
        let _ = self.events.send(LifecycleEvent::ProcessStopped {
            pid,
            exit,
            unexpected,
        });

        if current && !unexpected && self.state() == LifecycleState::Failed {
            // A process left running after a failed start ended on its own.
            self.take_session(Some(generation));
        }

        if unexpected {
            let _op = self.op_lock.lock().await;
            if let Some(session) = self.take_session(Some(generation)) {
                self.teardown(session, false).await;
            }
            self.transition(&[LifecycleState::Stopping], LifecycleState::Stopped);
        }
    }

    fn resize(&self, width: i32, height: i32) -> Result<bool> {
        if self.state() != LifecycleState::Running {
            return Ok(false);
        }
        self.embedder.resize(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::platform::fake::{Call, FakeWindowSystem};
    use crate::platform::Rect;
    use crate::process::{OutputLine, ProcessControl, ProcessDriver, ProcessInfo};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    const HOST: WindowHandle = WindowHandle(1000);

    #[derive(Debug, Clone, Default)]
    struct Script {
        window_on_poll: Option<u32>,
        exit_after: Option<Duration>,
        ignore_terminate: bool,
        /// Behave like a process with no window to receive a close request.
        decline_terminate: bool,
        output: Vec<OutputLine>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ControlRecord {
        control: ProcessControl,
        window_parented: bool,
    }

    struct ScriptedSpawner {
        windows: Arc<FakeWindowSystem>,
        script: Script,
        spawned: Mutex<u32>,
        controls: Arc<Mutex<Vec<ControlRecord>>>,
    }

    impl ScriptedSpawner {
        fn new(windows: Arc<FakeWindowSystem>, script: Script) -> Arc<Self> {
            Arc::new(Self {
                windows,
                script,
                spawned: Mutex::new(0),
                controls: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn spawn_count(&self) -> u32 {
            *self.spawned.lock().unwrap()
        }

        fn controls(&self) -> Vec<ControlRecord> {
            self.controls.lock().unwrap().clone()
        }

        fn kills(&self) -> usize {
            self.controls()
                .iter()
                .filter(|r| r.control == ProcessControl::Kill)
                .count()
        }
    }

    fn engine_window(pid: u32) -> WindowHandle {
        WindowHandle(pid as isize * 10)
    }

    #[async_trait]
    impl ProcessSpawner for ScriptedSpawner {
        async fn spawn(&self, spec: &LaunchSpec) -> Result<ManagedProcess> {
            let pid = {
                let mut spawned = self.spawned.lock().unwrap();
                *spawned += 1;
                4000 + *spawned
            };
            let (process, driver) = ManagedProcess::with_driver(ProcessInfo {
                pid,
                executable: spec.executable.clone(),
                working_dir: spec.working_dir.clone(),
                args: spec.args.clone(),
            });

            let window = engine_window(pid);
            if let Some(poll) = self.script.window_on_poll {
                self.windows
                    .add_window_on_poll(pid, window, true, self.windows.polls() + poll);
            }
            tokio::spawn(run_engine(
                driver,
                self.windows.clone(),
                window,
                self.script.clone(),
                self.controls.clone(),
            ));
            Ok(process)
        }
    }

    async fn run_engine(
        mut driver: ProcessDriver,
        windows: Arc<FakeWindowSystem>,
        window: WindowHandle,
        script: Script,
        controls: Arc<Mutex<Vec<ControlRecord>>>,
    ) {
        for line in script.output {
            driver.emit(line);
        }

        let exit_after = script.exit_after;
        let exit_timer = async move {
            match exit_after {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(exit_timer);

        loop {
            tokio::select! {
                _ = &mut exit_timer => {
                    windows.destroy_window(window);
                    driver.exit(ProcessExit::from_code(1));
                    break;
                }
                control = driver.next_control() => {
                    let Some(control) = control else { break };
                    controls.lock().unwrap().push(ControlRecord {
                        control,
                        window_parented: windows.parent_of(window).is_some(),
                    });
                    match control {
                        ProcessControl::Terminate if script.decline_terminate => {
                            driver.decline_terminate();
                        }
                        ProcessControl::Terminate if script.ignore_terminate => {}
                        ProcessControl::Terminate => {
                            windows.destroy_window(window);
                            driver.exit(ProcessExit::from_code(0));
                            break;
                        }
                        ProcessControl::Kill => {
                            windows.destroy_window(window);
                            driver.exit(ProcessExit::killed());
                            break;
                        }
                    }
                }
            }
        }
    }

    fn options() -> LifecycleOptions {
        LifecycleOptions::default().with_discovery(
            5,
            2,
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
    }

    fn setup_with(
        script: Script,
        options: LifecycleOptions,
    ) -> (
        Arc<FakeWindowSystem>,
        Arc<ScriptedSpawner>,
        LifecycleController,
    ) {
        let windows = Arc::new(FakeWindowSystem::new());
        windows.add_host(HOST, Size::new(800, 600));
        let spawner = ScriptedSpawner::new(windows.clone(), script);
        let controller = LifecycleController::new(windows.clone(), spawner.clone(), options);
        (windows, spawner, controller)
    }

    fn setup(
        script: Script,
    ) -> (
        Arc<FakeWindowSystem>,
        Arc<ScriptedSpawner>,
        LifecycleController,
    ) {
        setup_with(script, options())
    }

    fn with_window() -> Script {
        Script {
            window_on_poll: Some(1),
            ..Default::default()
        }
    }

    fn request() -> StartRequest {
        StartRequest::process(LaunchSpec::new("godot"), HOST)
    }

    fn drain(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn states(events: &[LifecycleEvent]) -> Vec<LifecycleState> {
        events
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reaches_running_when_window_appears_on_third_poll() {
        let (windows, _spawner, controller) = setup(Script {
            window_on_poll: Some(3),
            ..Default::default()
        });
        let mut events = controller.subscribe();

        let pid = controller.start(request()).await.unwrap();

        assert_eq!(controller.state(), LifecycleState::Running);
        assert_eq!(controller.pid(), Some(pid));
        assert_eq!(windows.parent_of(engine_window(pid)), Some(HOST));
        assert_eq!(
            controller.embedded_window().unwrap().geometry,
            Rect::new(0, 0, 800, 600)
        );
        assert_eq!(
            states(&drain(&mut events)),
            vec![
                LifecycleState::Launching,
                LifecycleState::WaitingForWindow,
                LifecycleState::Embedding,
                LifecycleState::Running,
            ]
        );

        controller.stop().await;
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_exit_fails_start() {
        let (windows, _spawner, controller) = setup(Script {
            window_on_poll: Some(1),
            exit_after: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let mut events = controller.subscribe();

        let err = controller.start(request()).await.unwrap_err();

        assert!(matches!(err, EmbedError::ExitedImmediately { code: Some(1), .. }));
        assert!(err.to_string().starts_with("process exited immediately"));
        assert_eq!(err.kind(), FailureKind::Launch);
        assert_eq!(controller.state(), LifecycleState::Failed);
        assert!(!windows
            .calls()
            .iter()
            .any(|c| matches!(c, Call::SetParent(..))));

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            LifecycleEvent::StartFailed {
                kind: FailureKind::Launch,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_discovery_cancels_without_embedding() {
        let (windows, spawner, controller) = setup(Script::default());
        let controller = Arc::new(controller);

        let starter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start(request()).await })
        };

        let mut state = controller.state_watch();
        state
            .wait_for(|s| *s == LifecycleState::WaitingForWindow)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stop_started = Instant::now();
        controller.stop().await;
        assert!(stop_started.elapsed() < Duration::from_millis(200));

        let result = starter.await.unwrap();
        assert!(matches!(result, Err(EmbedError::Cancelled)));
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(!windows
            .calls()
            .iter()
            .any(|c| matches!(c, Call::SetParent(..))));

        // The poll loop is gone.
        let polls = windows.polls();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(windows.polls(), polls);
        assert_eq!(spawner.kills(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_follows_host() {
        let (windows, _spawner, controller) = setup(with_window());
        let pid = controller.start(request()).await.unwrap();
        let window = engine_window(pid);

        // Explicit resize applies synchronously.
        assert!(controller.resize(1024, 768).unwrap());
        assert_eq!(
            controller.embedded_window().unwrap().geometry,
            Rect::new(0, 0, 1024, 768)
        );
        assert_eq!(windows.rect_of(window), Some(Rect::new(0, 0, 1024, 768)));

        // A resize stream is applied as it arrives.
        let (size_tx, size_rx) = watch::channel(Size::new(1024, 768));
        let follower = controller.follow_host_resizes(size_rx);
        size_tx.send_replace(Size::new(1280, 720));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(windows.rect_of(window), Some(Rect::new(0, 0, 1280, 720)));
        drop(size_tx);
        follower.await.unwrap();

        // Host size changes nobody reported are picked up by the synchronizer.
        windows.set_host_size(HOST, Size::new(640, 480));
        tokio::time::sleep(controller.options().sync_interval + Duration::from_millis(1)).await;
        assert_eq!(
            controller.embedded_window().unwrap().geometry,
            Rect::new(0, 0, 640, 480)
        );

        controller.stop().await;
        assert!(!controller.resize(800, 600).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_detaches_before_kill_and_kills_once() {
        let (windows, spawner, controller) = setup(Script {
            window_on_poll: Some(1),
            ignore_terminate: true,
            ..Default::default()
        });
        let pid = controller.start(request()).await.unwrap();

        let stop_started = Instant::now();
        tokio::join!(controller.stop(), controller.stop());

        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(stop_started.elapsed() >= controller.options().graceful_exit_timeout);
        assert_eq!(
            spawner.controls(),
            vec![
                ControlRecord {
                    control: ProcessControl::Terminate,
                    window_parented: false,
                },
                ControlRecord {
                    control: ProcessControl::Kill,
                    window_parented: false,
                },
            ]
        );
        assert!(windows
            .calls()
            .contains(&Call::SetParent(engine_window(pid), None)));

        // Stopping again does nothing.
        controller.stop().await;
        assert_eq!(spawner.kills(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_exit_while_running() {
        let (_windows, spawner, controller) = setup(Script {
            window_on_poll: Some(1),
            exit_after: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let mut events = controller.subscribe();
        let pid = controller.start(request()).await.unwrap();

        let stopped = loop {
            match events.recv().await.unwrap() {
                event @ LifecycleEvent::ProcessStopped { .. } => break event,
                _ => continue,
            }
        };
        assert!(stopped.is_unexpected_exit());
        assert!(matches!(
            stopped,
            LifecycleEvent::ProcessStopped { pid: p, .. } if p == pid
        ));

        controller
            .state_watch()
            .wait_for(|s| *s == LifecycleState::Stopped)
            .await
            .unwrap();
        assert!(controller.embedded_window().is_none());
        assert_eq!(spawner.kills(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_timeout_kills_by_default() {
        let (_windows, spawner, controller) = setup(Script::default());

        let err = controller.start(request()).await.unwrap_err();

        assert!(matches!(err, EmbedError::DiscoveryTimeout { attempts: 5, .. }));
        assert_eq!(err.kind(), FailureKind::DiscoveryTimeout);
        assert_eq!(controller.state(), LifecycleState::Failed);
        assert_eq!(spawner.kills(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_timeout_can_leave_process_running() {
        let (_windows, spawner, controller) = setup_with(
            Script::default(),
            options().with_timeout_policy(DiscoveryTimeoutPolicy::LeaveRunning),
        );

        let err = controller.start(request()).await.unwrap_err();

        assert!(matches!(err, EmbedError::DiscoveryTimeout { .. }));
        assert_eq!(controller.state(), LifecycleState::Failed);
        assert!(spawner.controls().is_empty());
        assert_eq!(controller.pid(), Some(4001));

        // The process stays reachable: stop ends it and leaves the controller stopped.
        controller.stop().await;
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert_eq!(controller.pid(), None);
        assert_eq!(
            spawner
                .controls()
                .iter()
                .map(|r| r.control)
                .collect::<Vec<_>>(),
            vec![ProcessControl::Terminate]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_ends_process_left_running() {
        let (_windows, spawner, controller) = setup_with(
            Script::default(),
            options().with_timeout_policy(DiscoveryTimeoutPolicy::LeaveRunning),
        );
        let _ = controller.start(request()).await;
        assert_eq!(controller.pid(), Some(4001));

        let err = controller.start(request()).await.unwrap_err();

        assert!(matches!(err, EmbedError::DiscoveryTimeout { .. }));
        assert_eq!(spawner.spawn_count(), 2);
        assert_eq!(controller.pid(), Some(4002));
        assert_eq!(
            spawner.controls(),
            vec![ControlRecord {
                control: ProcessControl::Terminate,
                window_parented: false,
            }]
        );
        controller.stop().await;
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_ends_process_left_running() {
        let (_windows, spawner, controller) = setup_with(
            Script::default(),
            options().with_timeout_policy(DiscoveryTimeoutPolicy::LeaveRunning),
        );
        let _ = controller.start(request()).await;
        let state = controller.state_watch();

        drop(controller);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(spawner.kills(), 1);
        assert_eq!(*state.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_running_process_exiting_clears_session() {
        let (_windows, _spawner, controller) = setup_with(
            Script {
                exit_after: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            options().with_timeout_policy(DiscoveryTimeoutPolicy::LeaveRunning),
        );
        let mut events = controller.subscribe();
        let _ = controller.start(request()).await;
        assert!(controller.pid().is_some());

        loop {
            if let LifecycleEvent::ProcessStopped { unexpected, .. } = events.recv().await.unwrap() {
                assert!(!unexpected);
                break;
            }
        }
        tokio::task::yield_now().await;
        assert_eq!(controller.pid(), None);
        assert_eq!(controller.state(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_kills_without_waiting_when_close_is_undeliverable() {
        let (_windows, spawner, controller) = setup(Script {
            window_on_poll: Some(1),
            decline_terminate: true,
            ..Default::default()
        });
        controller.start(request()).await.unwrap();

        let stop_started = Instant::now();
        controller.stop().await;

        assert!(stop_started.elapsed() < controller.options().graceful_exit_timeout);
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert_eq!(spawner.kills(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_launching_cancels_promptly() {
        let (_windows, _spawner, controller) = setup(with_window());
        let mut state = controller.state_watch();

        let started = Instant::now();
        let (result, ()) = tokio::join!(controller.start(request()), async {
            state
                .wait_for(|s| *s == LifecycleState::Launching)
                .await
                .unwrap();
            controller.stop().await;
        });

        assert!(matches!(result, Err(EmbedError::Cancelled)));
        assert!(started.elapsed() < controller.options().immediate_exit_window);
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_not_ready_fails_and_kills() {
        let (_windows, spawner, controller) = setup(with_window());

        let err = controller
            .start(StartRequest::process(
                LaunchSpec::new("godot"),
                WindowHandle(999),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, EmbedError::HostNotReady { handle: 999 }));
        assert_eq!(err.kind(), FailureKind::Embed);
        assert_eq!(controller.state(), LifecycleState::Failed);
        assert_eq!(spawner.kills(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_executable_spawns_nothing() {
        let (_windows, spawner, controller) = setup(with_window());
        let launch = EngineLaunch::new("/nonexistent/godot", "/nonexistent/project");

        let err = controller
            .start(StartRequest::engine(launch, HOST))
            .await
            .unwrap_err();

        assert!(matches!(err, EmbedError::ExecutableNotFound(_)));
        assert!(err.wants_executable_selection());
        assert_eq!(spawner.spawn_count(), 0);
        assert_eq!(controller.state(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejected_while_running() {
        let (_windows, spawner, controller) = setup(with_window());
        controller.start(request()).await.unwrap();

        let err = controller.start(request()).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::InvalidState {
                action: "start",
                state: LifecycleState::Running,
            }
        ));
        assert_eq!(spawner.spawn_count(), 1);
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let (_windows, _spawner, controller) = setup(with_window());
        let mut events = controller.subscribe();

        controller.stop().await;

        assert_eq!(controller.state(), LifecycleState::Idle);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (windows, _spawner, controller) = setup(with_window());
        let first = controller.start(request()).await.unwrap();
        controller.stop().await;

        let second = controller.start(request()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.state(), LifecycleState::Running);
        assert_eq!(windows.parent_of(engine_window(second)), Some(HOST));
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_is_republished() {
        let (_windows, _spawner, controller) = setup(Script {
            window_on_poll: Some(1),
            output: vec![OutputLine::stdout("ready"), OutputLine::stderr("shader warning")],
            ..Default::default()
        });
        let mut events = controller.subscribe();
        let pid = controller.start(request()).await.unwrap();

        let lines: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Output { pid: p, line } if p == pid => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(
            lines,
            vec![OutputLine::stdout("ready"), OutputLine::stderr("shader warning")]
        );
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_forwarding() {
        let (windows, _spawner, controller) = setup(with_window());
        assert!(matches!(
            controller.focus_engine(),
            Err(EmbedError::InvalidState { .. })
        ));

        let pid = controller.start(request()).await.unwrap();
        controller.focus_engine().unwrap();
        controller.send_key(0x57, true).unwrap();

        let calls = windows.calls();
        assert!(calls.contains(&Call::SetFocus(engine_window(pid))));
        assert!(calls.contains(&Call::PostKey(engine_window(pid), 0x57, true)));
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_detaches_and_kills() {
        let (windows, spawner, controller) = setup(with_window());
        let pid = controller.start(request()).await.unwrap();

        drop(controller);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(windows
            .calls()
            .contains(&Call::SetParent(engine_window(pid), None)));
        assert_eq!(
            spawner.controls(),
            vec![ControlRecord {
                control: ProcessControl::Kill,
                window_parented: false,
            }]
        );
    }
}
