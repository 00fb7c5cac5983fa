//! Centralized configuration for the engine host.
//!
//! Compile-time constants live in unit structs grouped by concern. Values a
//! deployment may need to tune (poll budgets, timeouts, the discovery-timeout
//! policy) live in [`LifecycleOptions`], which can be loaded from JSON.

use crate::error::{EmbedError, Result};
use crate::window::PollSchedule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_DIR_NAME: &'static str = "enginehost";
    pub const ENGINE_PATH_FILE: &'static str = "engine_path.txt";
    pub const PROJECT_MARKER: &'static str = "project.godot";
    pub const RESOURCE_SCHEME: &'static str = "res://";
    pub const DEFAULT_SCENE: &'static str = "bsprincipal.tscn";
    pub const PROJECT_SEARCH_DEPTH: usize = 5;
}

/// Default timing parameters.
pub struct TimingConfig;

impl TimingConfig {
    // Window discovery
    pub const DISCOVERY_MAX_ATTEMPTS: u32 = 150;
    pub const DISCOVERY_FAST_ATTEMPTS: u32 = 10;
    pub const DISCOVERY_FAST_INTERVAL: Duration = Duration::from_millis(100);
    pub const DISCOVERY_SLOW_INTERVAL: Duration = Duration::from_millis(200);

    // Host surface readiness
    pub const HOST_READY_ATTEMPTS: u32 = 50;
    pub const HOST_READY_INTERVAL: Duration = Duration::from_millis(100);

    // Geometry
    pub const SYNC_INTERVAL: Duration = Duration::from_millis(500);

    // Process lifetime
    pub const IMMEDIATE_EXIT_WINDOW: Duration = Duration::from_millis(500);
    pub const GRACEFUL_EXIT_TIMEOUT: Duration = Duration::from_secs(3);
    pub const KILL_TIMEOUT: Duration = Duration::from_secs(1);
}

/// What to do with the engine process when its window never shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTimeoutPolicy {
    /// Tear the process down before reporting the timeout.
    #[default]
    KillProcess,
    /// Leave the process running; the caller owns its fate.
    LeaveRunning,
}

/// Runtime tunables for a [`LifecycleController`](crate::LifecycleController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleOptions {
    /// Total number of discovery polls.
    pub discovery_max_attempts: u32,
    /// Number of leading polls that use the fast interval.
    pub discovery_fast_attempts: u32,
    #[serde(with = "duration_ms")]
    pub discovery_fast_interval: Duration,
    #[serde(with = "duration_ms")]
    pub discovery_slow_interval: Duration,
    pub discovery_timeout_policy: DiscoveryTimeoutPolicy,
    pub host_ready_attempts: u32,
    #[serde(with = "duration_ms")]
    pub host_ready_interval: Duration,
    #[serde(with = "duration_ms")]
    pub sync_interval: Duration,
    #[serde(with = "duration_ms")]
    pub immediate_exit_window: Duration,
    #[serde(with = "duration_ms")]
    pub graceful_exit_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub kill_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            discovery_max_attempts: TimingConfig::DISCOVERY_MAX_ATTEMPTS,
            discovery_fast_attempts: TimingConfig::DISCOVERY_FAST_ATTEMPTS,
            discovery_fast_interval: TimingConfig::DISCOVERY_FAST_INTERVAL,
            discovery_slow_interval: TimingConfig::DISCOVERY_SLOW_INTERVAL,
            discovery_timeout_policy: DiscoveryTimeoutPolicy::default(),
            host_ready_attempts: TimingConfig::HOST_READY_ATTEMPTS,
            host_ready_interval: TimingConfig::HOST_READY_INTERVAL,
            sync_interval: TimingConfig::SYNC_INTERVAL,
            immediate_exit_window: TimingConfig::IMMEDIATE_EXIT_WINDOW,
            graceful_exit_timeout: TimingConfig::GRACEFUL_EXIT_TIMEOUT,
            kill_timeout: TimingConfig::KILL_TIMEOUT,
        }
    }
}

impl LifecycleOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| EmbedError::io_with_path(e, path))?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values that would make discovery or synchronization meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_max_attempts == 0 {
            return Err(EmbedError::Config {
                message: "discovery_max_attempts must be at least 1".to_string(),
            });
        }
        if self.sync_interval.is_zero() {
            return Err(EmbedError::Config {
                message: "sync_interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Set the discovery poll budget.
    pub fn with_discovery(
        mut self,
        max_attempts: u32,
        fast_attempts: u32,
        fast_interval: Duration,
        slow_interval: Duration,
    ) -> Self {
        self.discovery_max_attempts = max_attempts;
        self.discovery_fast_attempts = fast_attempts;
        self.discovery_fast_interval = fast_interval;
        self.discovery_slow_interval = slow_interval;
        self
    }

    /// Set the discovery-timeout policy.
    pub fn with_timeout_policy(mut self, policy: DiscoveryTimeoutPolicy) -> Self {
        self.discovery_timeout_policy = policy;
        self
    }

    /// The discovery poll schedule described by these options.
    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule::new(
            self.discovery_max_attempts,
            self.discovery_fast_attempts,
            self.discovery_fast_interval,
            self.discovery_slow_interval,
        )
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
