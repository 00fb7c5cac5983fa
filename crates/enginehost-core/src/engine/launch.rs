//! Engine command line construction.

use super::project::{is_project_root, scene_resource_path};
use crate::config::AppConfig;
use crate::error::{EmbedError, Result};
use crate::process::LaunchSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything needed to start the engine on one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunch {
    pub executable: PathBuf,
    pub project_root: PathBuf,
    /// Scene file, absolute, relative to the project root, or `res://`.
    pub scene: PathBuf,
    /// Request a borderless single window (`--windowed --borderless --single-window`).
    pub windowed_borderless: bool,
    pub rendering_driver: Option<String>,
    pub verbose: bool,
    pub user: Option<String>,
    pub avatar: Option<String>,
    pub extra_args: Vec<String>,
    pub env_vars: HashMap<String, String>,
    pub log_file: Option<PathBuf>,
}

impl EngineLaunch {
    pub fn new(executable: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            project_root: project_root.into(),
            scene: PathBuf::from(AppConfig::DEFAULT_SCENE),
            windowed_borderless: false,
            rendering_driver: None,
            verbose: false,
            user: None,
            avatar: None,
            extra_args: Vec::new(),
            env_vars: HashMap::new(),
            log_file: None,
        }
    }

    pub fn with_scene(mut self, scene: impl Into<PathBuf>) -> Self {
        self.scene = scene.into();
        self
    }

    pub fn windowed_borderless(mut self, enabled: bool) -> Self {
        self.windowed_borderless = enabled;
        self
    }

    /// Select the rendering driver (e.g. `opengl3`).
    pub fn with_rendering_driver(mut self, driver: impl Into<String>) -> Self {
        self.rendering_driver = Some(driver.into());
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// The scene as a `res://` path.
    pub fn scene_resource(&self) -> String {
        scene_resource_path(&self.scene, &self.project_root)
    }

    fn scene_file(&self) -> PathBuf {
        let raw = self.scene.to_string_lossy();
        if let Some(rest) = raw.strip_prefix(AppConfig::RESOURCE_SCHEME) {
            return self.project_root.join(rest);
        }
        if self.scene.is_absolute() {
            self.scene.clone()
        } else {
            self.project_root.join(&self.scene)
        }
    }

    /// Check that the executable, project and scene exist.
    pub fn validate(&self) -> Result<()> {
        if !self.executable.is_file() {
            return Err(EmbedError::ExecutableNotFound(self.executable.clone()));
        }
        if !is_project_root(&self.project_root) {
            return Err(EmbedError::ProjectNotFound(
                self.project_root.join(AppConfig::PROJECT_MARKER),
            ));
        }
        let scene = self.scene_file();
        if !scene.is_file() {
            return Err(EmbedError::SceneNotFound(scene));
        }
        Ok(())
    }

    /// Engine arguments, in order.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--path".to_string(),
            self.project_root.to_string_lossy().into_owned(),
            self.scene_resource(),
        ];
        if self.windowed_borderless {
            args.push("--windowed".to_string());
            args.push("--borderless".to_string());
        }
        if let Some(driver) = &self.rendering_driver {
            args.push("--rendering-driver".to_string());
            args.push(driver.clone());
        }
        if self.windowed_borderless {
            args.push("--single-window".to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        if let Some(avatar) = self.avatar.as_deref().filter(|a| !a.is_empty()) {
            args.push("--avatar".to_string());
            args.push(avatar.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Validate and produce the process spawn description.
    ///
    /// The working directory is the project root.
    pub fn to_launch_spec(&self) -> Result<LaunchSpec> {
        self.validate()?;
        let mut spec = LaunchSpec::new(&self.executable)
            .with_args(self.args())
            .with_working_dir(&self.project_root);
        spec.env_vars = self.env_vars.clone();
        spec.log_file = self.log_file.clone();
        Ok(spec)
    }
}
