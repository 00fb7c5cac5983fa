//! Engine executable resolution.
//!
//! Resolution order:
//! 1. The persisted override (a plain-text file holding an absolute path)
//! 2. A fixed list of locations next to the host binary and the project
//! 3. System install roots
//! 4. Every `PATH` entry
//!
//! When nothing resolves, [`ExecutableResolver::resolve_or_select`] asks the
//! caller for a path and persists the answer as the new override.

use crate::error::{EmbedError, Result};
use crate::platform::paths;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Storage for the engine path override.
pub trait EnginePathStore: Send + Sync {
    /// The stored path, if any.
    fn load(&self) -> Result<Option<PathBuf>>;

    /// Replace the stored path.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Override kept in a plain-text file.
#[derive(Debug, Clone)]
pub struct FileEnginePathStore {
    path: PathBuf,
}

impl FileEnginePathStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store at the well-known settings location.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(paths::engine_path_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnginePathStore for FileEnginePathStore {
    fn load(&self) -> Result<Option<PathBuf>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let trimmed = text.trim();
                Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EmbedError::io_with_path(e, &self.path)),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EmbedError::io_with_path(e, parent))?;
        }
        std::fs::write(&self.path, path.to_string_lossy().as_bytes())
            .map_err(|e| EmbedError::io_with_path(e, &self.path))
    }
}

/// Override kept in memory.
#[derive(Debug, Default)]
pub struct MemoryEnginePathStore {
    path: Mutex<Option<PathBuf>>,
}

impl MemoryEnginePathStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: Mutex::new(path),
        }
    }
}

impl EnginePathStore for MemoryEnginePathStore {
    fn load(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, path: &Path) -> Result<()> {
        *self
            .path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path.to_path_buf());
        Ok(())
    }
}

/// Candidate engine locations, in probe order.
///
/// `base` is the directory of the host binary; `project` the project root.
pub fn default_candidates(
    base: Option<&Path>,
    project: Option<&Path>,
    system_dirs: &[PathBuf],
    path_dirs: &[PathBuf],
) -> Vec<PathBuf> {
    let names = paths::engine_executable_names();
    let primary = names[0];
    let alternate = names.get(1).copied().unwrap_or(primary);

    let mut candidates = Vec::new();
    if let Some(base) = base {
        candidates.push(base.join("Godot").join(primary));
        candidates.push(base.join("Godot").join(alternate));
        candidates.push(base.join("Engine").join(primary));
        candidates.push(base.join(primary));
    }
    if let Some(project) = project {
        candidates.push(project.join(alternate));
        candidates.push(project.join("Godot").join(alternate));
    }
    for dir in system_dirs {
        candidates.push(dir.join("Godot").join(primary));
    }
    for dir in path_dirs {
        candidates.push(dir.join(alternate));
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Resolves the engine executable.
pub struct ExecutableResolver {
    store: Arc<dyn EnginePathStore>,
    base_dir: Option<PathBuf>,
    project_root: Option<PathBuf>,
    system_dirs: Vec<PathBuf>,
    path_dirs: Vec<PathBuf>,
}

impl ExecutableResolver {
    /// A resolver rooted at the running binary's directory, probing the
    /// system install roots and `PATH`.
    pub fn new(store: Arc<dyn EnginePathStore>) -> Self {
        Self {
            store,
            base_dir: paths::current_exe_dir(),
            project_root: None,
            system_dirs: paths::system_install_roots(),
            path_dirs: paths::path_dirs(),
        }
    }

    /// A resolver that only probes the override and explicitly set dirs.
    pub fn isolated(store: Arc<dyn EnginePathStore>) -> Self {
        Self {
            store,
            base_dir: None,
            project_root: None,
            system_dirs: Vec::new(),
            path_dirs: Vec::new(),
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_project_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_root = Some(dir.into());
        self
    }

    pub fn with_path_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.path_dirs = dirs;
        self
    }

    pub fn with_system_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.system_dirs = dirs;
        self
    }

    /// The fixed candidate list for this resolver.
    pub fn candidates(&self) -> Vec<PathBuf> {
        default_candidates(
            self.base_dir.as_deref(),
            self.project_root.as_deref(),
            &self.system_dirs,
            &self.path_dirs,
        )
    }

    /// The stored override, if it names an existing file.
    pub fn saved_override(&self) -> Option<PathBuf> {
        match self.store.load() {
            Ok(Some(path)) if path.is_file() => Some(path),
            Ok(Some(path)) => {
                warn!("Saved engine path {} does not exist", path.display());
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read saved engine path: {}", e);
                None
            }
        }
    }

    /// Find the engine without asking anyone.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self.saved_override() {
            debug!("Using saved engine path {}", path.display());
            return Ok(path);
        }

        let candidates = self.candidates();
        for candidate in &candidates {
            if candidate.is_file() {
                info!("Found engine at {}", candidate.display());
                return Ok(candidate.clone());
            }
        }

        debug!("No engine among {} candidates", candidates.len());
        Err(EmbedError::ExecutableNotFound(
            candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| PathBuf::from(paths::engine_executable_names()[0])),
        ))
    }

    /// Find the engine, asking `select` when nothing resolves.
    ///
    /// `select` receives the probed candidates. A selection that names an
    /// existing file is persisted as the override.
    pub fn resolve_or_select<F>(&self, select: F) -> Result<PathBuf>
    where
        F: FnOnce(&[PathBuf]) -> Option<PathBuf>,
    {
        match self.resolve() {
            Ok(path) => Ok(path),
            Err(EmbedError::ExecutableNotFound(missing)) => {
                let candidates = self.candidates();
                match select(&candidates) {
                    Some(chosen) => self.set_override(chosen),
                    None => Err(EmbedError::ExecutableNotFound(missing)),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Persist `path` as the override after checking that it exists.
    pub fn set_override(&self, path: impl Into<PathBuf>) -> Result<PathBuf> {
        let path = path.into();
        if !path.is_file() {
            return Err(EmbedError::ExecutableNotFound(path));
        }
        self.store.save(&path)?;
        info!("Saved engine path {}", path.display());
        Ok(path)
    }
}
