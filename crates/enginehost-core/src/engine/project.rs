//! Project root discovery and scene resource paths.

use crate::config::AppConfig;
use crate::platform::paths;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Walk up from `start` looking for the project marker file.
///
/// `start` itself and up to `max_depth` ancestors are checked.
pub fn find_project_root(start: &Path, max_depth: usize) -> Option<PathBuf> {
    start
        .ancestors()
        .take(max_depth + 1)
        .find(|dir| dir.join(AppConfig::PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

/// Project root near the running binary, then near the working directory.
pub fn default_project_root() -> Option<PathBuf> {
    let starts = [paths::current_exe_dir(), std::env::current_dir().ok()];
    starts
        .into_iter()
        .flatten()
        .find_map(|start| find_project_root(&start, AppConfig::PROJECT_SEARCH_DEPTH))
}

/// Whether `root` contains the project marker.
pub fn is_project_root(root: &Path) -> bool {
    root.join(AppConfig::PROJECT_MARKER).is_file()
}

/// The `res://` path of `scene` inside `project_root`.
///
/// Relative scenes are taken relative to the project root. Separators are
/// always forward slashes. Paths already in resource form pass through.
pub fn scene_resource_path(scene: &Path, project_root: &Path) -> String {
    let scene_str = scene.to_string_lossy();
    if scene_str.starts_with(AppConfig::RESOURCE_SCHEME) {
        return scene_str.into_owned();
    }

    let absolute = if scene.is_absolute() {
        scene.to_path_buf()
    } else {
        project_root.join(scene)
    };

    let relative = match relative_path(&absolute, project_root) {
        Some(relative) => relative.to_string_lossy().into_owned(),
        None => {
            debug!(
                "No relative path from {} to {}, stripping prefix",
                project_root.display(),
                absolute.display()
            );
            let root = project_root.to_string_lossy();
            absolute
                .to_string_lossy()
                .replacen(root.as_ref(), "", 1)
                .trim_start_matches(['/', '\\'])
                .to_string()
        }
    };

    format!(
        "{}{}",
        AppConfig::RESOURCE_SCHEME,
        relative.replace('\\', "/")
    )
}

fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Windows paths are case-insensitive; elsewhere components must match exactly.
fn same_component(a: &Component<'_>, b: &Component<'_>) -> bool {
    if cfg!(windows) {
        a.as_os_str()
            .to_string_lossy()
            .eq_ignore_ascii_case(&b.as_os_str().to_string_lossy())
    } else {
        a == b
    }
}

/// Lexical relative path from `base` to `path`.
///
/// `None` when the two do not share a root (different drives, or one is
/// relative and the other absolute).
fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    let path = normalize(path);
    let base = normalize(base);

    let is_root = |c: &Component<'_>| matches!(c, Component::Prefix(_) | Component::RootDir);
    let path_root: Vec<_> = path.iter().take_while(|c| is_root(c)).collect();
    let base_root: Vec<_> = base.iter().take_while(|c| is_root(c)).collect();
    if path_root.len() != base_root.len()
        || !path_root.iter().zip(&base_root).all(|(a, b)| same_component(a, b))
    {
        return None;
    }

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| same_component(a, b))
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}
