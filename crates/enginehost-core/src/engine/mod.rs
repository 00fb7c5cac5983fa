//! Engine-specific knowledge: where the executable lives, what a project
//! looks like, and how the command line is built.

mod discovery;
mod launch;
mod project;

pub use discovery::{
    default_candidates, EnginePathStore, ExecutableResolver, FileEnginePathStore,
    MemoryEnginePathStore,
};
pub use launch::EngineLaunch;
pub use project::{default_project_root, find_project_root, is_project_root, scene_resource_path};
