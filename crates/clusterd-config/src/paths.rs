//! Where configuration lives on disk.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Per-deployment configuration, kept next to the data directory.
pub const PROJECT_FILE: &str = "clusterd.toml";
/// Machine-local overrides, never checked in.
pub const LOCAL_FILE: &str = "clusterd.local.toml";

/// The user-level config file (`~/.config/clusterd/config.toml` or the
/// platform equivalent), when the platform exposes one.
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "clusterd", "clusterd").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn project_config_file(dir: &Path) -> PathBuf {
    dir.join(PROJECT_FILE)
}

pub fn local_config_file(dir: &Path) -> PathBuf {
    dir.join(LOCAL_FILE)
}

pub fn state_dir(dir: &Path) -> PathBuf {
    dir.join(".clusterd")
}

pub fn is_initialized(dir: &Path) -> bool {
    project_config_file(dir).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn deployment_paths_are_rooted_at_the_project_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(project_config_file(dir.path()), dir.path().join("clusterd.toml"));
        assert_eq!(local_config_file(dir.path()), dir.path().join("clusterd.local.toml"));
        assert_eq!(state_dir(dir.path()), dir.path().join(".clusterd"));

        assert!(!is_initialized(dir.path()));
        std::fs::write(project_config_file(dir.path()), "[server]\n").unwrap();
        assert!(is_initialized(dir.path()));
    }
}
