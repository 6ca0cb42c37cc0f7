use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory names
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = ".scaffold-probe.yaml";
pub const MANIFEST_FILE: &str = "package.json";
pub const BUILD_DIR: &str = "build";

/// Prefix of generated project directories.
pub const PROJECT_PREFIX: &str = "example-";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn project_dir(workspace: &Path, name: &str) -> PathBuf {
    workspace.join(name)
}

pub fn manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_FILE)
}

/// Join `rel` onto `root` unless it is already absolute.
pub fn resolve(root: &Path, rel: &Path) -> PathBuf {
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root.join(rel)
    }
}
