use probe_core::paths::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the workspace root.
///
/// Priority:
/// 1. `--root` flag / `SCAFFOLD_PROBE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.scaffold-probe.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Some(p) = explicit {
        return cwd.join(p);
    }
    find_config_dir(&cwd).unwrap_or(cwd)
}

fn find_config_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}
