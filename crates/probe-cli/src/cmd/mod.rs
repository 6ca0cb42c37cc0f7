pub mod check_manifest;
pub mod combos;
pub mod config;
pub mod run;

use anyhow::Context;
use probe_core::Config;
use std::path::Path;

/// Load the config from `explicit` if given, else from the root.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => {
            let path = probe_core::paths::resolve(root, path);
            Config::load_from(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Config::load(root).context("failed to load config"),
    }
}
