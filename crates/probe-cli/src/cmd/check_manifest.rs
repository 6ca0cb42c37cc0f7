use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use probe_core::manifest::{self, ManifestExpectations};
use probe_core::paths;
use std::path::Path;

pub fn run(
    root: &Path,
    config: Option<&Path>,
    dir: &Path,
    template: &str,
    name: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root, config)?;
    let dir = paths::resolve(root, dir);

    let name = match name {
        Some(n) => n.to_string(),
        None => dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("cannot infer project name from {}", dir.display()))?,
    };
    let expect = ManifestExpectations {
        name,
        version: config.project_version.clone(),
        template_id: template.to_string(),
        delegate: config.delegate.clone(),
    };

    let path = paths::manifest_path(&dir);
    let manifest = manifest::load(&path, &expect)
        .with_context(|| format!("{} is not a valid generated manifest", path.display()))?;

    if json {
        print_json(&manifest)?;
    } else {
        println!(
            "{}: {} {} ({} {})",
            path.display(),
            manifest.name,
            manifest.version,
            template,
            manifest.template_dependency
        );
    }
    Ok(())
}
