use crate::cmd::load_config;
use crate::output::{print_json, print_table};
use probe_core::combination::combinations;
use std::path::Path;

pub fn run(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root, config)?;
    let combos = combinations(&config.flavors(root), &config.stream_libs);

    if json {
        return print_json(&combos);
    }
    if combos.is_empty() {
        println!("No combinations configured.");
        return Ok(());
    }

    let rows = combos
        .iter()
        .map(|c| {
            vec![
                c.flavor_name.clone(),
                c.template_id.clone(),
                c.stream_lib.to_string(),
                if c.template_ref.exists() {
                    c.template_ref.display().to_string()
                } else {
                    format!("{} (missing)", c.template_ref.display())
                },
            ]
        })
        .collect();
    print_table(&["FLAVOR", "TEMPLATE", "STREAM", "PATH"], rows);
    Ok(())
}
