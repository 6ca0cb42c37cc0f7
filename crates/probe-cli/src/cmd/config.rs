use crate::cmd::load_config;
use crate::output::print_json;
use clap::Subcommand;
use probe_core::config::WarnLevel;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration, defaults filled in
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(
    root: &Path,
    config: Option<&Path>,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, config, json),
        ConfigSubcommand::Validate => validate(root, config, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root, config)?;
    if json {
        print_json(&config)?;
    } else {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root, config)?;
    let warnings = config.validate(root);

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
