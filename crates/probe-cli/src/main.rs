mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::run::{RunArgs, RunExit};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scaffold-probe",
    about = "Generate projects from every flavor and stream library, then serve, test, build and eject them",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: nearest directory with .scaffold-probe.yaml, else cwd)
    #[arg(long, global = true, env = "SCAFFOLD_PROBE_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: <root>/.scaffold-probe.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every phase for every selected combination
    Run(RunArgs),

    /// List the flavor × stream-library matrix
    Combos,

    /// Validate the manifest of an already generated project
    CheckManifest {
        /// Project directory
        dir: PathBuf,

        /// Template identifier expected in devDependencies
        #[arg(long)]
        template: String,

        /// Expected project name (default: the directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Inspect or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(&root, config, args, cli.json),
        Commands::Combos => cmd::combos::run(&root, config, cli.json),
        Commands::CheckManifest {
            dir,
            template,
            name,
        } => cmd::check_manifest::run(&root, config, &dir, &template, name.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, config, subcommand, cli.json),
    };

    if let Err(e) = result {
        if let Some(exit) = e.downcast_ref::<RunExit>() {
            eprintln!("{exit}");
            std::process::exit(exit.exit_code());
        }
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
