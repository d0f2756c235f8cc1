mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{action::ActionCommand, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dockgate",
    about = "Allowlisted container runtime actions: validated, bounded, and audited",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .dockgate/ or .git/)
    #[arg(long, global = true, env = "DOCKGATE_ROOT")]
    root: Option<PathBuf>,

    /// Container runtime binary (overrides runtime.program)
    #[arg(long, global = true, env = "DOCKGATE_RUNTIME")]
    runtime: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Validate and print the plan without running or recording anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Action(ActionCommand),

    /// List the actions this build accepts
    Catalog,

    /// Show recorded dispatches
    Audit {
        /// Only entries for this action (exact name, e.g. RunContainer)
        #[arg(long)]
        action: Option<String>,

        /// Only entries with this outcome: success, validation_failure, execution_failure
        #[arg(long)]
        outcome: Option<String>,

        /// Only entries at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,

        /// Show at most the N most recent entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write .dockgate/config.yaml with defaults
    Init,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Action(action) => cmd::action::run(
            &root,
            cli.runtime.as_deref(),
            action,
            cli.dry_run,
            cli.json,
        ),
        Commands::Catalog => cmd::catalog::run(cli.json).map(|()| 0),
        Commands::Audit {
            action,
            outcome,
            since,
            limit,
        } => cmd::audit::run(
            &root,
            cmd::audit::AuditArgs {
                action,
                outcome,
                since,
                limit,
            },
            cli.json,
        )
        .map(|()| 0),
        Commands::Init => cmd::init::run(&root).map(|()| 0),
        Commands::Config { subcommand } => {
            cmd::config::run(&root, cli.runtime.as_deref(), subcommand, cli.json).map(|()| 0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
