//! Classnet - classroom thin-client server provisioning tool.
//!
//! Keeps persistent operational state consistent across the server and the
//! shared guest root the clients boot from:
//! - KEY=VALUE config store (idempotent upserts)
//! - required-group reconciliation across both namespaces
//! - migration import from a prior server instance

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use classnet::commands;
use classnet::commands::show::ShowTarget;
use classnet::config::Config;
use classnet::process::SystemRunner;
use classnet::prompt::{PresetPrompt, StdinPrompt};

#[derive(Parser)]
#[command(name = "classnet")]
#[command(about = "Classroom thin-client server provisioning tool")]
#[command(
    after_help = "QUICK START:\n  classnet preflight          Check required tools\n  classnet reconcile groups   Correct group drift on server and guest\n  classnet reconcile users    Put every user in the required groups\n  classnet import migration <archive>  Import accounts from an old server"
)]
struct Cli {
    /// Emit reports as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or write the persistent config store
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Correct group and membership drift
    Reconcile {
        #[command(subcommand)]
        target: ReconcileTarget,
    },

    /// Import accounts from a prior server
    Import {
        #[command(subcommand)]
        what: ImportTarget,
    },

    /// Run preflight checks (verify required tools and paths)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowWhat,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the value stored for a key
    Get {
        key: String,
        /// Take the earliest line for the key instead of the latest
        #[arg(long)]
        first_match: bool,
    },
    /// Set a key, replacing any existing line for it
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum ReconcileTarget {
    /// Required groups on the server and in the guest root
    Groups {
        /// Rewrite mismatched group ids without asking
        #[arg(long)]
        assume_yes: bool,
    },
    /// Memberships for every ordinary user
    Users,
    /// Memberships for a single user
    User { name: String },
}

#[derive(Subcommand)]
enum ImportTarget {
    /// An unpacked bundle directory holding the .mig export files
    Bundle { dir: PathBuf },
    /// A full migration archive (tar.gz) including home directories
    Migration { archive: PathBuf },
}

#[derive(Subcommand)]
enum ShowWhat {
    /// Show current configuration
    Config,
    /// Show required groups against both namespaces
    Groups,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir);
    let runner = SystemRunner::new(&config.guest_root);

    let cli = Cli::parse();
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Get { key, first_match } => {
                commands::cmd_config_get(&config, &key, first_match)?;
            }
            ConfigAction::Set { key, value } => {
                commands::cmd_config_set(&config, &key, &value)?;
            }
        },

        Commands::Reconcile { target } => match target {
            ReconcileTarget::Groups { assume_yes } => {
                if assume_yes {
                    let prompt = PresetPrompt { answer: true };
                    commands::cmd_reconcile_groups(&config, &runner, &prompt, cli.json)?;
                } else {
                    commands::cmd_reconcile_groups(&config, &runner, &StdinPrompt, cli.json)?;
                }
            }
            ReconcileTarget::Users => {
                commands::cmd_reconcile_users(&config, &runner, cli.json)?;
            }
            ReconcileTarget::User { name } => {
                commands::cmd_reconcile_user(&config, &runner, &name, cli.json)?;
            }
        },

        Commands::Import { what } => match what {
            ImportTarget::Bundle { dir } => {
                commands::cmd_import_bundle(&config, &runner, &dir, cli.json)?;
            }
            ImportTarget::Migration { archive } => {
                commands::cmd_import_migration(&config, &runner, &archive, cli.json)?;
            }
        },

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let target = match what {
                ShowWhat::Config => ShowTarget::Config,
                ShowWhat::Groups => ShowTarget::Groups,
            };
            commands::cmd_show(&config, target)?;
        }
    }

    Ok(())
}
