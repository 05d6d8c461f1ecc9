mod cmd;
mod menu;
mod output;

use clap::{Parser, Subcommand};
use cmd::role::RoleSubcommand;
use output::Progress;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tenantctl_core::config::Config;

#[derive(Parser)]
#[command(
    name = "tenantctl",
    about = "Tenant project provisioning and audit for Google Cloud, driven by the companies table",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ~/.config/tenantctl/config.yaml)
    #[arg(long, global = true, env = "TENANTCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Mirror progress into this log file with timestamps
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision (or delete) tenant projects for companies in the table
    Provision,

    /// Audit tenant projects against the required layout (read-only)
    Audit {
        /// Output findings as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },

    /// Authorize the consolidated view in tenant datasets
    Views,

    /// Grant analytics read access on tenant call tables
    Permissions,

    /// Manage the analyst custom role
    Role {
        #[command(subcommand)]
        subcommand: RoleSubcommand,
    },

    /// Configure default table expiration on tenant datasets
    Expiration,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let mut progress = Progress::new(cli.log_file.as_deref())?;

    // SIGINT flips the flag; the runner checks it between actions so an
    // interrupted run still prints its partial tally.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))?;
    }

    match cli.command {
        Commands::Provision => cmd::provision::run(&config, &mut progress, cancel),
        Commands::Audit { json } => cmd::audit::run(&config, json, &mut progress, cancel),
        Commands::Views => cmd::views::run(&config, &mut progress, cancel),
        Commands::Permissions => cmd::permissions::run(&config, &mut progress, cancel),
        Commands::Role { subcommand } => cmd::role::run(&config, subcommand, &mut progress, cancel),
        Commands::Expiration => cmd::expiration::run(&config, &mut progress, cancel),
    }
}
