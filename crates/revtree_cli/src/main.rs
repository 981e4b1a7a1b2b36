//! revtree CLI
//!
//! Command-line tools for revtree repositories.
//!
//! # Commands
//!
//! - `run` - Execute a JSON script of commands and transactions
//! - `access` - Evaluate an access policy for one actor and resource

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// revtree command-line tools.
#[derive(Parser)]
#[command(name = "revtree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script against an in-memory repository
    Run {
        /// Path to the JSON script
        script: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Also print the change log of every model
        #[arg(short, long)]
        log: bool,
    },

    /// Evaluate an access policy
    Access {
        /// Path to the JSON policy
        policy: PathBuf,

        /// Acting identity
        #[arg(long)]
        actor: String,

        /// Resource address, e.g. /repo/phonebook
        #[arg(long)]
        resource: String,

        /// Kind of access (read, write or a custom kind)
        #[arg(long, default_value = "write")]
        access: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            script,
            format,
            log,
        } => {
            commands::run::run(&script, &format, log)?;
        }
        Commands::Access {
            policy,
            actor,
            resource,
            access,
        } => {
            commands::access::run(&policy, &actor, &resource, &access)?;
        }
        Commands::Version => {
            println!("revtree CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
