//! Command-line argument definitions, grounded on the teacher's
//! `ratchet-cli::cli` `clap::Parser`/`Subcommand` derive pattern.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "mcprox connection/dispatch substrate", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file; defaults built in if omitted.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level passed to tracing's env filter (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL", global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file without starting anything.
    ConfigValidate {
        /// Path to the TOML file to validate.
        path: PathBuf,
    },

    /// Server registry operations.
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },

    /// Activity log operations.
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },

    /// Print readiness and liveness once and exit.
    Health,
}

#[derive(Subcommand)]
pub enum ServerCommands {
    /// List every registered upstream server and its current state.
    List,

    /// Enable or disable a server.
    SetEnabled {
        name: String,
        #[arg(long)]
        enabled: bool,
    },

    /// Quarantine or release a server.
    SetQuarantined {
        name: String,
        #[arg(long)]
        quarantined: bool,
    },
}

#[derive(Subcommand)]
pub enum ActivityCommands {
    /// List the most recent activity records.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        server: Option<String>,
    },
}
