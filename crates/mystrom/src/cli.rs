//! Clap derive structures for the `mystrom` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// mystrom -- mirror myStrom devices into a local state tree
#[derive(Debug, Parser)]
#[command(
    name = "mystrom",
    version,
    about = "Sync myStrom devices between the vendor cloud and the local network",
    long_about = "Logs in to the myStrom cloud, enumerates the account's devices,\n\
        polls each device over its local HTTP API and mirrors everything into\n\
        a hierarchical state tree.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MYSTROM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sync engine until Ctrl-C
    ///
    /// Reads `path=value` writes from stdin and routes them to the cloud or
    /// the device, e.g. `AA01.localCommands.switch=true`.
    Run(RunArgs),

    /// Log in, enumerate once, and list the account's devices
    Devices,

    /// Manage the configuration file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// State snapshot file (overrides `state_file`)
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Do not write the state snapshot on exit
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved configuration (password masked)
    Show,

    /// Set a configuration value and save the file
    Set {
        /// Config key (e.g., "cloud.email", "polling.default_interval")
        key: String,

        /// Value to set
        value: String,
    },
}
