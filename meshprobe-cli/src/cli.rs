//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use meshprobe_verifier::suite::DEFAULT_SUITE_FILE;

/// meshprobe -- service mesh traffic verification.
///
/// Use `meshprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "meshprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the meshprobe.toml configuration file.
    #[arg(short, long, default_value = "meshprobe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full verification suite.
    Run(RunArgs),

    /// Run the reachability check only.
    Reachability(ReachabilityArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Cluster selection shared by the verification commands.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Namespace holding the test topology.
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Probe topology cells one at a time.
    #[arg(long)]
    pub sequential: bool,
}

// ---- run ----

/// Reachability, then every routing scenario of the suite.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario suite file.
    #[arg(long, default_value = DEFAULT_SUITE_FILE)]
    pub suite: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Skip the routing scenarios.
    #[arg(long)]
    pub skip_routing: bool,
}

// ---- reachability ----

/// Probe every topology cell and correlate with proxy logs.
#[derive(Args, Debug)]
pub struct ReachabilityArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

// ---- config ----

/// Manage meshprobe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, cluster, verifier, topology).
        #[arg(long)]
        section: Option<String>,
    },
}
