// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `buildforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildforge",
    version,
    about = "Evaluate a project file and build its targets.",
    long_about = None
)]
pub struct CliArgs {
    /// Project file to build (TOML).
    #[arg(long, value_name = "PATH")]
    pub project: PathBuf,

    /// Target to build; repeat for several. Defaults to the project's
    /// default targets.
    #[arg(long = "target", short = 't', value_name = "NAME")]
    pub targets: Vec<String>,

    /// Global property as `Name=Value`; repeat for several.
    #[arg(long = "property", short = 'p', value_name = "NAME=VALUE")]
    pub properties: Vec<String>,

    /// Engine settings file. Default: `buildforge.toml` if it exists.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Run thread-safe tasks in process and route the rest to task hosts.
    #[arg(long)]
    pub multi_threaded: bool,

    /// Tools version for the build.
    #[arg(long, value_name = "VERSION")]
    pub tools_version: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDFORGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and evaluate the project, print its targets and tasks, but
    /// don't build anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
