//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vistazo: page binding, injection and visual regression for browser tests
#[derive(Parser, Debug)]
#[command(name = "vistazo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the base URL tests would open
    BaseUrl(SettingsArgs),

    /// Show the resolved runner configuration
    Config(ConfigArgs),

    /// Compare a screenshot against its baseline
    Diff(DiffArgs),
}

/// Where settings come from
#[derive(Parser, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Override a setting (repeatable), e.g. `--set port=8080`
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Extra YAML settings file, above the standard files
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Skip the standard settings files and environment variables
    #[arg(long)]
    pub isolated: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Settings sources
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ConfigFormat,

    /// Print the raw key/value settings instead of the typed configuration
    #[arg(long)]
    pub raw: bool,
}

/// Output formats for the config command
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

/// Arguments for the diff command
#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Freshly captured screenshot
    pub actual: PathBuf,

    /// Baseline screenshot
    pub baseline: PathBuf,

    /// Largest tolerated fraction of differing pixels (0.0 - 1.0)
    #[arg(long, default_value_t = vistazo::DEFAULT_TOLERANCE)]
    pub max_deviation: f64,

    /// Per-pixel color distance below which pixels count as equal
    #[arg(long, default_value_t = vistazo::DEFAULT_COLOR_THRESHOLD)]
    pub color_threshold: u8,

    /// Where to write the diff image when the screenshots diverge
    #[arg(long, value_name = "FILE")]
    pub diff_out: Option<PathBuf>,

    /// Exit with failure when the screenshots diverge
    #[arg(long)]
    pub fail: bool,
}
