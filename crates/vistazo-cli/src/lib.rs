//! Vistazo CLI library
//!
//! Inspect how settings resolve for a test run and compare screenshots
//! against their baselines outside of a test.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;

pub use commands::{Cli, Commands, ConfigArgs, ConfigFormat, DiffArgs, SettingsArgs};
pub use config::{CliConfig, Verbosity};
pub use error::{CliError, CliResult};
