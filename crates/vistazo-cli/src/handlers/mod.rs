//! Command handlers

pub mod diff;
pub mod settings;

pub use diff::{run_diff, DiffOutcome};
pub use settings::{load_settings, parse_override, run_base_url, run_config};
