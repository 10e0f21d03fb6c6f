//! `base-url` and `config` handlers

use crate::commands::{ConfigArgs, ConfigFormat, SettingsArgs};
use crate::error::{CliError, CliResult};
use std::collections::BTreeMap;
use tracing::debug;
use vistazo::{resolve_base_url, RunnerConfig, Settings};

/// Split a `key=value` override
pub fn parse_override(raw: &str) -> CliResult<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::invalid_argument(format!(
            "expected KEY=VALUE, got '{raw}'"
        ))),
    }
}

/// Layer settings: standard files and environment, `--file`, then `--set`
pub fn load_settings(args: &SettingsArgs) -> CliResult<Settings> {
    let mut builder = Settings::builder();
    if !args.isolated {
        builder.load_standard()?;
    }
    if let Some(file) = &args.file {
        if !file.is_file() {
            return Err(CliError::config(format!(
                "settings file not found: {}",
                file.display()
            )));
        }
        builder.add_yaml_file(file)?;
    }
    for raw in &args.overrides {
        let (key, value) = parse_override(raw)?;
        builder.set(key, value);
    }
    debug!(sources = ?builder.sources(), "settings layered");
    Ok(builder.build())
}

/// Resolve and render the base URL; `None` when suppressed
pub fn run_base_url(args: &SettingsArgs) -> CliResult<Option<String>> {
    let settings = load_settings(args)?;
    let config = RunnerConfig::from_settings(&settings)?;
    Ok(resolve_base_url(&config.base_url)?.map(|url| url.to_string()))
}

/// Render the merged settings or the typed configuration
pub fn run_config(args: &ConfigArgs) -> CliResult<String> {
    let settings = load_settings(&args.settings)?;
    if args.raw {
        let values: BTreeMap<&str, &str> = settings.iter().collect();
        return render(&values, args.format);
    }
    let config = RunnerConfig::from_settings(&settings)?;
    render(&config, args.format)
}

fn render<T: serde::Serialize>(value: &T, format: ConfigFormat) -> CliResult<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(value)?,
        ConfigFormat::Yaml => serde_yaml_ng::to_string(value)?,
    })
}
