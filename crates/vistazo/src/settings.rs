//! Layered key/value settings.
//!
//! Later layers override earlier ones. The standard stack, lowest first:
//! class defaults, `/etc/vistazo/defaults.yaml`, `~/.vistazo/defaults.yaml`,
//! `./vistazo.yaml`, `VISTAZO_*` environment variables, explicit overrides.
//!
//! Keys are compared with `_` and `.` treated alike, so `tomcat_hostname`,
//! `tomcat.hostname` and the variable `VISTAZO_TOMCAT_HOSTNAME` all name the
//! same setting. Nested YAML maps are flattened with `.`.

use crate::result::{VistazoError, VistazoResult};
use serde::Serialize;
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of environment variables read into settings
pub const ENV_PREFIX: &str = "VISTAZO_";

/// Name of the per-project settings file
pub const PROJECT_FILE: &str = "vistazo.yaml";

fn canonical(key: &str) -> String {
    key.trim().replace('_', ".")
}

/// Merged settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Start layering settings
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Settings from literal pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut builder = Self::builder();
        builder.add_pairs(pairs);
        builder.build()
    }

    /// Raw value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&canonical(key)).map(String::as_str)
    }

    /// Whether a key is set
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&canonical(key))
    }

    /// String value or default
    #[must_use]
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Non-blank string value
    #[must_use]
    pub fn get_opt_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Boolean value or default
    pub fn get_bool(&self, key: &str, default: bool) -> VistazoResult<bool> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(VistazoError::config(format!(
                    "setting '{key}' is not a boolean: '{v}'"
                ))),
            },
        }
    }

    /// Integer value or default
    pub fn get_int(&self, key: &str, default: i64) -> VistazoResult<i64> {
        Ok(self.get_opt_int(key)?.unwrap_or(default))
    }

    /// Integer value, if set
    pub fn get_opt_int(&self, key: &str) -> VistazoResult<Option<i64>> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| {
                VistazoError::config(format!("setting '{key}' is not an integer: '{v}'"))
            }),
        }
    }

    /// Floating point value or default
    pub fn get_float(&self, key: &str, default: f64) -> VistazoResult<f64> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                VistazoError::config(format!("setting '{key}' is not a number: '{v}'"))
            }),
        }
    }

    /// These settings layered over lower-precedence defaults
    #[must_use]
    pub fn with_fallbacks<K: AsRef<str>, V: AsRef<str>>(&self, defaults: &[(K, V)]) -> Self {
        let mut values: BTreeMap<String, String> = defaults
            .iter()
            .map(|(k, v)| (canonical(k.as_ref()), v.as_ref().to_string()))
            .collect();
        values.extend(self.values.clone());
        Self { values }
    }

    /// All entries, keys in canonical form
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accumulates settings layers
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    values: BTreeMap<String, String>,
    sources: Vec<String>,
}

impl SettingsBuilder {
    /// Set one value
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(canonical(key), value.into());
        self
    }

    /// Layer literal pairs
    pub fn add_pairs<K, V, I>(&mut self, pairs: I) -> &mut Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in pairs {
            self.set(k.as_ref(), v);
        }
        self
    }

    /// Layer a YAML document
    pub fn add_yaml_str(&mut self, source: &str, yaml: &str) -> VistazoResult<&mut Self> {
        let value: Value = serde_yaml_ng::from_str(yaml)?;
        match value {
            Value::Null => {}
            Value::Mapping(_) => flatten("", &value, &mut self.values),
            _ => {
                return Err(VistazoError::config(format!(
                    "{source}: settings file must contain a mapping"
                )))
            }
        }
        self.sources.push(source.to_string());
        Ok(self)
    }

    /// Layer a YAML file; a missing file is skipped
    pub fn add_yaml_file(&mut self, path: impl AsRef<Path>) -> VistazoResult<&mut Self> {
        let path = path.as_ref();
        if !path.is_file() {
            debug!(path = %path.display(), "settings file absent");
            return Ok(self);
        }
        let text = std::fs::read_to_string(path)?;
        self.add_yaml_str(&path.display().to_string(), &text)
    }

    /// Layer `VISTAZO_*` variables from the process environment
    pub fn add_env(&mut self) -> &mut Self {
        self.add_env_from(std::env::vars())
    }

    /// Layer `VISTAZO_*` variables from an explicit list
    pub fn add_env_from<I: IntoIterator<Item = (String, String)>>(&mut self, vars: I) -> &mut Self {
        let mut any = false;
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                if !key.is_empty() {
                    self.set(&key.to_ascii_lowercase(), value);
                    any = true;
                }
            }
        }
        if any {
            self.sources.push("environment".to_string());
        }
        self
    }

    /// Layer the standard files and the environment
    pub fn load_standard(&mut self) -> VistazoResult<&mut Self> {
        for path in standard_files() {
            self.add_yaml_file(path)?;
        }
        Ok(self.add_env())
    }

    /// Sources that contributed, in layering order
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Finish layering
    #[must_use]
    pub fn build(&self) -> Settings {
        Settings {
            values: self.values.clone(),
        }
    }
}

/// Settings files consulted by [`SettingsBuilder::load_standard`], lowest first
#[must_use]
pub fn standard_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/vistazo/defaults.yaml")];
    if let Some(home) = std::env::var_os("HOME") {
        files.push(PathBuf::from(home).join(".vistazo").join("defaults.yaml"));
    }
    files.push(PathBuf::from(PROJECT_FILE));
    files
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    let scalar = match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let Some(key) = scalar_text(k) else { continue };
                let key = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, v, out);
            }
            return;
        }
        Value::Sequence(items) => items
            .iter()
            .filter_map(scalar_text)
            .collect::<Vec<_>>()
            .join(","),
        other => match scalar_text(other) {
            Some(text) => text,
            None => return,
        },
    };
    out.insert(canonical(prefix), scalar);
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_typed_lookups() {
        let settings = Settings::from_pairs([("port", "8123"), ("https", "yes"), ("host", "box")]);
        assert_eq!(settings.get_int("port", -1).unwrap(), 8123);
        assert!(settings.get_bool("https", false).unwrap());
        assert_eq!(settings.get_string("host", "localhost"), "box");
        assert_eq!(settings.get_string("path", "/"), "/");
        assert_eq!(settings.get_int("missing", -1).unwrap(), -1);
    }

    #[test]
    fn test_parse_errors_are_config_errors() {
        let settings = Settings::from_pairs([("port", "eighty"), ("https", "maybe")]);
        assert!(settings.get_int("port", -1).unwrap_err().is_config());
        assert!(settings.get_bool("https", false).unwrap_err().is_config());
    }

    #[test]
    fn test_underscore_and_dot_are_interchangeable() {
        let settings = Settings::from_pairs([("tomcat_hostname", "tc")]);
        assert_eq!(settings.get("tomcat.hostname"), Some("tc"));
        assert_eq!(settings.get("tomcat_hostname"), Some("tc"));
    }

    #[test]
    fn test_later_layers_win() {
        let mut builder = Settings::builder();
        builder.add_pairs([("host", "a"), ("port", "1")]);
        builder.add_env_from([
            ("VISTAZO_HOST".to_string(), "b".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        builder.set("port", "2");
        let settings = builder.build();
        assert_eq!(settings.get("host"), Some("b"));
        assert_eq!(settings.get("port"), Some("2"));
        assert!(!settings.contains("path"));
        assert_eq!(builder.sources(), ["environment"]);
    }

    #[test]
    fn test_env_maps_to_dotted_keys() {
        let mut builder = Settings::builder();
        builder.add_env_from([("VISTAZO_SCREENSHOTS_DIR".to_string(), "/tmp/s".to_string())]);
        assert_eq!(builder.build().get("screenshots.dir"), Some("/tmp/s"));
    }

    #[test]
    fn test_yaml_is_flattened() {
        let mut builder = Settings::builder();
        builder
            .add_yaml_str(
                "inline",
                "host: example.org\nport: 8080\nscreenshots:\n  enabled: false\n  dir: out\nbrowsers: [chrome, htmlunit]\n",
            )
            .unwrap();
        let settings = builder.build();
        assert_eq!(settings.get_int("port", 0).unwrap(), 8080);
        assert!(!settings.get_bool("screenshots.enabled", true).unwrap());
        assert_eq!(settings.get("screenshots.dir"), Some("out"));
        assert_eq!(settings.get("browsers"), Some("chrome,htmlunit"));
    }

    #[test]
    fn test_yaml_must_be_mapping() {
        let mut builder = Settings::builder();
        assert!(builder.add_yaml_str("inline", "- a\n- b\n").is_err());
    }

    #[test]
    fn test_yaml_file_missing_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = Settings::builder();
        builder.add_yaml_file(dir.path().join("absent.yaml")).unwrap();
        assert!(builder.build().is_empty());

        let path = dir.path().join("vistazo.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "path: /app").unwrap();
        builder.add_yaml_file(&path).unwrap();
        assert_eq!(builder.build().get("path"), Some("/app"));
    }

    #[test]
    fn test_fallbacks_sit_below() {
        let settings = Settings::from_pairs([("port", "9000")]);
        let layered = settings.with_fallbacks(&[("port", "1"), ("path", "/x")]);
        assert_eq!(layered.get("port"), Some("9000"));
        assert_eq!(layered.get("path"), Some("/x"));
    }
}
