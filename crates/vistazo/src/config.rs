//! Typed runner configuration derived from [`Settings`].

use crate::base_url::BaseUrlConfig;
use crate::capture::{CaptureSettings, DEFAULT_SCREENSHOTS_DIR};
use crate::driver::DriverConfig;
use crate::result::VistazoResult;
use crate::settings::Settings;
use crate::visual_regression::DEFAULT_COLOR_THRESHOLD;
use crate::wait::{timeout_from_sleep, DEFAULT_SLEEP_MS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Setting keys
pub mod keys {
    pub const NO_BASE_URL: &str = "no.base.url";
    pub const BASE_URL: &str = "base.url";
    pub const HTTPS: &str = "https";
    pub const CREDENTIALS: &str = "credentials";
    pub const HOST: &str = "host";
    /// Legacy host key, wins over `host`
    pub const TOMCAT_HOSTNAME: &str = "tomcat_hostname";
    pub const PORT: &str = "port";
    pub const PATH: &str = "path";
    pub const SCREENSHOTS_ENABLED: &str = "screenshots.enabled";
    pub const SCREENSHOTS_TIMESTAMPED: &str = "screenshots.timestamped";
    pub const FAIL_ON_DIVERGENCE: &str = "screenshots.fail.on.divergence";
    pub const SCREENSHOTS_BASELINE: &str = "screenshots.baseline";
    pub const SCREENSHOTS_DIR: &str = "screenshots.dir";
    pub const COLOR_THRESHOLD: &str = "screenshots.color.threshold";
    pub const BROWSER: &str = "browser";
    pub const HEADLESS: &str = "webdriver.headless";
    pub const IMPLICIT_WAIT_SECONDS: &str = "webdriver.implicit.wait.seconds";
    pub const MAXIMIZE: &str = "webdriver.maximize";
    pub const SLEEP: &str = "sleep";
}

/// Everything a test invocation needs to know from settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Base URL inputs
    pub base_url: BaseUrlConfig,
    /// Screenshot policy
    pub capture: CaptureSettings,
    /// Browser launch options
    pub driver: DriverConfig,
    /// Timeout of injected waiters
    pub wait_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: BaseUrlConfig::default(),
            capture: CaptureSettings::default(),
            driver: DriverConfig::default(),
            wait_timeout: timeout_from_sleep(DEFAULT_SLEEP_MS),
        }
    }
}

impl RunnerConfig {
    /// Derive the configuration; unparsable values are configuration errors
    pub fn from_settings(settings: &Settings) -> VistazoResult<Self> {
        let host = settings
            .get_opt_string(keys::TOMCAT_HOSTNAME)
            .or_else(|| settings.get_opt_string(keys::HOST));
        let base_url = BaseUrlConfig {
            no_base_url: settings.get_bool(keys::NO_BASE_URL, false)?,
            explicit: settings.get_opt_string(keys::BASE_URL),
            https: settings.get_bool(keys::HTTPS, false)?,
            credentials: settings.get_opt_string(keys::CREDENTIALS),
            host,
            port: settings.get_opt_int(keys::PORT)?.filter(|p| *p != -1),
            path: settings.get_opt_string(keys::PATH),
        };

        let threshold = settings.get_int(keys::COLOR_THRESHOLD, i64::from(DEFAULT_COLOR_THRESHOLD))?;
        let capture = CaptureSettings {
            enabled: settings.get_bool(keys::SCREENSHOTS_ENABLED, true)?,
            timestamped: settings.get_bool(keys::SCREENSHOTS_TIMESTAMPED, false)?,
            fail_on_divergence: settings.get_bool(keys::FAIL_ON_DIVERGENCE, false)?,
            baseline_dir: settings.get_opt_string(keys::SCREENSHOTS_BASELINE).map(PathBuf::from),
            screenshots_dir: PathBuf::from(settings.get_string(keys::SCREENSHOTS_DIR, DEFAULT_SCREENSHOTS_DIR)),
            color_threshold: u8::try_from(threshold.clamp(0, 255)).unwrap_or(u8::MAX),
        };

        let defaults = DriverConfig::default();
        let implicit = settings.get_int(
            keys::IMPLICIT_WAIT_SECONDS,
            defaults.implicit_wait.as_secs() as i64,
        )?;
        let driver = DriverConfig {
            browser: settings.get_string(keys::BROWSER, &defaults.browser),
            headless: settings.get_bool(keys::HEADLESS, defaults.headless)?,
            implicit_wait: Duration::from_secs(implicit.max(0) as u64),
            maximize: settings.get_bool(keys::MAXIMIZE, false)?,
            ..defaults
        };

        Ok(Self {
            base_url,
            capture,
            driver,
            wait_timeout: timeout_from_sleep(settings.get_int(keys::SLEEP, DEFAULT_SLEEP_MS)?),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::base_url::resolve;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_settings(&Settings::default()).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert!(config.capture.enabled);
        assert!(!config.capture.fail_on_divergence);
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_base_url_keys() {
        let settings = Settings::from_pairs([
            ("host", "ignored"),
            ("tomcat_hostname", "tc"),
            ("port", "8123"),
            ("path", "app"),
        ]);
        let config = RunnerConfig::from_settings(&settings).unwrap();
        assert_eq!(
            resolve(&config.base_url).unwrap().unwrap().as_str(),
            "http://tc:8123/app"
        );
    }

    #[test]
    fn test_port_minus_one_means_unset() {
        let settings = Settings::from_pairs([("port", "-1")]);
        let config = RunnerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.base_url.port, None);
    }

    #[test]
    fn test_capture_and_driver_keys() {
        let settings = Settings::from_pairs([
            ("screenshots.enabled", "false"),
            ("screenshots.timestamped", "true"),
            ("screenshots.fail.on.divergence", "true"),
            ("screenshots.baseline", "golden"),
            ("screenshots.dir", "out"),
            ("browser", "chrome"),
            ("webdriver.maximize", "true"),
            ("webdriver.implicit.wait.seconds", "3"),
            ("sleep", "500"),
        ]);
        let config = RunnerConfig::from_settings(&settings).unwrap();
        assert!(!config.capture.enabled);
        assert!(config.capture.timestamped);
        assert!(config.capture.fail_on_divergence);
        assert_eq!(config.capture.baseline_dir, Some(PathBuf::from("golden")));
        assert_eq!(config.capture.screenshots_dir, PathBuf::from("out"));
        assert_eq!(config.driver.browser, "chrome");
        assert!(config.driver.maximize);
        assert_eq!(config.driver.implicit_wait, Duration::from_secs(3));
        assert_eq!(config.wait_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_values_are_config_errors() {
        let settings = Settings::from_pairs([("https", "sometimes")]);
        assert!(RunnerConfig::from_settings(&settings).unwrap_err().is_config());
    }
}
