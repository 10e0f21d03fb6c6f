//! Visual capture and baseline comparison.
//!
//! [`VisualCapture::capture_and_compare`] never fails with an error. The
//! result is a [`CaptureVerdict`]:
//!
//! - `Passed` - skipped, saved, or compared within tolerance
//! - `SoftFailure` - capture fault or divergence that policy tolerates; log it
//! - `HardFailure` - divergence with fail-on-divergence set; fail the test

use crate::driver::{DriverHandle, PageDriver};
use crate::locator::Locator;
use crate::result::{VistazoError, VistazoResult};
use crate::visual_regression::{
    VisualRegressionConfig, VisualRegressionTester, DEFAULT_COLOR_THRESHOLD, DEFAULT_TOLERANCE,
};
use crate::wait::{WaitOptions, Waiter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long capture waits for its target to become visible
pub const CAPTURE_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Polling interval of the visibility wait
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 10;

/// Default screenshot directory
pub const DEFAULT_SCREENSHOTS_DIR: &str = "target/screenshots";

/// Timestamp suffix format for timestamped filenames
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// What to capture for a fixture and how to judge it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureDirective {
    /// Extra filename component
    pub label: Option<String>,
    /// Element to capture; the whole page when it is `body`
    pub of: Locator,
    /// Element to wait for before capturing; defaults to `of`
    pub wait_for: Option<Locator>,
    /// Pause before capturing
    pub delay: Duration,
    /// Tolerated divergence (0.0-1.0)
    pub max_deviation: f64,
    /// Baseline folder, overriding the configured one
    pub baseline: Option<PathBuf>,
}

impl Default for CaptureDirective {
    fn default() -> Self {
        Self {
            label: None,
            of: Locator::body(),
            wait_for: None,
            delay: Duration::ZERO,
            max_deviation: DEFAULT_TOLERANCE,
            baseline: None,
        }
    }
}

impl CaptureDirective {
    /// Capture the whole page
    #[must_use]
    pub fn whole_page() -> Self {
        Self::default()
    }

    /// Capture one element
    #[must_use]
    pub fn element(locator: Locator) -> Self {
        Self {
            of: locator,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn wait_for(mut self, locator: Locator) -> Self {
        self.wait_for = Some(locator);
        self
    }

    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the tolerance, clamped to 0.0-1.0
    #[must_use]
    pub fn max_deviation(mut self, tolerance: f64) -> Self {
        self.max_deviation = tolerance.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn baseline(mut self, folder: impl Into<PathBuf>) -> Self {
        self.baseline = Some(folder.into());
        self
    }
}

/// Global capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Screenshots are taken at all
    pub enabled: bool,
    /// Append a timestamp to screenshot filenames
    pub timestamped: bool,
    /// Divergence beyond tolerance fails the test
    pub fail_on_divergence: bool,
    /// Folder holding baseline images
    pub baseline_dir: Option<PathBuf>,
    /// Folder screenshots are written to
    pub screenshots_dir: PathBuf,
    /// Per-pixel color difference threshold
    pub color_threshold: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timestamped: false,
            fail_on_divergence: false,
            baseline_dir: None,
            screenshots_dir: PathBuf::from(DEFAULT_SCREENSHOTS_DIR),
            color_threshold: DEFAULT_COLOR_THRESHOLD,
        }
    }
}

/// Single capture, consumed by [`VisualCapture::capture_and_compare`]
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Filename without extension
    pub file_base: String,
    /// Element to capture
    pub target: Locator,
    /// Element to wait for
    pub wait_for: Locator,
    /// Pause before capturing
    pub delay: Duration,
    /// Tolerated divergence
    pub tolerance: f64,
    /// Append a timestamp to the filename
    pub timestamped: bool,
    /// Hard-fail on divergence
    pub fail_on_divergence: bool,
    /// Output folder
    pub screenshots_dir: PathBuf,
    /// Baseline folder
    pub baseline_dir: Option<PathBuf>,
    /// Per-pixel color difference threshold
    pub color_threshold: u8,
}

impl CaptureRequest {
    /// Request for a fixture capture
    #[must_use]
    pub fn for_fixture(
        class: &str,
        method: &str,
        fixture: &str,
        directive: &CaptureDirective,
        settings: &CaptureSettings,
    ) -> Self {
        Self {
            file_base: capture_file_base(class, method, directive.label.as_deref(), fixture),
            target: directive.of.clone(),
            wait_for: directive.wait_for.clone().unwrap_or_else(|| directive.of.clone()),
            delay: directive.delay,
            tolerance: directive.max_deviation,
            timestamped: settings.timestamped,
            fail_on_divergence: settings.fail_on_divergence,
            screenshots_dir: settings.screenshots_dir.clone(),
            baseline_dir: directive
                .baseline
                .clone()
                .or_else(|| settings.baseline_dir.clone()),
            color_threshold: settings.color_threshold,
        }
    }

    /// Filename of the baseline image
    #[must_use]
    pub fn baseline_name(&self) -> String {
        format!("{}.png", self.file_base)
    }

    /// Filename the capture is saved under
    #[must_use]
    pub fn file_name(&self, now: chrono::DateTime<chrono::Local>) -> String {
        if self.timestamped {
            format!("{}-{}.png", self.file_base, now.format(TIMESTAMP_FORMAT))
        } else {
            self.baseline_name()
        }
    }

    /// Filename of the diff image
    #[must_use]
    pub fn diff_name(&self) -> String {
        format!("{}-diff.png", self.file_base)
    }
}

/// `<Class>-<method>-[<label>-]<TypeSimpleName>`
#[must_use]
pub fn capture_file_base(class: &str, method: &str, label: Option<&str>, type_name: &str) -> String {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => format!("{class}-{method}-{label}-{type_name}"),
        None => format!("{class}-{method}-{type_name}"),
    }
}

/// Details of a divergence beyond tolerance
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceReport {
    /// Captured image
    pub path: PathBuf,
    /// Baseline image
    pub baseline: PathBuf,
    /// Diff image
    pub diff_path: PathBuf,
    /// Measured divergence
    pub divergence: f64,
    /// Tolerance that was exceeded
    pub tolerance: f64,
    /// Human readable summary
    pub message: String,
}

/// What a passing capture did
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Nothing captured
    Skipped {
        /// Why
        reason: String,
    },
    /// Saved with no baseline to compare against
    Saved {
        /// Captured image
        path: PathBuf,
    },
    /// Saved and within tolerance of the baseline
    Matched {
        /// Captured image
        path: PathBuf,
        /// Measured divergence
        divergence: f64,
    },
}

/// A failure policy lets the test continue past
#[derive(Debug)]
pub enum SoftFailure {
    /// Divergence beyond tolerance, fail-on-divergence unset
    Diverged(DivergenceReport),
    /// Capture, persistence or comparison fault
    Fault(VistazoError),
}

/// Result of one capture
#[derive(Debug)]
pub enum CaptureVerdict {
    /// Skipped, saved, or matched
    Passed(CaptureOutcome),
    /// Logged and tolerated
    SoftFailure(SoftFailure),
    /// Fails the test
    HardFailure(VistazoError),
}

impl CaptureVerdict {
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        matches!(self, Self::HardFailure(_))
    }

    /// Only a hard failure becomes an error
    pub fn into_result(self) -> VistazoResult<Option<CaptureOutcome>> {
        match self {
            Self::Passed(outcome) => Ok(Some(outcome)),
            Self::SoftFailure(_) => Ok(None),
            Self::HardFailure(e) => Err(e),
        }
    }
}

/// Captures screenshots and compares them against baselines
#[derive(Debug, Clone)]
pub struct VisualCapture {
    wait: WaitOptions,
}

impl Default for VisualCapture {
    fn default() -> Self {
        Self::new(
            WaitOptions::new()
                .with_timeout(CAPTURE_WAIT_TIMEOUT_MS)
                .with_poll_interval(CAPTURE_POLL_INTERVAL_MS),
        )
    }
}

impl VisualCapture {
    /// Capture engine with a custom visibility wait
    #[must_use]
    pub const fn new(wait: WaitOptions) -> Self {
        Self { wait }
    }

    /// Capture, persist and compare
    pub fn capture_and_compare(&self, request: &CaptureRequest, driver: &DriverHandle) -> CaptureVerdict {
        match self.run(request, driver) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(file = %request.file_base, error = %e, "screenshot capture failed");
                CaptureVerdict::SoftFailure(SoftFailure::Fault(e))
            }
        }
    }

    fn run(&self, request: &CaptureRequest, driver: &DriverHandle) -> VistazoResult<CaptureVerdict> {
        if !driver.renders_visual_surface() {
            debug!(engine = driver.name(), "driver renders no visual surface, capture skipped");
            return Ok(CaptureVerdict::Passed(CaptureOutcome::Skipped {
                reason: format!("{} renders no visual surface", driver.name()),
            }));
        }
        if !request.delay.is_zero() {
            std::thread::sleep(request.delay);
        }
        if !request.wait_for.is_whole_page() {
            let waiter = Waiter::with_options(driver.clone(), self.wait);
            if let Err(e) = waiter.until_visible(&request.wait_for) {
                warn!(locator = %request.wait_for, error = %e, "capture target not visible, capturing anyway");
            }
        }

        let shot = if request.target.is_whole_page() {
            driver.screenshot_page()?
        } else {
            let element = driver.find_element(&request.target)?;
            driver.screenshot_element(&element)?
        };

        std::fs::create_dir_all(&request.screenshots_dir)?;
        let path = request.screenshots_dir.join(request.file_name(chrono::Local::now()));
        std::fs::write(&path, &shot.data)?;
        info!(path = %path.display(), "saved screenshot for {}", request.file_base);

        let Some(baseline) = request
            .baseline_dir
            .as_deref()
            .filter(|dir| dir.is_dir())
            .map(|dir| dir.join(request.baseline_name()))
            .filter(|file| file.is_file())
        else {
            return Ok(CaptureVerdict::Passed(CaptureOutcome::Saved { path }));
        };

        self.compare(request, path, &baseline, &shot.to_image()?)
    }

    fn compare(
        &self,
        request: &CaptureRequest,
        path: PathBuf,
        baseline: &Path,
        actual: &image::RgbaImage,
    ) -> VistazoResult<CaptureVerdict> {
        let expected = image::open(baseline)?.to_rgba8();
        let tester = VisualRegressionTester::new(
            VisualRegressionConfig::default().with_color_threshold(request.color_threshold),
        );
        let result = tester.compare(actual, &expected);
        debug!(divergence = result.divergence, tolerance = request.tolerance, "compared against baseline");
        if !result.exceeds(request.tolerance) {
            return Ok(CaptureVerdict::Passed(CaptureOutcome::Matched {
                path,
                divergence: result.divergence,
            }));
        }

        let diff_path = request.screenshots_dir.join(request.diff_name());
        result.save_diff(&diff_path)?;
        let message = format!(
            "Screen shots diverged more than {:06.2}% after {}. Diff image: {}",
            request.tolerance * 100.0,
            request.file_base,
            diff_path.display()
        );
        if request.fail_on_divergence {
            return Ok(CaptureVerdict::HardFailure(VistazoError::ScreenshotDivergence {
                message,
                divergence: result.divergence,
                diff_path,
            }));
        }
        warn!("{message}");
        Ok(CaptureVerdict::SoftFailure(SoftFailure::Diverged(DivergenceReport {
            path,
            baseline: baseline.to_path_buf(),
            diff_path,
            divergence: result.divergence,
            tolerance: request.tolerance,
            message,
        })))
    }
}
