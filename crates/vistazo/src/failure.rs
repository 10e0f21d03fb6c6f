//! Screenshot on test failure.

use crate::capture::CaptureSettings;
use crate::driver::{DriverSession, PageDriver, Screenshot};
use crate::result::{VistazoError, VistazoResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Prefix of the line CI log scrapers look for
pub const FAILURE_MARKER: &str = "::FAILURE_SCREENSHOT:";

/// Grabs whatever the user would see at the moment of failure
pub trait ScreenGrabber: Send + Sync {
    fn grab(&self, session: &DriverSession) -> VistazoResult<Screenshot>;
}

/// Grabs the visible page of an already launched browser
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverScreenGrabber;

impl ScreenGrabber for DriverScreenGrabber {
    fn grab(&self, session: &DriverSession) -> VistazoResult<Screenshot> {
        let driver = session.active().ok_or_else(|| {
            VistazoError::screenshot("no browser was launched for this test")
        })?;
        if !driver.renders_visual_surface() {
            return Err(VistazoError::screenshot(format!(
                "{} does not render a visual surface",
                driver.name()
            )));
        }
        driver.screenshot_page()
    }
}

/// `FAILED-<Class>-<method>.png`
#[must_use]
pub fn failure_file_name(class: &str, method: &str) -> String {
    format!("FAILED-{class}-{method}.png")
}

/// Writes a screenshot when a test fails
#[derive(Clone)]
pub struct FailureScreenshotHook {
    grabber: Arc<dyn ScreenGrabber>,
}

impl Default for FailureScreenshotHook {
    fn default() -> Self {
        Self::new(Arc::new(DriverScreenGrabber))
    }
}

impl std::fmt::Debug for FailureScreenshotHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureScreenshotHook").finish_non_exhaustive()
    }
}

impl FailureScreenshotHook {
    #[must_use]
    pub fn new(grabber: Arc<dyn ScreenGrabber>) -> Self {
        Self { grabber }
    }

    /// Capture after a failure. Returns the written path; errors are logged
    /// and never returned, so the caller's failure stays what it was.
    pub fn on_failure(
        &self,
        class: &str,
        method: &str,
        settings: &CaptureSettings,
        opted_in: bool,
        session: &DriverSession,
    ) -> Option<PathBuf> {
        if !opted_in || !settings.enabled {
            return None;
        }
        let path = settings.screenshots_dir.join(failure_file_name(class, method));
        match self.write(&path, session) {
            Ok(absolute) => {
                println!("{FAILURE_MARKER}{}", absolute.display());
                info!(path = %absolute.display(), "saved failure screenshot");
                Some(absolute)
            }
            Err(e) => {
                error!(class, method, error = %e, "could not take failure screenshot");
                None
            }
        }
    }

    fn write(&self, path: &Path, session: &DriverSession) -> VistazoResult<PathBuf> {
        let screenshot = self.grabber.grab(session)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &screenshot.data)?;
        Ok(fs::canonicalize(path)?)
    }
}
