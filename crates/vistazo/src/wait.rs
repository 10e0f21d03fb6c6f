//! Bounded polling waits against the page.
//!
//! A [`Waiter`] is injectable: tests and page models ask the container for one
//! and get a waiter bound to the invocation's driver, with the timeout derived
//! from the `sleep` setting.

use crate::descriptor::TypeDescriptor;
use crate::driver::{DriverHandle, ElementHandle, PageDriver};
use crate::inject::{Injectable, Injector};
use crate::locator::Locator;
use crate::result::{VistazoError, VistazoResult};
use std::time::{Duration, Instant};
use tracing::trace;

/// Default wait timeout in milliseconds
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// `sleep` setting default, in milliseconds
pub const DEFAULT_SLEEP_MS: i64 = 1_000;

/// The wait timeout is this many `sleep` periods
pub const SLEEP_MULTIPLIER: i64 = 10;

/// Wait timeout derived from the `sleep` setting, whole seconds
#[must_use]
pub fn timeout_from_sleep(sleep_ms: i64) -> Duration {
    let seconds = (sleep_ms.max(0) * SLEEP_MULTIPLIER) / 1_000;
    Duration::from_secs(seconds as u64)
}

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Injectable for WaitOptions {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::new::<Self>()
    }

    fn construct(_: &Injector) -> VistazoResult<Self> {
        Ok(Self::default())
    }
}

/// Polls the page until a condition holds or the timeout passes
#[derive(Debug, Clone)]
pub struct Waiter {
    driver: DriverHandle,
    options: WaitOptions,
}

impl Waiter {
    /// Waiter with default options
    #[must_use]
    pub fn new(driver: DriverHandle) -> Self {
        Self::with_options(driver, WaitOptions::default())
    }

    /// Waiter with explicit options
    #[must_use]
    pub const fn with_options(driver: DriverHandle, options: WaitOptions) -> Self {
        Self { driver, options }
    }

    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    #[must_use]
    pub const fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    /// Poll `predicate` until it yields `Some`.
    ///
    /// Errors from the predicate abort the wait.
    pub fn until<T, F>(&self, description: &str, mut predicate: F) -> VistazoResult<T>
    where
        F: FnMut(&DriverHandle) -> VistazoResult<Option<T>>,
    {
        let start = Instant::now();
        loop {
            if let Some(value) = predicate(&self.driver)? {
                trace!(
                    waited_for = description,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "wait satisfied"
                );
                return Ok(value);
            }
            if start.elapsed() >= self.options.timeout() {
                return Err(VistazoError::Timeout {
                    ms: self.options.timeout_ms,
                    waited_for: description.to_string(),
                });
            }
            std::thread::sleep(self.options.poll_interval());
        }
    }

    /// Wait until an element matching `locator` is displayed
    pub fn until_visible(&self, locator: &Locator) -> VistazoResult<ElementHandle> {
        self.until(&format!("{locator} to be visible"), |driver| {
            match driver.find_element(locator) {
                Ok(element) if driver.is_displayed(&element)? => Ok(Some(element)),
                Ok(_) | Err(VistazoError::ElementNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Wait until the element's locator resolves to a different element than
    /// `stale`, i.e. the page re-rendered it
    pub fn until_refreshed(&self, stale: &ElementHandle) -> VistazoResult<ElementHandle> {
        self.until(&format!("{} to be refreshed", stale.locator), |driver| {
            match driver.find_element(&stale.locator) {
                Ok(element) if element.id != stale.id => Ok(Some(element)),
                Ok(_) | Err(VistazoError::ElementNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Wait until the current URL contains `fragment`
    pub fn until_url_contains(&self, fragment: &str) -> VistazoResult<String> {
        self.until(&format!("URL containing '{fragment}'"), |driver| {
            let url = driver.current_url()?;
            Ok(url.contains(fragment).then_some(url))
        })
    }

    /// Sleep unconditionally
    pub fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl Injectable for Waiter {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::new::<Self>()
    }

    fn construct(injector: &Injector) -> VistazoResult<Self> {
        Ok(Self::with_options(injector.get()?, injector.get()?))
    }
}
