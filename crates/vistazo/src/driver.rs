//! PageDriver - Abstract Browser Automation Trait
//!
//! Everything the orchestrator needs from a browser engine: navigation,
//! element lookup, visibility, simple interaction and screenshots. Calls are
//! blocking; a test invocation runs on one thread from setup to teardown.
//!
//! # Implementations
//!
//! - `MockDriver` - scripted in-memory page, for unit tests and as the
//!   non-rendering stand-in selected by `browser=htmlunit`
//! - `ChromiumDriver` - CDP via chromiumoxide (feature `browser`)

use crate::base_url::BaseUrl;
use crate::locator::{BoundingBox, Locator};
use crate::result::{VistazoError, VistazoResult};
use image::{ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Element handle for DOM interactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-specific identifier for the element
    pub id: String,
    /// Locator the element was found with
    pub locator: Locator,
    /// Element tag name
    pub tag_name: String,
    /// Element text content
    pub text_content: Option<String>,
    /// Bounding box if rendered
    pub bounding_box: Option<BoundingBox>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, locator: Locator, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator,
            tag_name: tag_name.into(),
            text_content: None,
            bounding_box: None,
        }
    }

    /// Set the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Set the bounding box
    #[must_use]
    pub const fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounding_box = Some(bounds);
        self
    }

    /// Check if element is visible
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.bounding_box.is_some_and(|b| b.has_area())
    }
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Encode an in-memory image as a PNG screenshot
    pub fn from_image(image: &RgbaImage) -> VistazoResult<Self> {
        let mut buffer = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buffer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(Self::new(buffer, image.width(), image.height()))
    }

    /// Decode PNG bytes that arrived without dimensions
    pub fn from_png(data: Vec<u8>) -> VistazoResult<Self> {
        let decoded = image::load_from_memory(&data)?;
        Ok(Self::new(data, decoded.width(), decoded.height()))
    }

    /// Decode into RGBA pixels
    pub fn to_image(&self) -> VistazoResult<RgbaImage> {
        Ok(image::load_from_memory(&self.data)?.to_rgba8())
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }
}

/// Browser configuration for drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Browser name: "chrome"/"chromium" for a real browser, "htmlunit"/"mock" for the stand-in
    pub browser: String,
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// How long element lookups keep retrying
    pub implicit_wait: Duration,
    /// Maximize the window after launch
    pub maximize: bool,
    /// Executable path override
    pub executable_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            browser: String::from("htmlunit"),
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            implicit_wait: Duration::from_secs(10),
            maximize: false,
            executable_path: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the browser name
    #[must_use]
    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set implicit wait
    #[must_use]
    pub const fn implicit_wait(mut self, wait: Duration) -> Self {
        self.implicit_wait = wait;
        self
    }

    /// Maximize after launch
    #[must_use]
    pub const fn maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }
}

/// Abstract driver trait for browser automation
pub trait PageDriver: Send + Sync + fmt::Debug {
    /// Short name of the engine, for logs
    fn name(&self) -> &str;

    /// Whether the engine paints a visual surface that can be captured.
    ///
    /// Non-rendering stand-ins return false and visual capture is skipped.
    fn renders_visual_surface(&self) -> bool {
        true
    }

    /// Navigate to URL
    fn navigate(&self, url: &str) -> VistazoResult<()>;

    /// Get current URL
    fn current_url(&self) -> VistazoResult<String>;

    /// Find the first element matching a locator
    fn find_element(&self, locator: &Locator) -> VistazoResult<ElementHandle>;

    /// Whether an element is currently displayed
    fn is_displayed(&self, element: &ElementHandle) -> VistazoResult<bool>;

    /// Visible text of an element
    fn text(&self, element: &ElementHandle) -> VistazoResult<String>;

    /// Click an element
    fn click(&self, element: &ElementHandle) -> VistazoResult<()>;

    /// Type text into an element
    fn send_keys(&self, element: &ElementHandle, text: &str) -> VistazoResult<()>;

    /// Capture the whole page
    fn screenshot_page(&self) -> VistazoResult<Screenshot>;

    /// Capture a single element
    fn screenshot_element(&self, element: &ElementHandle) -> VistazoResult<Screenshot>;

    /// Configure how long lookups retry before failing
    fn set_implicit_wait(&self, wait: Duration) -> VistazoResult<()> {
        let _ = wait;
        Ok(())
    }

    /// Maximize the browser window
    fn maximize(&self) -> VistazoResult<()> {
        Ok(())
    }

    /// Close the browser
    fn quit(&self) -> VistazoResult<()>;
}

/// Shared handle to the driver of the current test invocation
#[derive(Clone)]
pub struct DriverHandle(Arc<dyn PageDriver>);

impl DriverHandle {
    /// Wrap a driver
    pub fn new<D: PageDriver + 'static>(driver: D) -> Self {
        Self(Arc::new(driver))
    }

    /// Wrap an already shared driver
    #[must_use]
    pub fn from_arc(driver: Arc<dyn PageDriver>) -> Self {
        Self(driver)
    }

    /// Whether two handles point at the same driver
    #[must_use]
    pub fn same_driver(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for DriverHandle {
    type Target = dyn PageDriver;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DriverHandle").field(&self.0.name()).finish()
    }
}

/// Launches drivers for test invocations
pub trait DriverFactory: Send + Sync {
    /// Launch a driver for the given configuration
    fn launch(&self, config: &DriverConfig) -> VistazoResult<DriverHandle>;
}

impl<F> DriverFactory for F
where
    F: Fn(&DriverConfig) -> VistazoResult<DriverHandle> + Send + Sync,
{
    fn launch(&self, config: &DriverConfig) -> VistazoResult<DriverHandle> {
        self(config)
    }
}

/// Picks a driver implementation from the configured browser name
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDriverFactory;

impl DriverFactory for StandardDriverFactory {
    fn launch(&self, config: &DriverConfig) -> VistazoResult<DriverHandle> {
        match config.browser.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => launch_chromium(config),
            "" | "htmlunit" | "mock" | "headless-stub" => Ok(DriverHandle::new(MockDriver::headless())),
            other => {
                warn!(browser = other, "unknown browser, falling back to the headless stand-in");
                Ok(DriverHandle::new(MockDriver::headless()))
            }
        }
    }
}

#[cfg(feature = "browser")]
fn launch_chromium(config: &DriverConfig) -> VistazoResult<DriverHandle> {
    crate::browser::ChromiumDriver::launch(config)
}

#[cfg(not(feature = "browser"))]
fn launch_chromium(config: &DriverConfig) -> VistazoResult<DriverHandle> {
    Err(VistazoError::BrowserLaunchError {
        message: format!(
            "browser '{}' requires the `browser` feature",
            config.browser
        ),
    })
}

/// Lazily launched driver for one test invocation.
///
/// The browser starts on first request, is navigated to the base URL, and is
/// quit when the session drops.
pub struct DriverSession {
    factory: Arc<dyn DriverFactory>,
    config: DriverConfig,
    base_url: Option<BaseUrl>,
    driver: OnceLock<DriverHandle>,
}

impl DriverSession {
    /// Create a session; nothing is launched yet
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        config: DriverConfig,
        base_url: Option<BaseUrl>,
    ) -> Self {
        Self {
            factory,
            config,
            base_url,
            driver: OnceLock::new(),
        }
    }

    /// Session around an existing driver
    #[must_use]
    pub fn with_driver(driver: DriverHandle) -> Self {
        let session = Self::new(
            Arc::new(|_: &DriverConfig| -> VistazoResult<DriverHandle> {
                Err(VistazoError::BrowserLaunchError {
                    message: "session was created around a fixed driver".to_string(),
                })
            }),
            DriverConfig::default(),
            None,
        );
        let _ = session.driver.set(driver);
        session
    }

    /// Get the driver, launching it on first use
    pub fn handle(&self) -> VistazoResult<DriverHandle> {
        if let Some(driver) = self.driver.get() {
            return Ok(driver.clone());
        }
        let driver = self.factory.launch(&self.config)?;
        info!(browser = %self.config.browser, engine = driver.name(), "launched browser");
        if let Err(e) = self.prepare(&driver) {
            // Never stored, so Drop would not see it.
            if let Err(quit) = driver.quit() {
                debug!(error = %quit, "driver quit failed");
            }
            return Err(e);
        }
        Ok(self.driver.get_or_init(|| driver).clone())
    }

    fn prepare(&self, driver: &DriverHandle) -> VistazoResult<()> {
        driver.set_implicit_wait(self.config.implicit_wait)?;
        if self.config.maximize {
            driver.maximize()?;
        }
        if let Some(url) = &self.base_url {
            driver.navigate(url.as_str())?;
        }
        Ok(())
    }

    /// The driver, if it has been launched
    #[must_use]
    pub fn active(&self) -> Option<&DriverHandle> {
        self.driver.get()
    }

    /// Driver configuration
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get() {
            if let Err(e) = driver.quit() {
                debug!(error = %e, "driver quit failed");
            }
        }
    }
}

impl fmt::Debug for DriverSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSession")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .field("launched", &self.driver.get().is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockState {
    current_url: String,
    elements: Vec<ElementHandle>,
    typed: HashMap<String, String>,
    page: Option<Screenshot>,
    unreachable: Option<String>,
    history: Vec<String>,
}

/// Mock driver for unit testing
///
/// Elements are matched by locator equality. Element screenshots are cropped
/// from the page screenshot using the element's bounding box.
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
    renders: bool,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a rendering mock driver
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            renders: true,
        }
    }

    /// Create a non-rendering mock driver
    #[must_use]
    pub fn headless() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            renders: false,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a mock element
    pub fn add_element(&self, element: ElementHandle) {
        self.state().elements.push(element);
    }

    /// Builder form of [`MockDriver::add_element`]
    #[must_use]
    pub fn with_element(self, element: ElementHandle) -> Self {
        self.add_element(element);
        self
    }

    /// Set mock page screenshot
    pub fn set_screenshot(&self, screenshot: Screenshot) {
        self.state().page = Some(screenshot);
    }

    /// Builder form of [`MockDriver::set_screenshot`]
    #[must_use]
    pub fn with_screenshot(self, screenshot: Screenshot) -> Self {
        self.set_screenshot(screenshot);
        self
    }

    /// Make every navigation fail with the given message
    #[must_use]
    pub fn with_unreachable_pages(self, message: impl Into<String>) -> Self {
        self.state().unreachable = Some(message.into());
        self
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state().history.iter().any(|c| c.starts_with(method))
    }

    fn record(&self, call: String) {
        self.state().history.push(call);
    }

    fn page(&self) -> VistazoResult<Screenshot> {
        self.state()
            .page
            .clone()
            .ok_or_else(|| VistazoError::screenshot("No mock screenshot set"))
    }
}

impl PageDriver for MockDriver {
    fn name(&self) -> &str {
        if self.renders {
            "mock"
        } else {
            "mock-headless"
        }
    }

    fn renders_visual_surface(&self) -> bool {
        self.renders
    }

    fn navigate(&self, url: &str) -> VistazoResult<()> {
        let mut state = self.state();
        state.history.push(format!("navigate:{url}"));
        if let Some(message) = &state.unreachable {
            return Err(VistazoError::NavigationError {
                url: url.to_string(),
                message: message.clone(),
            });
        }
        state.current_url = url.to_string();
        Ok(())
    }

    fn current_url(&self) -> VistazoResult<String> {
        Ok(self.state().current_url.clone())
    }

    fn find_element(&self, locator: &Locator) -> VistazoResult<ElementHandle> {
        self.record(format!("find:{locator}"));
        let state = self.state();
        let candidates: Vec<&Locator> = match locator {
            Locator::Any(parts) => parts.iter().collect(),
            other => vec![other],
        };
        candidates
            .into_iter()
            .find_map(|wanted| state.elements.iter().find(|e| &e.locator == wanted))
            .cloned()
            .ok_or_else(|| VistazoError::ElementNotFound {
                locator: locator.to_string(),
            })
    }

    fn is_displayed(&self, element: &ElementHandle) -> VistazoResult<bool> {
        let state = self.state();
        Ok(state
            .elements
            .iter()
            .find(|e| e.id == element.id)
            .is_some_and(ElementHandle::is_visible))
    }

    fn text(&self, element: &ElementHandle) -> VistazoResult<String> {
        let state = self.state();
        if let Some(typed) = state.typed.get(&element.id) {
            return Ok(typed.clone());
        }
        Ok(state
            .elements
            .iter()
            .find(|e| e.id == element.id)
            .and_then(|e| e.text_content.clone())
            .unwrap_or_default())
    }

    fn click(&self, element: &ElementHandle) -> VistazoResult<()> {
        self.record(format!("click:{}", element.id));
        Ok(())
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> VistazoResult<()> {
        let mut state = self.state();
        state.history.push(format!("send_keys:{}:{text}", element.id));
        state
            .typed
            .entry(element.id.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn screenshot_page(&self) -> VistazoResult<Screenshot> {
        self.record("screenshot:page".to_string());
        self.page()
    }

    fn screenshot_element(&self, element: &ElementHandle) -> VistazoResult<Screenshot> {
        self.record(format!("screenshot:{}", element.id));
        let page = self.page()?;
        let Some(bounds) = element.bounding_box else {
            return Ok(page);
        };
        let mut pixels = page.to_image()?;
        let x = bounds.x.max(0.0) as u32;
        let y = bounds.y.max(0.0) as u32;
        let width = (bounds.width as u32).min(pixels.width().saturating_sub(x));
        let height = (bounds.height as u32).min(pixels.height().saturating_sub(y));
        if width == 0 || height == 0 {
            return Err(VistazoError::screenshot(format!(
                "element {} lies outside the page",
                element.id
            )));
        }
        let cropped = image::imageops::crop(&mut pixels, x, y, width, height).to_image();
        Screenshot::from_image(&cropped)
    }

    fn quit(&self) -> VistazoResult<()> {
        self.record("quit".to_string());
        Ok(())
    }
}
