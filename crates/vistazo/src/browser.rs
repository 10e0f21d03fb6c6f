//! Chromium driver over the `DevTools` protocol.
//!
//! Compiled with the `browser` feature. The driver owns a tokio runtime and
//! blocks on it, so it presents the same synchronous [`PageDriver`] surface as
//! every other engine. Lookups retry until the implicit wait elapses.

#![allow(
    clippy::missing_errors_doc,
    clippy::significant_drop_tightening,
    clippy::cast_possible_truncation
)]

use crate::driver::{DriverConfig, DriverHandle, ElementHandle, PageDriver, Screenshot};
use crate::locator::{BoundingBox, Locator};
use crate::result::{VistazoError, VistazoResult};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::element::Element as CdpElement;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Interval between lookup attempts while the implicit wait runs
const LOOKUP_POLL: Duration = Duration::from_millis(100);

/// A Chromium instance driven over CDP
pub struct ChromiumDriver {
    runtime: Runtime,
    browser: tokio::sync::Mutex<Option<CdpBrowser>>,
    page: CdpPage,
    implicit_wait: Mutex<Duration>,
    handler: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("implicit_wait", &self.implicit_wait())
            .finish_non_exhaustive()
    }
}

fn launch_error(e: impl std::fmt::Display) -> VistazoError {
    VistazoError::BrowserLaunchError {
        message: e.to_string(),
    }
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    pub fn launch(config: &DriverConfig) -> VistazoResult<DriverHandle> {
        let runtime = Runtime::new()?;

        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(launch_error)?;

        let (browser, mut handler) = runtime
            .block_on(CdpBrowser::launch(cdp_config))
            .map_err(launch_error)?;
        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let page = runtime
            .block_on(browser.new_page("about:blank"))
            .map_err(|e| VistazoError::page(e.to_string()))?;
        info!(headless = config.headless, "chromium launched");

        Ok(DriverHandle::new(Self {
            runtime,
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            implicit_wait: Mutex::new(Duration::ZERO),
            handler,
        }))
    }

    fn implicit_wait(&self) -> Duration {
        *self
            .implicit_wait
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn lookup(&self, locator: &Locator) -> VistazoResult<CdpElement> {
        let found = if let Some(css) = locator.to_css() {
            self.page.find_element(css).await
        } else if let Some(xpath) = locator.to_xpath() {
            self.page.find_xpath(xpath).await
        } else {
            return Err(VistazoError::page(format!(
                "{locator} has neither a CSS nor an XPath form"
            )));
        };
        found.map_err(|_| VistazoError::ElementNotFound {
            locator: locator.to_string(),
        })
    }

    /// Find with retries until the implicit wait elapses
    fn locate(&self, locator: &Locator) -> VistazoResult<CdpElement> {
        let deadline = Instant::now() + self.implicit_wait();
        loop {
            match self.runtime.block_on(self.lookup(locator)) {
                Err(VistazoError::ElementNotFound { .. }) if Instant::now() < deadline => {
                    std::thread::sleep(LOOKUP_POLL);
                }
                other => return other,
            }
        }
    }
}

fn page_error(e: impl std::fmt::Display) -> VistazoError {
    VistazoError::page(e.to_string())
}

impl PageDriver for ChromiumDriver {
    fn name(&self) -> &str {
        "chromium"
    }

    fn navigate(&self, url: &str) -> VistazoResult<()> {
        self.runtime
            .block_on(self.page.goto(url))
            .map_err(|e| VistazoError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        debug!(url, "navigated");
        Ok(())
    }

    fn current_url(&self) -> VistazoResult<String> {
        let url = self.runtime.block_on(self.page.url()).map_err(page_error)?;
        Ok(url.unwrap_or_default())
    }

    fn find_element(&self, locator: &Locator) -> VistazoResult<ElementHandle> {
        let element = self.locate(locator)?;
        let (tag, text, bounds) = self.runtime.block_on(async {
            let tag = element.property("tagName").await.ok().flatten();
            let text = element.inner_text().await.ok().flatten();
            let bounds = element.bounding_box().await.ok();
            (tag, text, bounds)
        });
        let tag = tag
            .and_then(|v| v.as_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();
        let mut handle = ElementHandle::new(
            element.remote_object_id.inner().clone(),
            locator.clone(),
            tag,
        );
        if let Some(text) = text {
            handle = handle.with_text(text);
        }
        if let Some(b) = bounds {
            handle = handle.with_bounds(BoundingBox::new(
                b.x as f32,
                b.y as f32,
                b.width as f32,
                b.height as f32,
            ));
        }
        Ok(handle)
    }

    fn is_displayed(&self, element: &ElementHandle) -> VistazoResult<bool> {
        match self.find_element(&element.locator) {
            Ok(fresh) => Ok(fresh.is_visible()),
            Err(VistazoError::ElementNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn text(&self, element: &ElementHandle) -> VistazoResult<String> {
        let found = self.locate(&element.locator)?;
        let text = self.runtime.block_on(found.inner_text()).map_err(page_error)?;
        Ok(text.unwrap_or_default())
    }

    fn click(&self, element: &ElementHandle) -> VistazoResult<()> {
        let found = self.locate(&element.locator)?;
        self.runtime.block_on(found.click()).map_err(page_error)?;
        Ok(())
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> VistazoResult<()> {
        let found = self.locate(&element.locator)?;
        self.runtime.block_on(found.type_str(text)).map_err(page_error)?;
        Ok(())
    }

    fn screenshot_page(&self) -> VistazoResult<Screenshot> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self
            .runtime
            .block_on(self.page.execute(params))
            .map_err(|e| VistazoError::screenshot(e.to_string()))?;

        use base64::Engine;
        let png = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| VistazoError::screenshot(e.to_string()))?;
        Screenshot::from_png(png)
    }

    fn screenshot_element(&self, element: &ElementHandle) -> VistazoResult<Screenshot> {
        let found = self.locate(&element.locator)?;
        let png = self
            .runtime
            .block_on(found.screenshot(CaptureScreenshotFormat::Png))
            .map_err(|e| VistazoError::screenshot(e.to_string()))?;
        Screenshot::from_png(png)
    }

    fn set_implicit_wait(&self, wait: Duration) -> VistazoResult<()> {
        *self
            .implicit_wait
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = wait;
        Ok(())
    }

    fn quit(&self) -> VistazoResult<()> {
        self.runtime.block_on(async {
            let mut guard = self.browser.lock().await;
            if let Some(mut browser) = guard.take() {
                browser.close().await.map_err(launch_error)?;
                let _ = browser.wait().await;
            }
            Ok::<_, VistazoError>(())
        })?;
        self.handler.abort();
        info!("chromium closed");
        Ok(())
    }
}
