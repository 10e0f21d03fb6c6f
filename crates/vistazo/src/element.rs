//! Lazily located page elements.
//!
//! Page-bound fields hold an [`Element`]: a locator plus the driver it was
//! bound to. The lookup happens on each use, or once when the field was marked
//! `cache_lookup`. An element built by the container instead of page binding
//! has no driver and reports `is_bound() == false`.

use crate::driver::{DriverHandle, ElementHandle, PageDriver};
use crate::locator::Locator;
use crate::result::{VistazoError, VistazoResult};
use std::sync::OnceLock;

/// A located-on-demand element
#[derive(Debug, Clone)]
pub struct Element {
    locator: Locator,
    driver: Option<DriverHandle>,
    cache_lookup: bool,
    cached: OnceLock<ElementHandle>,
}

impl Element {
    /// Element bound to a driver
    #[must_use]
    pub fn bound(driver: DriverHandle, locator: Locator) -> Self {
        Self {
            locator,
            driver: Some(driver),
            cache_lookup: false,
            cached: OnceLock::new(),
        }
    }

    /// Element with no driver
    #[must_use]
    pub fn unbound(locator: Locator) -> Self {
        Self {
            locator,
            driver: None,
            cache_lookup: false,
            cached: OnceLock::new(),
        }
    }

    /// Remember the first successful lookup
    #[must_use]
    pub fn cache_lookup(mut self, cache: bool) -> Self {
        self.cache_lookup = cache;
        self
    }

    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    pub const fn is_bound(&self) -> bool {
        self.driver.is_some()
    }

    fn driver(&self) -> VistazoResult<&DriverHandle> {
        self.driver.as_ref().ok_or_else(|| {
            VistazoError::page(format!("element {} is not bound to a page", self.locator))
        })
    }

    /// Locate the element now
    pub fn resolve(&self) -> VistazoResult<ElementHandle> {
        if let Some(handle) = self.cached.get() {
            return Ok(handle.clone());
        }
        let handle = self.driver()?.find_element(&self.locator)?;
        if self.cache_lookup {
            return Ok(self.cached.get_or_init(|| handle).clone());
        }
        Ok(handle)
    }

    /// Visible text
    pub fn text(&self) -> VistazoResult<String> {
        let handle = self.resolve()?;
        self.driver()?.text(&handle)
    }

    pub fn click(&self) -> VistazoResult<()> {
        let handle = self.resolve()?;
        self.driver()?.click(&handle)
    }

    pub fn send_keys(&self, text: &str) -> VistazoResult<()> {
        let handle = self.resolve()?;
        self.driver()?.send_keys(&handle, text)
    }

    /// Whether the element exists and is displayed
    pub fn is_displayed(&self) -> VistazoResult<bool> {
        match self.resolve() {
            Ok(handle) => self.driver()?.is_displayed(&handle),
            Err(VistazoError::ElementNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::locator::BoundingBox;
    use std::sync::Arc;

    fn driver() -> Arc<MockDriver> {
        Arc::new(
            MockDriver::new().with_element(
                ElementHandle::new("e1", Locator::id("searchField"), "input")
                    .with_text("")
                    .with_bounds(BoundingBox::new(0.0, 0.0, 100.0, 20.0)),
            ),
        )
    }

    #[test]
    fn test_unbound_element_refuses_use() {
        let element = Element::unbound(Locator::id("searchField"));
        assert!(!element.is_bound());
        assert!(matches!(element.click(), Err(VistazoError::PageError { .. })));
    }

    #[test]
    fn test_bound_element_types_and_reads() {
        let mock = driver();
        let element = Element::bound(DriverHandle::from_arc(mock.clone()), Locator::id("searchField"));
        element.send_keys("nuclear poodles").unwrap();
        assert_eq!(element.text().unwrap(), "nuclear poodles");
        assert!(element.is_displayed().unwrap());
    }

    #[test]
    fn test_lookup_repeats_without_cache() {
        let mock = driver();
        let element = Element::bound(DriverHandle::from_arc(mock.clone()), Locator::id("searchField"));
        element.resolve().unwrap();
        element.resolve().unwrap();
        let finds = mock.history().iter().filter(|c| c.starts_with("find:")).count();
        assert_eq!(finds, 2);
    }

    #[test]
    fn test_cache_lookup_finds_once() {
        let mock = driver();
        let element = Element::bound(DriverHandle::from_arc(mock.clone()), Locator::id("searchField"))
            .cache_lookup(true);
        element.resolve().unwrap();
        element.click().unwrap();
        let finds = mock.history().iter().filter(|c| c.starts_with("find:")).count();
        assert_eq!(finds, 1);
    }

    #[test]
    fn test_missing_element_is_not_displayed() {
        let element = Element::bound(DriverHandle::from_arc(driver()), Locator::id("gone"));
        assert!(!element.is_displayed().unwrap());
    }
}
