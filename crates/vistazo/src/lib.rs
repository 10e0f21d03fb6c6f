//! Vistazo: page binding, dependency injection and visual regression for
//! browser-driven tests.
//!
//! A test declares what it needs (method parameters, class fields, fixtures)
//! and Vistazo decides, per type, how to build it:
//!
//! - UI-bound types (page models, anything whose declared structure carries an
//!   element-locating marker somewhere in its supertype chain) are bound to the
//!   live page first, then have their injectable members filled in;
//! - everything else is built by a small container.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                       VISTAZO Invocation                           │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  Settings ──► RunnerConfig ──► BaseUrl ──► DriverSession (lazy)    │
//! │                                   │                                │
//! │  TestClass/TestMethod ──► ProviderRegistry ──► ResolutionPlan      │
//! │                                   │                                │
//! │                               Injector                             │
//! │                                   │                                │
//! │  FixtureSequencer ──► VisualCapture ──► VisualRegressionTester     │
//! │                                   │                                │
//! │  fields, params ──► body ──► FailureScreenshotHook (on failure)    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vistazo::prelude::*;
//!
//! let runner = TestRunner::new(Settings::from_pairs([("port", "8080")]));
//! let class = TestClass::new("SearchTest").failure_screenshots(true);
//! let method = TestMethod::new("test_search").param::<Waiter>();
//! runner
//!     .invoke(&class, &method, &|ctx| {
//!         let waiter = ctx.param::<Waiter>(0).ok_or_else(|| VistazoError::assertion("no waiter"))?;
//!         waiter.until_visible(&Locator::id("searchField"))?;
//!         Ok(())
//!     })
//!     .ok();
//! ```

// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

extern crate self as vistazo;

mod base_url;
/// Chromium over CDP
#[cfg(feature = "browser")]
pub mod browser;
mod capture;
mod classifier;
mod config;
mod descriptor;
mod driver;
mod element;
mod failure;
mod fixture;
mod harness;
mod inject;
mod locator;
mod registry;
mod result;
mod settings;
mod visual_regression;
mod wait;

/// Setting keys understood by [`RunnerConfig::from_settings`]
pub use config::keys;

pub use base_url::{resolve as resolve_base_url, BaseUrl, BaseUrlConfig, BASE_URL_BINDING};
pub use capture::{
    capture_file_base, CaptureDirective, CaptureOutcome, CaptureRequest, CaptureSettings,
    CaptureVerdict, DivergenceReport, SoftFailure, VisualCapture, CAPTURE_POLL_INTERVAL_MS,
    CAPTURE_WAIT_TIMEOUT_MS, DEFAULT_SCREENSHOTS_DIR,
};
pub use classifier::{classify, declares_page_marker};
pub use config::RunnerConfig;
pub use descriptor::{
    simple_name, ConstructorDescriptor, DescriptorCache, FieldDescriptor, Marker, TypeDescriptor,
    TypeRef,
};
pub use driver::{
    DriverConfig, DriverFactory, DriverHandle, DriverSession, ElementHandle, MockDriver,
    PageDriver, Screenshot, StandardDriverFactory,
};
pub use element::Element;
pub use failure::{
    failure_file_name, DriverScreenGrabber, FailureScreenshotHook, ScreenGrabber, FAILURE_MARKER,
};
pub use fixture::{FixtureSequencer, FixtureSet, FixtureSpec};
pub use harness::{
    Module, SuiteResults, TestBody, TestCase, TestClass, TestContext, TestMethod, TestResult,
    TestRunner, TestSuite,
};
pub use inject::{Injectable, Injector, InjectorBuilder, MAX_DEPTH};
pub use locator::{BoundingBox, Locator};
pub use registry::{ProviderRegistry, ResolutionContext, ResolutionPlan, Strategy};
pub use result::{VistazoError, VistazoResult};
pub use settings::{standard_files, Settings, SettingsBuilder, ENV_PREFIX, PROJECT_FILE};
pub use visual_regression::{
    ImageDiffResult, VisualRegressionConfig, VisualRegressionTester, DEFAULT_COLOR_THRESHOLD,
    DEFAULT_TOLERANCE,
};
pub use wait::{timeout_from_sleep, WaitOptions, Waiter, DEFAULT_SLEEP_MS};

#[cfg(feature = "derive")]
pub use vistazo_derive::Injectable;

/// Everything a test file usually needs
pub mod prelude {
    pub use super::{
        BaseUrl, CaptureDirective, DriverHandle, Element, FixtureSpec, Injectable, Injector,
        InjectorBuilder, Locator, PageDriver, Settings, TestCase, TestClass, TestContext,
        TestMethod, TestRunner, TestSuite, TypeDescriptor, VistazoError, VistazoResult, Waiter,
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_lenient() {
        let settings = CaptureSettings::default();
        assert!(settings.enabled);
        assert!(!settings.fail_on_divergence);
        assert_eq!(CaptureDirective::default().max_deviation, DEFAULT_TOLERANCE);
        assert_eq!(settings.color_threshold, DEFAULT_COLOR_THRESHOLD);
    }

    #[test]
    fn test_prelude_exposes_runner() {
        use crate::prelude::*;
        let class = TestClass::new("PreludeTest");
        assert_eq!(class.name(), "PreludeTest");
    }
}
