//! Fixture sequencing.
//!
//! Fixtures are types whose construction performs setup, such as logging in.
//! Class-level fixtures are built first, then method-level ones, each list in
//! declaration order. Every fixture is built through the container, so page
//! binding and injection apply to it like to any other dependency.
//!
//! Constructed fixtures are kept in a [`FixtureSet`] for the rest of the
//! invocation and dropped in reverse construction order.

use crate::capture::{CaptureDirective, CaptureRequest, CaptureSettings, CaptureVerdict, VisualCapture};
use crate::descriptor::TypeRef;
use crate::driver::DriverHandle;
use crate::harness::{TestClass, TestMethod};
use crate::inject::{Injectable, Injector};
use crate::result::VistazoResult;
use std::any::Any;
use std::fmt;
use tracing::{debug, info, warn};

/// One declared fixture
#[derive(Debug, Clone)]
pub struct FixtureSpec {
    ty: TypeRef,
    capture: Option<CaptureDirective>,
}

impl FixtureSpec {
    /// Fixture of type `T`, with the capture directive `T` declares
    #[must_use]
    pub fn of<T: Injectable>() -> Self {
        let ty = TypeRef::of::<T>();
        Self {
            ty,
            capture: ty.capture_directive(),
        }
    }

    /// Override the capture directive
    #[must_use]
    pub fn with_capture(mut self, directive: CaptureDirective) -> Self {
        self.capture = Some(directive);
        self
    }

    /// Never capture this fixture
    #[must_use]
    pub fn without_capture(mut self) -> Self {
        self.capture = None;
        self
    }

    pub const fn type_ref(&self) -> TypeRef {
        self.ty
    }

    pub const fn capture(&self) -> Option<&CaptureDirective> {
        self.capture.as_ref()
    }
}

/// Fixtures constructed for one invocation, in construction order
#[derive(Default)]
pub struct FixtureSet {
    built: Vec<(TypeRef, Box<dyn Any>)>,
}

impl FixtureSet {
    /// The first constructed fixture of type `T`
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.built.iter().find_map(|(_, value)| value.downcast_ref::<T>())
    }

    /// Simple type names in construction order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.built.iter().map(|(ty, _)| ty.simple_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}

impl Drop for FixtureSet {
    fn drop(&mut self) {
        while let Some((ty, value)) = self.built.pop() {
            debug!(fixture = ty.simple_name(), "releasing fixture");
            drop(value);
        }
    }
}

impl fmt::Debug for FixtureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Runs class then method fixtures, capturing as directed
#[derive(Debug, Clone)]
pub struct FixtureSequencer {
    capture: VisualCapture,
    settings: CaptureSettings,
}

impl FixtureSequencer {
    #[must_use]
    pub const fn new(capture: VisualCapture, settings: CaptureSettings) -> Self {
        Self { capture, settings }
    }

    /// Build every fixture of `class` then `method`.
    ///
    /// A failing construction aborts with that error unchanged. Capture
    /// problems are logged; only a divergence policy failure is returned.
    pub fn run(
        &self,
        class: &TestClass,
        method: &TestMethod,
        injector: &Injector,
    ) -> VistazoResult<FixtureSet> {
        let mut set = FixtureSet::default();
        for spec in class.fixtures().iter().chain(method.fixtures()) {
            let ty = spec.type_ref();
            let value = injector.get_ref(&ty)?;
            info!(fixture = ty.simple_name(), "constructed fixture");
            set.built.push((ty, value));

            if let Some(directive) = spec.capture().filter(|_| self.settings.enabled) {
                let request = CaptureRequest::for_fixture(
                    class.name(),
                    method.name(),
                    ty.simple_name(),
                    directive,
                    &self.settings,
                );
                self.capture_fixture(&request, injector)?;
            }
        }
        Ok(set)
    }

    fn capture_fixture(&self, request: &CaptureRequest, injector: &Injector) -> VistazoResult<()> {
        let driver = match injector.get::<DriverHandle>() {
            Ok(driver) => driver,
            Err(e) => {
                warn!(file = %request.file_base, error = %e, "no driver to capture with");
                return Ok(());
            }
        };
        match self.capture.capture_and_compare(request, &driver) {
            CaptureVerdict::HardFailure(e) => Err(e),
            CaptureVerdict::Passed(outcome) => {
                debug!(?outcome, "fixture captured");
                Ok(())
            }
            CaptureVerdict::SoftFailure(_) => Ok(()),
        }
    }
}
