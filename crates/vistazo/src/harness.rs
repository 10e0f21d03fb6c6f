//! Test declarations and the per-invocation runner.
//!
//! A [`TestClass`] and a [`TestMethod`] describe what a test needs: class
//! fields, method parameters and fixtures, all as [`TypeRef`]s. The
//! [`TestRunner`] turns one class/method pair into a live invocation: it
//! resolves configuration and the base URL, plans page providers, builds the
//! injector, runs fixtures, constructs fields and parameters, then calls the
//! body with a [`TestContext`].

use crate::base_url::{self, BaseUrl};
use crate::capture::VisualCapture;
use crate::config::RunnerConfig;
use crate::descriptor::{simple_name, TypeRef};
use crate::driver::{DriverConfig, DriverFactory, DriverHandle, DriverSession, StandardDriverFactory};
use crate::failure::{FailureScreenshotHook, ScreenGrabber};
use crate::fixture::{FixtureSequencer, FixtureSet, FixtureSpec};
use crate::inject::{Injectable, Injector, InjectorBuilder};
use crate::registry::{ProviderRegistry, ResolutionContext, ResolutionPlan};
use crate::result::VistazoResult;
use crate::settings::Settings;
use crate::wait::WaitOptions;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extra bindings a test class contributes to the injector
pub type Module = Arc<dyn Fn(&mut InjectorBuilder) + Send + Sync>;

/// Body of a test case
pub type TestBody = Arc<dyn Fn(&TestContext<'_>) -> VistazoResult<()> + Send + Sync>;

/// Declared shape of a test class
#[derive(Clone)]
pub struct TestClass {
    name: String,
    fields: Vec<(&'static str, TypeRef)>,
    fixtures: Vec<FixtureSpec>,
    failure_screenshots: bool,
    defaults: Vec<(String, String)>,
    modules: Vec<Module>,
}

impl TestClass {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            fixtures: Vec::new(),
            failure_screenshots: false,
            defaults: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Declare an injected field
    #[must_use]
    pub fn field<T: Injectable>(mut self, name: &'static str) -> Self {
        self.fields.push((name, TypeRef::of::<T>()));
        self
    }

    /// Declare a class-level fixture; order of calls is construction order
    #[must_use]
    pub fn fixture(mut self, fixture: FixtureSpec) -> Self {
        self.fixtures.push(fixture);
        self
    }

    /// Opt in to a screenshot when a test of this class fails
    #[must_use]
    pub const fn failure_screenshots(mut self, enabled: bool) -> Self {
        self.failure_screenshots = enabled;
        self
    }

    /// Setting used when no file, environment or override provides the key
    #[must_use]
    pub fn default_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Contribute bindings to every invocation of this class
    #[must_use]
    pub fn module<F>(mut self, module: F) -> Self
    where
        F: Fn(&mut InjectorBuilder) + Send + Sync + 'static,
    {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    pub fn fields(&self) -> &[(&'static str, TypeRef)] {
        &self.fields
    }

    pub fn fixtures(&self) -> &[FixtureSpec] {
        &self.fixtures
    }

    pub const fn wants_failure_screenshots(&self) -> bool {
        self.failure_screenshots
    }

    pub fn defaults(&self) -> &[(String, String)] {
        &self.defaults
    }
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("fixtures", &self.fixtures)
            .field("failure_screenshots", &self.failure_screenshots)
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Declared shape of a test method
#[derive(Debug, Clone)]
pub struct TestMethod {
    name: String,
    params: Vec<TypeRef>,
    fixtures: Vec<FixtureSpec>,
}

impl TestMethod {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            fixtures: Vec::new(),
        }
    }

    /// Append a parameter
    #[must_use]
    pub fn param<T: Injectable>(mut self) -> Self {
        self.params.push(TypeRef::of::<T>());
        self
    }

    /// Declare a method-level fixture, built after the class fixtures
    #[must_use]
    pub fn fixture(mut self, fixture: FixtureSpec) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeRef] {
        &self.params
    }

    pub fn fixtures(&self) -> &[FixtureSpec] {
        &self.fixtures
    }
}

/// What a test body sees
pub struct TestContext<'a> {
    class: &'a TestClass,
    method: &'a TestMethod,
    fixtures: FixtureSet,
    fields: Vec<(&'static str, Box<dyn Any>)>,
    params: Vec<Box<dyn Any>>,
    injector: &'a Injector,
    session: &'a DriverSession,
    base_url: Option<&'a BaseUrl>,
    settings: &'a Settings,
    config: &'a RunnerConfig,
}

impl TestContext<'_> {
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    /// Parameter `index`, if it has type `T`
    #[must_use]
    pub fn param<T: 'static>(&self, index: usize) -> Option<&T> {
        self.params.get(index)?.downcast_ref()
    }

    /// Class field `name`, if it has type `T`
    #[must_use]
    pub fn field<T: 'static>(&self, name: &str) -> Option<&T> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)?
            .1
            .downcast_ref()
    }

    /// First fixture of type `T`
    #[must_use]
    pub fn fixture<T: 'static>(&self) -> Option<&T> {
        self.fixtures.get()
    }

    pub const fn fixtures(&self) -> &FixtureSet {
        &self.fixtures
    }

    pub const fn injector(&self) -> &Injector {
        self.injector
    }

    /// Build a `T` the way a parameter of that type would be built
    pub fn get<T: Injectable>(&self) -> VistazoResult<T> {
        self.injector.get()
    }

    /// The browser, launching it if nothing has yet
    pub fn driver(&self) -> VistazoResult<DriverHandle> {
        self.session.handle()
    }

    pub const fn base_url(&self) -> Option<&BaseUrl> {
        self.base_url
    }

    pub const fn settings(&self) -> &Settings {
        self.settings
    }

    pub const fn config(&self) -> &RunnerConfig {
        self.config
    }

    /// Bind a fresh `T` to the current page and inject its members.
    ///
    /// Used after navigation, when a page model built earlier would point at
    /// elements that no longer exist.
    pub fn rebind<T: Injectable>(&self) -> VistazoResult<T> {
        let driver = self.driver()?;
        let mut value = T::bind_page(&driver)?;
        self.injector.inject_members(&mut value)?;
        Ok(value)
    }
}

impl fmt::Debug for TestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("class", &self.class.name)
            .field("method", &self.method.name)
            .field("fixtures", &self.fixtures)
            .field("params", &self.params.len())
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Result of one invocation, panics included
struct Execution {
    outcome: std::thread::Result<VistazoResult<()>>,
    failure_screenshot: Option<PathBuf>,
}

/// Runs test invocations
#[derive(Clone)]
pub struct TestRunner {
    settings: Settings,
    factory: Arc<dyn DriverFactory>,
    capture: VisualCapture,
    hook: FailureScreenshotHook,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("settings", &self.settings)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    /// Runner over explicit settings, launching browsers by the `browser` key
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            factory: Arc::new(StandardDriverFactory),
            capture: VisualCapture::default(),
            hook: FailureScreenshotHook::default(),
        }
    }

    /// Runner over the standard settings files and `VISTAZO_*` variables
    pub fn from_environment() -> VistazoResult<Self> {
        Ok(Self::new(Settings::builder().load_standard()?.build()))
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Every invocation gets this driver instead of launching one
    #[must_use]
    pub fn with_driver(self, driver: DriverHandle) -> Self {
        self.with_factory(Arc::new(
            move |_: &DriverConfig| -> VistazoResult<DriverHandle> { Ok(driver.clone()) },
        ))
    }

    #[must_use]
    pub fn with_capture(mut self, capture: VisualCapture) -> Self {
        self.capture = capture;
        self
    }

    #[must_use]
    pub fn with_grabber(mut self, grabber: Arc<dyn ScreenGrabber>) -> Self {
        self.hook = FailureScreenshotHook::new(grabber);
        self
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one test method.
    ///
    /// The body's error is returned as is, and a panic in the body resumes
    /// unwinding after the failure screenshot hook has run.
    pub fn invoke(
        &self,
        class: &TestClass,
        method: &TestMethod,
        body: &dyn Fn(&TestContext<'_>) -> VistazoResult<()>,
    ) -> VistazoResult<()> {
        match self.execute(class, method, body).outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn execute(
        &self,
        class: &TestClass,
        method: &TestMethod,
        body: &dyn Fn(&TestContext<'_>) -> VistazoResult<()>,
    ) -> Execution {
        let prepared = self.prepare(class, method);
        let (settings, config, session, plan) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                return Execution {
                    outcome: Ok(Err(e)),
                    failure_screenshot: None,
                }
            }
        };
        let injector = self.build_injector(class, &plan, &session, &settings, &config);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_body(class, method, &injector, &session, &plan, &settings, &config, body)
        }));

        let failed = !matches!(outcome, Ok(Ok(())));
        let failure_screenshot = if failed {
            self.hook.on_failure(
                class.simple_name(),
                method.name(),
                &config.capture,
                class.wants_failure_screenshots(),
                &session,
            )
        } else {
            None
        };
        Execution {
            outcome,
            failure_screenshot,
        }
    }

    fn prepare(
        &self,
        class: &TestClass,
        method: &TestMethod,
    ) -> VistazoResult<(Settings, RunnerConfig, Rc<DriverSession>, ResolutionPlan)> {
        let settings = self.settings.with_fallbacks(class.defaults());
        let config = RunnerConfig::from_settings(&settings)?;
        let base_url = base_url::resolve(&config.base_url)?;
        match &base_url {
            Some(url) => debug!(base_url = %url, "resolved base URL"),
            None => debug!("no base URL"),
        }
        let session = Rc::new(DriverSession::new(
            Arc::clone(&self.factory),
            config.driver.clone(),
            base_url.clone(),
        ));
        let mut ctx = ResolutionContext::new();
        let plan = ProviderRegistry::resolve_graph(class, method, base_url, &mut ctx);
        debug!(
            class = class.name(),
            method = method.name(),
            providers = plan.providers().len(),
            classified = ctx.classification_count(),
            "resolution planned"
        );
        Ok((settings, config, session, plan))
    }

    fn build_injector(
        &self,
        class: &TestClass,
        plan: &ResolutionPlan,
        session: &Rc<DriverSession>,
        settings: &Settings,
        config: &RunnerConfig,
    ) -> Injector {
        let mut builder = Injector::builder();
        let driver_session = Rc::clone(session);
        let wait_ms = u64::try_from(config.wait_timeout.as_millis()).unwrap_or(u64::MAX);
        builder
            .bind_with(move |_| driver_session.handle())
            .bind_instance(settings.clone())
            .bind_instance(config.clone())
            .bind_instance(WaitOptions::new().with_timeout(wait_ms));
        for module in &class.modules {
            module(&mut builder);
        }
        plan.install_into(&mut builder);
        builder.build()
    }

    #[allow(clippy::too_many_arguments)]
    fn run_body(
        &self,
        class: &TestClass,
        method: &TestMethod,
        injector: &Injector,
        session: &DriverSession,
        plan: &ResolutionPlan,
        settings: &Settings,
        config: &RunnerConfig,
        body: &dyn Fn(&TestContext<'_>) -> VistazoResult<()>,
    ) -> VistazoResult<()> {
        let sequencer = FixtureSequencer::new(self.capture.clone(), config.capture.clone());
        let fixtures = sequencer.run(class, method, injector)?;

        let mut fields = Vec::with_capacity(class.fields().len());
        for (name, ty) in class.fields() {
            fields.push((*name, injector.get_ref(ty)?));
        }
        let mut params = Vec::with_capacity(method.params().len());
        for ty in method.params() {
            params.push(injector.get_ref(ty)?);
        }

        let context = TestContext {
            class,
            method,
            fixtures,
            fields,
            params,
            injector,
            session,
            base_url: plan.base_url(),
            settings,
            config,
        };
        body(&context)
    }
}

/// A method and its body
#[derive(Clone)]
pub struct TestCase {
    /// Declared method
    pub method: TestMethod,
    body: TestBody,
}

impl TestCase {
    #[must_use]
    pub fn new<F>(method: TestMethod, body: F) -> Self
    where
        F: Fn(&TestContext<'_>) -> VistazoResult<()> + Send + Sync + 'static,
    {
        Self {
            method,
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("method", &self.method).finish_non_exhaustive()
    }
}

/// A test class with its cases
#[derive(Debug, Clone)]
pub struct TestSuite {
    /// Class every case runs under
    pub class: TestClass,
    /// Cases, run in order
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    #[must_use]
    pub fn new(class: TestClass) -> Self {
        Self {
            class,
            tests: Vec::new(),
        }
    }

    /// Add a test case
    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Run every case; a failing or panicking case does not stop the rest
    #[must_use]
    pub fn run(&self, runner: &TestRunner) -> SuiteResults {
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.tests.len());
        for case in &self.tests {
            let case_start = Instant::now();
            let name = format!("{}::{}", self.class.name(), case.method.name());
            let execution = runner.execute(&self.class, &case.method, case.body.as_ref());
            let result = match execution.outcome {
                Ok(Ok(())) => TestResult::pass(name),
                Ok(Err(e)) => TestResult::fail(name, e.to_string()),
                Err(payload) => TestResult::fail(name, panic_message(payload.as_ref())),
            };
            let result = result
                .with_duration(case_start.elapsed())
                .with_failure_screenshot(execution.failure_screenshot);
            if result.passed {
                info!(test = %result.name, "passed");
            } else {
                warn!(test = %result.name, error = ?result.error, "failed");
            }
            results.push(result);
        }
        SuiteResults {
            suite_name: self.class.name().to_string(),
            results,
            duration: start.elapsed(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Result of running a single test
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Test duration
    pub duration: Duration,
    /// Screenshot written by the failure hook
    pub failure_screenshot: Option<PathBuf>,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            duration: Duration::ZERO,
            failure_screenshot: None,
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
            duration: Duration::ZERO,
            failure_screenshot: None,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_failure_screenshot(mut self, path: Option<PathBuf>) -> Self {
        self.failure_screenshot = path;
        self
    }
}

/// Results from running a test suite
#[derive(Debug, Clone)]
pub struct SuiteResults {
    /// Suite name
    pub suite_name: String,
    /// Individual test results
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if all tests passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}
