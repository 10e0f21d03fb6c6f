//! `#[derive(Injectable)]` against the runtime types

#![cfg(feature = "derive")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use vistazo::prelude::*;
use vistazo::{
    classify, ElementHandle, Marker, MockDriver, TypeRef,
    DEFAULT_TOLERANCE,
};

#[derive(Injectable)]
struct Header {
    #[find_by(css = "header .logo")]
    logo: Element,
}

#[derive(Injectable)]
struct SearchPage {
    #[vistazo(base)]
    header: Header,
    #[find_bys(css = "form#search", name = "q")]
    query: Element,
    #[find_all(id = "go", css = "button[type=submit]")]
    #[cache_lookup]
    submit: Element,
    visits: u32,
}

#[derive(Injectable)]
#[vistazo(page)]
struct Landing;

#[derive(Debug, Clone, Default, PartialEq, Injectable)]
struct Credentials {
    user: String,
}

#[derive(Injectable)]
struct LoginFlow {
    #[inject]
    credentials: Credentials,
    #[inject(named = "realm")]
    realm: String,
    #[inject(named = "missing")]
    optional: Option<String>,
}

#[derive(Injectable)]
struct AuditedLogin {
    #[vistazo(base)]
    login: Credentials,
    attempts: u32,
}

#[derive(Injectable)]
struct LandingBanner {
    #[vistazo(base)]
    landing: Landing,
}

#[derive(Injectable)]
#[vistazo(capture(
    label = "hero",
    of(css = "#main"),
    wait_for(id = "ready"),
    delay_ms = 250,
    max_deviation = 0.05,
    baseline = "golden"
))]
struct HeroFixture {
    #[inject]
    driver: Option<DriverHandle>,
}

#[derive(Injectable)]
#[vistazo(capture)]
struct WholePage {}

mod describe {
    use super::*;

    #[test]
    fn test_element_fields_carry_markers() {
        let descriptor = TypeRef::of::<SearchPage>().descriptor();
        let fields = descriptor.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "query");
        assert_eq!(fields[0].markers, [Marker::FindBys]);
        assert_eq!(fields[1].markers, [Marker::FindAll, Marker::CacheLookup]);
        assert_eq!(fields[2].name, "visits");
        assert!(fields[2].markers.is_empty());
        assert_eq!(descriptor.supertype(), Some(TypeRef::of::<Header>()));
    }

    #[test]
    fn test_injected_fields_are_flagged() {
        let descriptor = TypeRef::of::<LoginFlow>().descriptor();
        assert!(descriptor.fields().iter().all(|f| f.injectable));
        assert_eq!(
            descriptor.fields()[0].type_ref,
            Some(TypeRef::of::<Credentials>())
        );
        assert!(descriptor.fields()[1].type_ref.is_none());
    }

    #[test]
    fn test_classification() {
        assert!(classify(&TypeRef::of::<Header>()));
        assert!(classify(&TypeRef::of::<SearchPage>()));
        assert!(classify(&TypeRef::of::<Landing>()));
        assert!(!classify(&TypeRef::of::<LoginFlow>()));
        assert!(!classify(&TypeRef::of::<Credentials>()));
    }
}

mod construction {
    use super::*;

    #[test]
    fn test_container_build_leaves_elements_unbound() {
        let page = Injector::empty().get::<SearchPage>().unwrap();
        assert!(!page.query.is_bound());
        assert!(!page.header.logo.is_bound());
        assert_eq!(page.visits, 0);
    }

    #[test]
    fn test_bind_page_binds_inherited_fields() {
        let driver = DriverHandle::new(MockDriver::new().with_element(ElementHandle::new(
            "el-go",
            Locator::id("go"),
            "button",
        )));
        let page = SearchPage::bind_page(&driver).unwrap();
        assert!(page.header.logo.is_bound());
        assert_eq!(page.header.logo.locator(), &Locator::css("header .logo"));
        assert_eq!(
            page.query.locator(),
            &Locator::Chain(vec![Locator::css("form#search"), Locator::name("q")])
        );
        assert_eq!(page.submit.resolve().unwrap().id, "el-go");
    }

    #[test]
    fn test_inject_resolves_types_and_names() {
        let mut builder = Injector::builder();
        builder
            .bind_instance(Credentials { user: "ada".into() })
            .bind_named("realm", "staff".to_string());
        let flow = builder.build().get::<LoginFlow>().unwrap();
        assert_eq!(flow.credentials.user, "ada");
        assert_eq!(flow.realm, "staff");
        assert!(flow.optional.is_none());
    }

    #[test]
    fn test_missing_named_value_fails() {
        let err = Injector::empty().get::<LoginFlow>().err().unwrap();
        assert!(err.to_string().contains("realm"));
    }

    #[test]
    fn test_plain_struct_cannot_be_page_bound() {
        let driver = DriverHandle::new(MockDriver::new());
        assert!(LoginFlow::bind_page(&driver).is_err());
        assert!(Landing::bind_page(&driver).is_ok());
    }

    #[test]
    fn test_base_without_page_markers_is_not_page_bound() {
        let driver = DriverHandle::new(MockDriver::new());
        assert!(!classify(&TypeRef::of::<AuditedLogin>()));
        match AuditedLogin::bind_page(&driver) {
            Err(VistazoError::PageBinding { type_name, .. }) => {
                assert!(type_name.ends_with("AuditedLogin"));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("bound a type without page markers"),
        }
        let built = Injector::empty().get::<AuditedLogin>().unwrap();
        assert_eq!(built.attempts, 0);
    }

    #[test]
    fn test_page_marker_inherited_from_base() {
        let driver = DriverHandle::new(MockDriver::new());
        assert!(classify(&TypeRef::of::<LandingBanner>()));
        assert!(LandingBanner::bind_page(&driver).is_ok());
    }
}

mod capture {
    use super::*;

    #[test]
    fn test_full_capture_directive() {
        let directive = HeroFixture::capture_directive().unwrap();
        assert_eq!(directive.label.as_deref(), Some("hero"));
        assert_eq!(directive.of, Locator::css("#main"));
        assert_eq!(directive.wait_for, Some(Locator::id("ready")));
        assert_eq!(directive.delay, Duration::from_millis(250));
        assert_eq!(directive.max_deviation, 0.05);
        assert_eq!(directive.baseline.as_deref(), Some(std::path::Path::new("golden")));
    }

    #[test]
    fn test_bare_capture_is_whole_page() {
        let directive = WholePage::capture_directive().unwrap();
        assert!(directive.of.is_whole_page());
        assert_eq!(directive.max_deviation, DEFAULT_TOLERANCE);
        assert!(Credentials::capture_directive().is_none());
    }

    #[test]
    fn test_fixture_spec_picks_up_directive() {
        assert!(FixtureSpec::of::<HeroFixture>().capture().is_some());
        assert!(FixtureSpec::of::<HeroFixture>().without_capture().capture().is_none());
    }

    #[test]
    fn test_fixture_capture_saved_during_run() {
        let dir = tempfile::tempdir().unwrap();
        let shot = vistazo::Screenshot::from_image(&image::RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([1, 2, 3, 255]),
        ))
        .unwrap();
        let driver = Arc::new(MockDriver::new().with_screenshot(shot));
        let runner = TestRunner::new(Settings::from_pairs([(
            "screenshots.dir",
            dir.path().to_str().unwrap(),
        )]))
        .with_driver(DriverHandle::from_arc(driver.clone()));
        let class = TestClass::new("HomeTest").fixture(FixtureSpec::of::<WholePage>());

        runner
            .invoke(&class, &TestMethod::new("test_home"), &|_| Ok(()))
            .unwrap();
        assert!(dir.path().join("HomeTest-test_home-WholePage.png").exists());
    }
}
