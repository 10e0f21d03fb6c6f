//! Example: page models, fixtures and failure screenshots
//!
//! Demonstrates: one test class run as a suite against the mock driver
//!
//! Run with: `cargo run --example page_model`

use std::sync::Arc;
use vistazo::prelude::*;
use vistazo::{BoundingBox, ElementHandle, MockDriver, Screenshot};

#[derive(Injectable)]
struct SearchPage {
    #[find_by(id = "searchField")]
    search_field: Element,
    #[find_by(css = "button[type=submit]")]
    #[cache_lookup]
    submit: Element,
    #[inject]
    waiter: Option<Waiter>,
}

#[derive(Injectable)]
#[vistazo(capture(label = "start"))]
struct LoggedIn {
    #[inject]
    driver: Option<DriverHandle>,
}

fn mock_site() -> MockDriver {
    let visible = BoundingBox::new(0.0, 0.0, 120.0, 24.0);
    let page = image::RgbaImage::from_pixel(64, 48, image::Rgba([240, 240, 240, 255]));
    MockDriver::new()
        .with_element(
            ElementHandle::new("e1", Locator::id("searchField"), "input").with_bounds(visible),
        )
        .with_element(
            ElementHandle::new("e2", Locator::css("button[type=submit]"), "button")
                .with_bounds(visible),
        )
        .with_screenshot(Screenshot::from_image(&page).expect("valid image"))
}

fn main() {
    println!("=== Page Model Example ===\n");

    let out = std::env::temp_dir().join("vistazo-example");
    let driver = Arc::new(mock_site());
    let runner = TestRunner::new(Settings::from_pairs([
        ("port", "8080"),
        ("screenshots.dir", out.to_string_lossy().as_ref()),
    ]))
    .with_driver(DriverHandle::from_arc(driver.clone()));

    let class = TestClass::new("SearchTest")
        .fixture(FixtureSpec::of::<LoggedIn>())
        .failure_screenshots(true);
    let mut suite = TestSuite::new(class);

    suite.add_test(TestCase::new(
        TestMethod::new("test_search").param::<SearchPage>(),
        |ctx| {
            let page = ctx.param::<SearchPage>(0).expect("page parameter");
            page.search_field.send_keys("rust")?;
            page.submit.click()?;
            let waiter = page.waiter.as_ref().expect("waiter injected");
            waiter.until_visible(page.submit.locator())?;
            assert_eq!(page.search_field.text()?, "rust");
            Ok(())
        },
    ));
    suite.add_test(TestCase::new(TestMethod::new("test_no_results"), |ctx| {
        let logged_in = ctx.fixture::<LoggedIn>().expect("fixture");
        let driver = logged_in.driver.as_ref().expect("driver injected");
        println!("   current page: {}", driver.current_url()?);
        Err(VistazoError::assertion("expected an empty result list"))
    }));

    let results = suite.run(&runner);
    for result in &results.results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!("{status} {}", result.name);
        if let Some(path) = &result.failure_screenshot {
            println!("     screenshot: {}", path.display());
        }
    }
    println!(
        "\n{}/{} passed; driver calls: {}",
        results.passed_count(),
        results.total(),
        driver.history().len()
    );
}
