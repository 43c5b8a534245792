// Element picker across frames

use serde_json::json;
use std::sync::Arc;

mod common;
use common::{FakeDoc, FakeDriver, browser};
use locprobe::PickerOutcome;

const PICKER_JS: &str = "window.__pickerActive = true;";

fn page_with_pick_in_seat_map() -> FakeDoc {
    let detail = FakeDoc::new().with_picker_result(json!({
        "xpath": "//*[@id=\"seat-12\"]",
        "css": "#seat-12",
        "tag": "DIV",
        "text": "A-12",
        "attributes": {"id": "seat-12", "class": "seat free"}
    }));
    let seat = FakeDoc::new().with_frame("ifrmSeatDetail", detail);
    FakeDoc::new()
        .with_frame("ifrmSeat", seat)
        .with_frame("footer", FakeDoc::new())
}

#[tokio::test]
async fn test_start_picker_injects_everywhere() {
    let driver = Arc::new(FakeDriver::new(page_with_pick_in_seat_map()));
    let browser = browser(driver.clone());

    let injected = browser.start_picker(PICKER_JS).await.unwrap();
    assert_eq!(injected, 4);
    assert_eq!(driver.picker_active_contexts(), 4);
    assert!(browser.is_picker_active().await);
    assert!(!browser.is_picker_locked().await);
    assert!(driver.context().is_empty());
}

#[tokio::test]
async fn test_picker_result_from_nested_frame() {
    let driver = Arc::new(FakeDriver::new(page_with_pick_in_seat_map()));
    let browser = browser(driver.clone());

    let outcome = browser.picker_result().await.unwrap();
    let Some(PickerOutcome::Picked(picked)) = outcome else {
        panic!("expected a picked element, got {:?}", outcome);
    };
    assert_eq!(picked.frame_path, "ifrmSeat/ifrmSeatDetail");
    assert_eq!(picked.css_selector, "#seat-12");
    assert_eq!(picked.attributes.get("class").map(String::as_str), Some("seat free"));

    let item = picked.into_item("seat_a12");
    assert_eq!(item.name, "seat_a12");
    assert_eq!(item.found_frame_path, "ifrmSeat/ifrmSeatDetail");
    assert!(driver.context().is_empty());
}

#[tokio::test]
async fn test_picker_without_result() {
    let driver = Arc::new(FakeDriver::new(FakeDoc::new().with_frame("footer", FakeDoc::new())));
    let browser = browser(driver);

    assert!(browser.picker_result().await.unwrap().is_none());
    assert!(!browser.is_picker_active().await);
}

#[tokio::test]
async fn test_picker_cancelled() {
    let doc = FakeDoc::new().with_picker_result(json!("CANCELLED"));
    let driver = Arc::new(FakeDriver::new(doc));
    let browser = browser(driver);

    assert_eq!(
        browser.picker_result().await.unwrap(),
        Some(PickerOutcome::Cancelled)
    );
}

#[tokio::test]
async fn test_closed_window_cancels_pick() {
    let driver = Arc::new(FakeDriver::new(page_with_pick_in_seat_map()));
    let browser = browser(driver.clone());
    driver.close_window("w1");

    assert_eq!(
        browser.picker_result().await.unwrap(),
        Some(PickerOutcome::Cancelled)
    );
    assert!(!browser.is_picker_active().await);
    assert!(browser.start_picker(PICKER_JS).await.is_err());
}

#[tokio::test]
async fn test_cleanup_picker() {
    let driver = Arc::new(FakeDriver::new(page_with_pick_in_seat_map()));
    let browser = browser(driver.clone());

    browser.start_picker(PICKER_JS).await.unwrap();
    assert_eq!(browser.cleanup_picker().await, 4);
    assert_eq!(driver.picker_active_contexts(), 0);
    assert!(browser.picker_result().await.unwrap().is_none());
}
