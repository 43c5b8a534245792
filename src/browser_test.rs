// Unit tests for the WebDriver binding that do not need a live browser

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::str::FromStr;

    #[test]
    fn test_browser_type_from_str() {
        assert_eq!(
            BrowserType::from_str("firefox").unwrap(),
            BrowserType::Firefox
        );
        assert_eq!(
            BrowserType::from_str("Chromium").unwrap(),
            BrowserType::Chrome
        );
        assert!(BrowserType::from_str("safari").is_err());
    }

    #[test]
    fn test_firefox_capabilities() {
        let options = LaunchOptions {
            viewport: Some(ViewportSize {
                width: 1280,
                height: 720,
            }),
            ..Default::default()
        };
        let caps = FantocciniDriver::capabilities(&options);
        let args = &caps["moz:firefoxOptions"]["args"];
        assert_eq!(args[0], "--headless");
        assert_eq!(args[1], "--width=1280");
        assert_eq!(args[2], "--height=720");
    }

    #[test]
    fn test_chrome_capabilities_without_headless() {
        let options = LaunchOptions {
            browser_type: BrowserType::Chrome,
            headless: false,
            ..Default::default()
        };
        let caps = FantocciniDriver::capabilities(&options);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0], "--no-sandbox");
    }

    #[tokio::test]
    async fn test_status_check_unreachable() {
        assert!(!FantocciniDriver::is_webdriver_running("http://127.0.0.1:1").await);
    }
}
