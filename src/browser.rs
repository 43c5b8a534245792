use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::driver::{Driver, DriverFault, FRAME_ELEMENTS};
use crate::types::{Locator, ViewportSize};

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver endpoint for this browser type
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "http://localhost:4444",
            BrowserType::Chrome => "http://localhost:9515",
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }
}

/// Options used to open a browser session
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser_type: BrowserType,
    pub webdriver_url: Option<String>,
    pub viewport: Option<ViewportSize>,
    pub headless: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Firefox,
            webdriver_url: None,
            viewport: None,
            headless: true,
        }
    }
}

/// W3C WebDriver binding of the `Driver` capability
pub struct FantocciniDriver {
    client: Client,
    browser_type: BrowserType,
}

fn fault(err: impl std::fmt::Display) -> DriverFault {
    DriverFault::classify(&err.to_string())
}

impl FantocciniDriver {
    /// Connect to a running geckodriver/chromedriver and open a session
    pub async fn connect(options: LaunchOptions) -> Result<Self> {
        let browser_type = options.browser_type;
        info!("Connecting to {:?} WebDriver", browser_type);

        let webdriver_url = options
            .webdriver_url
            .clone()
            .unwrap_or_else(|| browser_type.default_webdriver_url().to_string());

        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver_name = browser_type.driver_name();
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver_name,
                webdriver_url,
                driver_name
            );
        }

        let caps = Self::capabilities(&options);

        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Some(vp) = options.viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Self {
            client,
            browser_type,
        })
    }

    fn capabilities(options: &LaunchOptions) -> serde_json::Map<String, Value> {
        let mut caps = serde_json::Map::new();

        match options.browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if options.headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &options.viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if options.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &options.viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        caps
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));

        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    /// End the WebDriver session
    pub async fn close(&self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }

    async fn wait_until_ready(&self) {
        let wait_script = "return document.readyState === 'complete';";

        // Max 2 seconds
        for _ in 0..20 {
            match self.client.execute(wait_script, vec![]).await {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(100)).await,
            }
        }
    }
}

#[async_trait]
impl Driver for FantocciniDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverFault> {
        let parsed = url::Url::parse(url)
            .map_err(|e| DriverFault::Session(format!("invalid URL {}: {}", url, e)))?;

        info!("Navigating to {}", parsed);
        self.client.goto(parsed.as_str()).await.map_err(fault)?;
        self.wait_until_ready().await;
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<usize, DriverFault> {
        let query = match locator {
            Locator::XPath(v) => fantoccini::Locator::XPath(v),
            Locator::Css(v) => fantoccini::Locator::Css(v),
        };

        match self.client.find_all(query).await {
            Ok(elements) => Ok(elements.len()),
            Err(e) => match fault(e) {
                DriverFault::NotFound(_) => Ok(0),
                other => Err(other),
            },
        }
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverFault> {
        self.client.execute(script, args).await.map_err(fault)
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverFault> {
        let handles = self.client.windows().await.map_err(fault)?;
        Ok(handles.into_iter().map(String::from).collect())
    }

    async fn current_window(&self) -> Result<String, DriverFault> {
        let handle = self.client.window().await.map_err(fault)?;
        Ok(String::from(handle))
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverFault> {
        let handles = self.client.windows().await.map_err(fault)?;
        let target = handles
            .into_iter()
            .find(|h| String::from(h.clone()) == handle)
            .ok_or_else(|| DriverFault::NoSuchWindow(handle.to_string()))?;

        self.client.switch_to_window(target).await.map_err(fault)
    }

    async fn switch_to_default(&self) -> Result<(), DriverFault> {
        self.client.enter_frame(None).await.map_err(fault)
    }

    async fn switch_to_frame(&self, index: u16) -> Result<(), DriverFault> {
        // WebDriver's numeric frame index counts window.frames, which skips
        // frames without a content window. Enter by element reference instead.
        let frames = self
            .client
            .find_all(fantoccini::Locator::Css(FRAME_ELEMENTS))
            .await
            .map_err(fault)?;
        let frame = frames
            .into_iter()
            .nth(usize::from(index))
            .ok_or_else(|| DriverFault::NoSuchFrame(format!("index={}", index)))?;

        frame.enter_frame().await.map_err(fault)
    }

    async fn title(&self) -> Result<String, DriverFault> {
        self.client.title().await.map_err(fault)
    }
}

#[cfg(test)]
#[path = "browser_test.rs"]
mod browser_test;
