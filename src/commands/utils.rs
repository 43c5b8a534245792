use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use locprobe::history::history_path;
use locprobe::{
    BrowserSession, BrowserType, FantocciniDriver, HistoryManager, LaunchOptions, OutputFormat,
    PerfRegistry, SessionSettings, Settings, SiteConfig, StatisticsAggregator, ViewportSize,
};

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Browser to use (firefox or chrome)
    #[arg(short, long, global = true, default_value = "firefox")]
    pub browser: String,

    /// WebDriver endpoint (defaults to the browser's usual port)
    #[arg(long, global = true)]
    pub webdriver_url: Option<String>,

    /// Run browser in visible mode (disables headless)
    #[arg(long = "no-headless", global = true)]
    pub no_headless: bool,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long, global = true)]
    pub viewport: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Engine settings file (defaults to ~/.locprobe/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Statistics file (defaults to ~/.locprobe/statistics.json)
    #[arg(long, global = true)]
    pub stats_file: Option<PathBuf>,
}

/// A connected browser; keep the driver to close the WebDriver session
pub struct OpenBrowser {
    pub driver: Arc<FantocciniDriver>,
    pub session: Arc<BrowserSession>,
}

impl OpenBrowser {
    pub async fn close(self) {
        if let Err(e) = self.driver.close().await {
            debug!("Closing WebDriver session failed: {}", e);
        }
    }
}

pub fn load_settings(common: &CommonArgs) -> Result<Settings> {
    Ok(Settings::load(common.settings.as_deref())?)
}

pub fn load_site(path: &Path) -> Result<SiteConfig> {
    Ok(SiteConfig::load(path)?)
}

/// Undo history kept beside `config_path`
pub fn open_history(config_path: &Path, site: &SiteConfig, settings: &Settings) -> HistoryManager {
    HistoryManager::open(
        &history_path(config_path),
        &site.items,
        settings.history_max_size,
    )
}

/// Save the configuration, then the history that leads to it
pub fn save_site(config_path: &Path, site: &mut SiteConfig, history: &HistoryManager) -> Result<()> {
    site.save(config_path)?;
    history.save(&history_path(config_path))?;
    Ok(())
}

pub async fn open_browser(
    common: &CommonArgs,
    settings: &Settings,
    perf: Arc<PerfRegistry>,
) -> Result<OpenBrowser> {
    let viewport = common
        .viewport
        .as_deref()
        .map(ViewportSize::parse)
        .transpose()?;

    let options = LaunchOptions {
        browser_type: common.browser.parse::<BrowserType>()?,
        webdriver_url: common.webdriver_url.clone(),
        viewport,
        headless: !common.no_headless,
    };

    let driver = Arc::new(FantocciniDriver::connect(options).await?);
    let session = Arc::new(BrowserSession::new(
        driver.clone(),
        SessionSettings::from(settings),
        perf,
    ));
    Ok(OpenBrowser { driver, session })
}

fn stats_path(common: &CommonArgs) -> Result<PathBuf> {
    common
        .stats_file
        .clone()
        .or_else(StatisticsAggregator::default_path)
        .context("Could not determine the statistics file location")
}

/// Statistics with the background writer running
pub fn start_statistics(
    common: &CommonArgs,
    settings: &Settings,
    perf: Arc<PerfRegistry>,
) -> Result<StatisticsAggregator> {
    Ok(StatisticsAggregator::start(&stats_path(common)?, settings, perf))
}

/// Statistics for reading only
pub fn open_statistics(
    common: &CommonArgs,
    settings: &Settings,
    perf: Arc<PerfRegistry>,
) -> Result<StatisticsAggregator> {
    Ok(StatisticsAggregator::open(
        &stats_path(common)?,
        settings.max_test_records,
        perf,
    ))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// URL to open: explicit flag first, then the configuration's own
pub fn target_url(flag: Option<String>, site: &SiteConfig) -> Result<String> {
    flag.or_else(|| Some(site.url.clone()).filter(|u| !u.is_empty()))
        .context("No URL given and the configuration has none; pass --url")
}
