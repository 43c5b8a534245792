//! # locprobe
#![allow(clippy::uninlined_format_args)]
//!
//! Keeps XPath/CSS selectors working on pages built from nested iframes and
//! popup windows.
//!
//! The engine discovers frame topology, validates selectors in every frame
//! through a reusable session, ranks alternative selectors by robustness,
//! detects element changes against stored snapshots, keeps a bounded undo
//! history of item edits, and aggregates per-item statistics.
//!
//! ## CLI Usage
//!
//! ```bash
//! # List the frames and windows of a page
//! locprobe frames "https://tickets.example.com"
//!
//! # Validate every item of a site configuration against the live page
//! locprobe validate site.json
//!
//! # Report elements that changed since their snapshot was captured
//! locprobe diff site.json --format simple
//!
//! # Rank alternative selectors for one item and keep them
//! locprobe alternatives site.json login_btn --store
//!
//! # Robustness score of an arbitrary selector
//! locprobe score '//*[@id="login"]'
//!
//! # Items that pass less than 80% of the time
//! locprobe stats --unstable 80
//! ```
//!
//! Start geckodriver (`geckodriver --port 4444`) or chromedriver
//! (`chromedriver --port 9515`) before running commands that open a browser.
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use locprobe::{BrowserSession, FantocciniDriver, LaunchOptions, PerfRegistry, SessionSettings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let driver = Arc::new(FantocciniDriver::connect(LaunchOptions::default()).await?);
//! let browser = BrowserSession::new(driver, SessionSettings::default(), Arc::new(PerfRegistry::default()));
//!
//! browser.navigate("https://example.com").await?;
//! let mut session = browser.begin().await;
//! let result = browser.validate("//h1", None, Some(&mut session)).await;
//! browser.end(session).await;
//! println!("found={} in {}", result.found, result.frame_path);
//! # Ok(())
//! # }
//! ```

/// Batch validation on a background task and outcome recording
pub mod batch;

/// WebDriver binding of the driver capability
pub mod browser;

/// Engine settings and persisted site configurations
pub mod config;

/// Snapshot store and change detection
pub mod diff;

/// Browser driver capability consumed by the engine
pub mod driver;

/// Error taxonomy and exit codes
pub mod errors;

/// Undo/redo over the item collection
pub mod history;

/// Selector robustness scoring and alternative generation
pub mod optimizer;

/// Named duration samples
pub mod perf;

/// Element picker plumbing
pub mod picker;

/// Browser session, frame search and validation sessions
pub mod session;

/// Test outcome statistics with a background writer
pub mod statistics;

/// Frame topology discovery and caching
pub mod topology;

/// Shared value types
pub mod types;

pub use batch::{BatchEvent, BatchItem, BatchOutcome, BatchValidator, record_validation_outcome};
pub use browser::{BrowserType, FantocciniDriver, LaunchOptions};
pub use config::{SelectorItem, Settings, SiteConfig};
pub use diff::{DiffReport, DiffStatus, ElementSnapshot, SnapshotStore};
pub use driver::{Driver, DriverFault, FrameDescriptor};
pub use errors::LocprobeError;
pub use history::{HistoryAction, HistoryManager};
pub use optimizer::{Alternative, Optimizer, Strategy, StrategyWeights};
pub use perf::PerfRegistry;
pub use picker::{PickedElement, PickerOutcome};
pub use session::{BrowserSession, SessionSettings, ValidationSession};
pub use statistics::StatisticsAggregator;
pub use topology::FrameNode;
pub use types::{ElementInfo, Locator, OutputFormat, ValidationFailure, ValidationResult, ViewportSize};
