use anyhow::Result;
use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Settings, write_json};
use crate::perf::PerfRegistry;

/// One recorded validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRecord {
    pub item_name: String,
    pub xpath: String,
    pub success: bool,
    pub timestamp: String,
    pub frame_path: String,
    pub error_msg: String,
    pub elapsed_ms: f64,
}

impl Default for TestRecord {
    fn default() -> Self {
        Self {
            item_name: String::new(),
            xpath: String::new(),
            success: false,
            timestamp: String::new(),
            frame_path: String::new(),
            error_msg: String::new(),
            elapsed_ms: 0.0,
        }
    }
}

/// Running counters for one item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemStatistics {
    pub name: String,
    pub total_tests: u64,
    pub successful_tests: u64,
    pub failed_tests: u64,
    pub last_test_time: String,
    pub last_success_time: String,
    pub last_failure_time: String,
}

impl ItemStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.successful_tests as f64 / self.total_tests as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub total_items: usize,
    pub total_tests: u64,
    pub total_success: u64,
    pub total_failure: u64,
    pub average_success_rate: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StatisticsFile {
    stats: BTreeMap<String, ItemStatistics>,
    history: Vec<TestRecord>,
}

#[derive(Debug, Default)]
struct State {
    stats: BTreeMap<String, ItemStatistics>,
    history: VecDeque<TestRecord>,
    dirty: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Serializes file writes between the writer task and `save`
    io: Mutex<()>,
    flush: Notify,
    path: PathBuf,
    max_records: usize,
}

impl Shared {
    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Write the current state; with a deadline, give up if another write holds the file
    fn persist(&self, deadline: Option<Duration>) -> Result<()> {
        let _io = match deadline {
            Some(limit) => match self.io.try_lock_for(limit) {
                Some(guard) => guard,
                None => anyhow::bail!("statistics file busy for {:?}", limit),
            },
            None => self.io.lock(),
        };

        let file = {
            let mut state = self.state.lock();
            state.dirty = false;
            StatisticsFile {
                stats: state.stats.clone(),
                history: state.history.iter().cloned().collect(),
            }
        };

        if let Err(e) = write_json(&self.path, &file) {
            self.state.lock().dirty = true;
            return Err(e);
        }
        debug!("Statistics saved to {}", self.path.display());
        Ok(())
    }
}

/// Run `persist` on the blocking pool so a held file lock never stalls a runtime worker
async fn persist_blocking(shared: &Arc<Shared>, limit: Option<Duration>) -> Result<()> {
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || shared.persist(limit)).await?
}

/// Records test outcomes in memory and persists them from a background task
pub struct StatisticsAggregator {
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    perf: Arc<PerfRegistry>,
    shut_down: AtomicBool,
}

impl StatisticsAggregator {
    pub fn default_path() -> Option<PathBuf> {
        Settings::data_dir().map(|dir| dir.join("statistics.json"))
    }

    /// Load existing statistics from `path` without starting the writer
    pub fn open(path: &Path, max_records: usize, perf: Arc<PerfRegistry>) -> Self {
        let state = Self::load(path, max_records);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                io: Mutex::new(()),
                flush: Notify::new(),
                path: path.to_path_buf(),
                max_records,
            }),
            writer: Mutex::new(None),
            cancel: CancellationToken::new(),
            perf,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Open and start the periodic writer; must run inside a tokio runtime
    pub fn start(path: &Path, settings: &Settings, perf: Arc<PerfRegistry>) -> Self {
        let aggregator = Self::open(path, settings.max_test_records, perf);
        aggregator.spawn_writer(settings.statistics_save_interval());
        aggregator
    }

    fn load(path: &Path, max_records: usize) -> State {
        let mut state = State::default();
        if !path.exists() {
            return state;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to load statistics: {}", e);
                return state;
            }
        };

        match serde_json::from_str::<StatisticsFile>(&content) {
            Ok(file) => {
                state.stats = file.stats;
                let skip = file.history.len().saturating_sub(max_records);
                state.history = file.history.into_iter().skip(skip).collect();
            }
            Err(e) => {
                error!("Statistics file is corrupted, reinitializing: {}", e);
                let backup = path.with_extension("json.bak");
                if let Err(e) = std::fs::rename(path, &backup) {
                    warn!("Could not move corrupted statistics aside: {}", e);
                }
            }
        }
        state
    }

    /// Start the background writer if it is not running
    pub fn spawn_writer(&self, interval: Duration) {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *writer = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = shared.flush.notified() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
                if shared.is_dirty()
                    && let Err(e) = persist_blocking(&shared, None).await
                {
                    error!("Failed to save statistics: {}", e);
                }
            }

            if shared.is_dirty()
                && let Err(e) = persist_blocking(&shared, None).await
            {
                error!("Final statistics flush failed: {}", e);
            }
            debug!("Statistics writer stopped");
        }));
    }

    /// Count one outcome; never touches the disk
    pub fn record_test(
        &self,
        item_name: &str,
        xpath: &str,
        success: bool,
        elapsed_ms: f64,
        frame_path: &str,
        error_msg: &str,
    ) {
        let _span = self.perf.span("stats.record_test");
        let now = Local::now().to_rfc3339();

        let mut state = self.shared.state.lock();
        let stat = state
            .stats
            .entry(item_name.to_string())
            .or_insert_with(|| ItemStatistics {
                name: item_name.to_string(),
                ..Default::default()
            });
        stat.total_tests += 1;
        stat.last_test_time = now.clone();
        if success {
            stat.successful_tests += 1;
            stat.last_success_time = now.clone();
        } else {
            stat.failed_tests += 1;
            stat.last_failure_time = now.clone();
        }

        state.history.push_back(TestRecord {
            item_name: item_name.to_string(),
            xpath: xpath.to_string(),
            success,
            timestamp: now,
            frame_path: frame_path.to_string(),
            error_msg: error_msg.to_string(),
            elapsed_ms,
        });
        while state.history.len() > self.shared.max_records {
            state.history.pop_front();
        }
        state.dirty = true;
    }

    /// Ask the writer to flush soon without waiting
    pub fn request_flush(&self) {
        self.shared.flush.notify_one();
    }

    /// Write everything now
    pub fn save(&self) -> Result<()> {
        self.shared.persist(None)
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.is_dirty()
    }

    /// Stop the writer, flush, and wait at most `timeout` in total
    ///
    /// A writer that does not stop in time is aborted and the state is saved
    /// directly with whatever time is left. The perf summary is logged on the
    /// first call only.
    pub async fn shutdown(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        self.cancel.cancel();
        let handle = self.writer.lock().take();

        if let Some(mut handle) = handle {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Statistics writer ended abnormally: {}", e),
                Err(_) => {
                    warn!("Statistics writer did not stop in time; forcing save");
                    handle.abort();
                }
            }
        }

        if self.shared.is_dirty() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout_at(deadline, persist_blocking(&self.shared, Some(remaining)))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to save statistics on shutdown: {}", e),
                Err(_) => error!("Statistics save did not finish within {:?}", timeout),
            }
        }

        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.perf.log_summary();
            info!("Statistics shut down");
        }
    }

    pub fn item_stats(&self, item_name: &str) -> Option<ItemStatistics> {
        self.shared.state.lock().stats.get(item_name).cloned()
    }

    pub fn all_stats(&self) -> BTreeMap<String, ItemStatistics> {
        self.shared.state.lock().stats.clone()
    }

    pub fn summary(&self) -> StatisticsSummary {
        let state = self.shared.state.lock();
        let total_tests: u64 = state.stats.values().map(|s| s.total_tests).sum();
        let total_success: u64 = state.stats.values().map(|s| s.successful_tests).sum();
        let total_failure: u64 = state.stats.values().map(|s| s.failed_tests).sum();

        StatisticsSummary {
            total_items: state.stats.len(),
            total_tests,
            total_success,
            total_failure,
            average_success_rate: if total_tests > 0 {
                total_success as f64 / total_tests as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Tested items below `threshold` percent, least reliable first
    pub fn unstable_items(&self, threshold: f64) -> Vec<ItemStatistics> {
        let mut unstable: Vec<ItemStatistics> = self
            .shared
            .state
            .lock()
            .stats
            .values()
            .filter(|s| s.total_tests > 0 && s.success_rate() < threshold)
            .cloned()
            .collect();
        unstable.sort_by(|a, b| a.success_rate().total_cmp(&b.success_rate()));
        unstable
    }

    /// Newest records first
    pub fn recent_history(&self, limit: usize) -> Vec<TestRecord> {
        self.shared
            .state
            .lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn item_history(&self, item_name: &str, limit: usize) -> Vec<TestRecord> {
        self.shared
            .state
            .lock()
            .history
            .iter()
            .rev()
            .filter(|r| r.item_name == item_name)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stats.clear();
            state.history.clear();
            state.dirty = true;
        }
        self.request_flush();
    }

    pub fn clear_item(&self, item_name: &str) {
        {
            let mut state = self.shared.state.lock();
            state.stats.remove(item_name);
            state.history.retain(|r| r.item_name != item_name);
            state.dirty = true;
        }
        self.request_flush();
    }

    pub fn perf(&self) -> &Arc<PerfRegistry> {
        &self.perf
    }
}

impl Drop for StatisticsAggregator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "statistics_test.rs"]
mod statistics_test;
