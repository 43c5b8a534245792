use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SelectorItem;
use crate::diff::{ElementSnapshot, SnapshotStore};
use crate::errors::LocprobeError;
use crate::session::{BrowserSession, ValidationSession};
use crate::statistics::StatisticsAggregator;
use crate::topology::is_main;
use crate::types::ValidationResult;

/// One selector queued for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub selector: String,
    /// Frame to try first, usually where the item was last found
    pub frame_hint: Option<String>,
}

impl From<&SelectorItem> for BatchItem {
    fn from(item: &SelectorItem) -> Self {
        Self {
            name: item.name.clone(),
            selector: item.selector().to_string(),
            frame_hint: Some(item.found_frame_path.clone()).filter(|p| !is_main(p)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub name: String,
    pub result: ValidationResult,
}

/// Everything a batch produced, including partial runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ItemOutcome>,
    pub cancelled: bool,
    /// Set when the browser was lost and the rest of the batch was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl BatchOutcome {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|o| o.result.found).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Notifications from a running batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Progress {
        current: usize,
        total: usize,
        item_name: String,
    },
    ItemValidated(ItemOutcome),
    Completed(BatchOutcome),
}

/// Handle to a batch running on a background task
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: CancellationToken,
    task: JoinHandle<BatchOutcome>,
}

impl BatchHandle {
    /// Stop after the item currently being validated
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, `None` once the batch has finished and all events are read
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Wait for the batch to finish
    pub async fn wait(self) -> Result<BatchOutcome, LocprobeError> {
        self.task
            .await
            .map_err(|e| LocprobeError::Other(anyhow::anyhow!("batch task failed: {}", e)))
    }
}

/// Validates items one after another in a single session
pub struct BatchValidator {
    browser: Arc<BrowserSession>,
}

impl BatchValidator {
    pub fn new(browser: Arc<BrowserSession>) -> Self {
        Self { browser }
    }

    /// Start validating `items` in the background
    pub fn spawn(&self, items: Vec<BatchItem>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let browser = Arc::clone(&self.browser);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = run_batch(&browser, &items, &token, &tx).await;
            let _ = tx.send(BatchEvent::Completed(outcome.clone()));
            outcome
        });

        BatchHandle {
            events: rx,
            cancel,
            task,
        }
    }
}

async fn run_batch(
    browser: &BrowserSession,
    items: &[BatchItem],
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<BatchEvent>,
) -> BatchOutcome {
    let total = items.len();
    let mut outcome = BatchOutcome::default();
    let mut session = browser.begin().await;
    info!("Validating {} item(s) in session {}", total, session.id());

    for (index, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Batch cancelled after {} of {} item(s)", index, total);
            outcome.cancelled = true;
            break;
        }

        let _ = events.send(BatchEvent::Progress {
            current: index + 1,
            total,
            item_name: item.name.clone(),
        });

        let result = browser
            .validate(&item.selector, item.frame_hint.as_deref(), Some(&mut session))
            .await;
        debug!(
            "{}: found={} in {:.1} ms",
            item.name, result.found, result.elapsed_ms
        );

        let driver_lost = result.error.as_ref().is_some_and(|e| e.is_driver_level());
        let message = result.error_message();
        let validated = ItemOutcome {
            name: item.name.clone(),
            result,
        };
        let _ = events.send(BatchEvent::ItemValidated(validated.clone()));
        outcome.results.push(validated);

        if driver_lost && !browser.is_alive().await {
            warn!("Browser lost, skipping the rest of the batch: {}", message);
            outcome.aborted = Some(message);
            break;
        }
    }

    browser.end(session).await;
    outcome
}

/// Apply one validation result to the item, statistics and snapshot store
///
/// A successful lookup refreshes the element tag; full attributes are read
/// only when the item has no snapshot yet.
pub async fn record_validation_outcome(
    item: &mut SelectorItem,
    result: &ValidationResult,
    stats: &StatisticsAggregator,
    snapshots: &mut SnapshotStore,
    browser: &BrowserSession,
    session: Option<&mut ValidationSession>,
) -> Result<(), LocprobeError> {
    item.is_verified = result.found;
    item.record_test(result.found);
    stats.record_test(
        &item.name,
        item.selector(),
        result.found,
        result.elapsed_ms,
        &result.frame_path,
        &result.error_message(),
    );

    if !result.found {
        return Ok(());
    }

    item.found_frame_path = result.frame_path.clone();
    if item.has_snapshot()
        && !item.element_attributes.is_legacy()
        && !snapshots.has_snapshot(&item.name)
    {
        snapshots.save(&item.name, item.element_attributes.clone());
    }
    // legacy records are replaced by a full capture
    let need_snapshot = snapshots
        .get(&item.name)
        .is_none_or(|snapshot| snapshot.is_legacy());
    let selector = item.selector().to_string();

    let Some(info) = browser
        .get_element_info(&selector, Some(&result.frame_path), need_snapshot, session)
        .await?
    else {
        return Ok(());
    };

    item.element_tag = info.tag.clone();
    if need_snapshot {
        snapshots.save_info(&item.name, &selector, &info);
        item.element_attributes = ElementSnapshot::capture(&selector, &info);
        debug!("Captured snapshot for {}", item.name);
    }
    Ok(())
}
