use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::driver::{Driver, DriverFault};
use crate::errors::LocprobeError;
use crate::perf::PerfRegistry;
use crate::topology::{self, FrameNode, MAIN_FRAME, TopologyCache, is_main, normalize_path};
use crate::types::{ElementInfo, Locator, ValidationFailure, ValidationResult};

/// Timing and depth limits used by a browser session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_frame_depth: usize,
    pub frame_cache_ttl: Duration,
    pub lookup_timeout: Duration,
    pub session_end_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            max_frame_depth: settings.max_frame_depth,
            frame_cache_ttl: settings.frame_cache_ttl(),
            lookup_timeout: settings.lookup_timeout(),
            session_end_timeout: settings.session_end_timeout(),
        }
    }
}

/// Where a selector matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementLocation {
    pub frame_path: String,
    pub match_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    pub handle: String,
    pub title: String,
    pub current: bool,
}

#[derive(Debug, Clone)]
struct CurrentFrame {
    path: String,
    epoch: u64,
}

/// A group of lookups sharing one resolved topology
///
/// Not safe for concurrent use; the owner serializes calls. Obtain one with
/// [`BrowserSession::begin`] and hand it back to [`BrowserSession::end`].
#[derive(Debug)]
pub struct ValidationSession {
    id: Uuid,
    started_at: DateTime<Local>,
    started: Instant,
    topology: Vec<FrameNode>,
    /// Selector -> frame path of its last match
    hints: HashMap<String, String>,
    misses: HashSet<String>,
    current_frame: Option<CurrentFrame>,
    lookups: usize,
}

impl ValidationSession {
    fn new(topology: Vec<FrameNode>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            started: Instant::now(),
            topology,
            hints: HashMap::new(),
            misses: HashSet::new(),
            current_frame: None,
            lookups: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn topology(&self) -> &[FrameNode] {
        &self.topology
    }

    pub fn hint(&self, selector: &str) -> Option<&str> {
        self.hints.get(selector).map(String::as_str)
    }

    /// Seed the frame to try first for `selector`
    pub fn set_hint(&mut self, selector: &str, frame_path: &str) {
        self.hints
            .insert(selector.to_string(), normalize_path(frame_path));
    }

    pub fn was_missed(&self, selector: &str) -> bool {
        self.misses.contains(selector)
    }

    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[derive(Debug, Clone, Copy)]
enum Query {
    Count,
    Describe { include_attributes: bool },
}

enum QueryHit {
    Count(usize),
    Info(ElementInfo),
}

impl QueryHit {
    fn match_count(&self) -> usize {
        match self {
            QueryHit::Count(n) => *n,
            QueryHit::Info(info) => info.match_count,
        }
    }
}

/// Identity of a search candidate: the frame element chain when the frame was
/// discovered, the path text otherwise
#[derive(Debug, PartialEq, Eq, Hash)]
enum FrameKey {
    Indices(Vec<u16>),
    Path(String),
}

fn frame_key(path: &str, topology: &[FrameNode]) -> FrameKey {
    if is_main(path) {
        return FrameKey::Indices(Vec::new());
    }
    topology
        .iter()
        .find(|node| node.frame_path == path)
        .map(|node| FrameKey::Indices(node.index_path.clone()))
        .unwrap_or_else(|| FrameKey::Path(path.to_string()))
}

/// Owns a driver and the frame topology of its current window
///
/// Every operation that switches into a frame leaves the driver in a known
/// context: the top-level document, or the frame recorded in the caller's
/// [`ValidationSession`].
pub struct BrowserSession {
    driver: Arc<dyn Driver>,
    topology: Mutex<TopologyCache>,
    settings: SessionSettings,
    needs_recovery: AtomicBool,
    /// Bumped on every context switch so sessions can tell whether their
    /// recorded frame is still current
    context_epoch: AtomicU64,
    perf: Arc<PerfRegistry>,
}

impl BrowserSession {
    pub fn new(driver: Arc<dyn Driver>, settings: SessionSettings, perf: Arc<PerfRegistry>) -> Self {
        Self {
            topology: Mutex::new(TopologyCache::new(settings.frame_cache_ttl)),
            driver,
            settings,
            needs_recovery: AtomicBool::new(false),
            context_epoch: AtomicU64::new(0),
            perf,
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn perf(&self) -> &Arc<PerfRegistry> {
        &self.perf
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Whether a driver failure is waiting for `is_alive` recovery
    pub fn needs_recovery(&self) -> bool {
        self.needs_recovery.load(Ordering::SeqCst)
    }

    /// Force the next discovery to rescan; always wins over the TTL
    pub async fn invalidate_topology(&self) {
        self.topology.lock().await.invalidate();
    }

    fn mark_context(&self) {
        self.context_epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn reset_to_default(&self) -> Result<(), DriverFault> {
        self.mark_context();
        self.driver.switch_to_default().await
    }

    pub(crate) async fn enter_index_path(&self, index_path: &[u16]) -> Result<(), DriverFault> {
        self.mark_context();
        topology::enter_index_path(self.driver.as_ref(), index_path).await
    }

    /// Walk `path` segment by segment, matching frames by id, name or index
    async fn enter_path(&self, path: &str) -> Result<bool, DriverFault> {
        self.reset_to_default().await?;

        for segment in topology::segments(path) {
            let frames = match self.driver.frame_descriptors().await {
                Ok(frames) => frames,
                Err(fault) => return self.abandon_path(path, fault).await,
            };

            let Some(frame) = frames.iter().find(|f| f.matches(segment)) else {
                debug!("Frame segment {} of {} not found", segment, path);
                self.reset_to_default().await?;
                return Ok(false);
            };

            if let Err(fault) = self.driver.switch_to_frame(frame.index).await {
                return self.abandon_path(path, fault).await;
            }
        }

        Ok(true)
    }

    async fn abandon_path(&self, path: &str, fault: DriverFault) -> Result<bool, DriverFault> {
        let restored = self.reset_to_default().await;
        if fault.is_session_level() {
            return Err(fault);
        }
        debug!("Could not enter frame path {}: {}", path, fault);
        restored.map(|_| false)
    }

    /// Enter `path` from the top-level document
    ///
    /// Returns false and leaves the driver at the top-level document when a
    /// segment cannot be entered.
    pub async fn switch_to_frame_path(&self, path: &str) -> bool {
        if is_main(path) {
            return self.reset_to_default().await.is_ok();
        }
        match self.enter_path(path).await {
            Ok(entered) => entered,
            Err(fault) => {
                warn!("Driver failure entering {}: {}", path, fault);
                self.needs_recovery.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    /// Check the active window, moving to the first live one if it vanished
    ///
    /// Returns false only when no window is left. Never fails and can be called
    /// repeatedly.
    pub async fn is_alive(&self) -> bool {
        let handles = match self.driver.window_handles().await {
            Ok(handles) => handles,
            Err(e) => {
                debug!("Window handle check failed: {}", e);
                self.needs_recovery.store(true, Ordering::SeqCst);
                return false;
            }
        };

        if let Ok(current) = self.driver.current_window().await
            && handles.contains(&current)
        {
            self.needs_recovery.store(false, Ordering::SeqCst);
            return true;
        }

        self.invalidate_topology().await;
        self.mark_context();
        for handle in &handles {
            if self.driver.switch_to_window(handle).await.is_ok() {
                info!("Recovered browser session on window {}", handle);
                if let Err(e) = self.reset_to_default().await {
                    debug!("Could not reset context after recovery: {}", e);
                }
                self.needs_recovery.store(false, Ordering::SeqCst);
                return true;
            }
        }

        warn!("No browser windows remain");
        self.needs_recovery.store(true, Ordering::SeqCst);
        false
    }

    pub async fn navigate(&self, url: &str) -> Result<(), LocprobeError> {
        self.mark_context();
        let outcome = self.driver.navigate(url).await;
        self.invalidate_topology().await;
        outcome.map_err(|fault| self.escalate(fault))
    }

    /// Frames of the current window, from cache while it is fresh
    pub async fn discover_frames(&self) -> Result<Vec<FrameNode>, LocprobeError> {
        let _span = self.perf.span("session.discover_frames");
        let window = self
            .driver
            .current_window()
            .await
            .map_err(|fault| self.escalate(fault))?;

        let mut cache = self.topology.lock().await;
        if cache.is_valid_for(&window) {
            return Ok(cache.entries().to_vec());
        }

        self.mark_context();
        let discovery = match topology::discover(self.driver.as_ref(), self.settings.max_frame_depth)
            .await
        {
            Ok(discovery) => discovery,
            Err(fault) => {
                cache.invalidate();
                return Err(self.escalate(fault));
            }
        };

        if discovery.complete {
            cache.store(&window, discovery.frames.clone());
        } else {
            cache.invalidate();
        }
        Ok(discovery.frames)
    }

    /// Drop the cache and rescan
    pub async fn refresh_frames(&self) -> Result<Vec<FrameNode>, LocprobeError> {
        self.invalidate_topology().await;
        self.discover_frames().await
    }

    fn escalate(&self, fault: DriverFault) -> LocprobeError {
        if fault.is_session_level() {
            self.needs_recovery.store(true, Ordering::SeqCst);
        }
        LocprobeError::from(fault)
    }

    /// Start a session over the current topology
    pub async fn begin(&self) -> ValidationSession {
        let topology = match self.discover_frames().await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Frame discovery failed, searching the top document only: {}", e);
                Vec::new()
            }
        };
        let session = ValidationSession::new(topology);
        debug!(
            "Validation session {} started with {} frame(s)",
            session.id,
            session.topology.len()
        );
        session
    }

    /// Return the driver to the top-level document, waiting a bounded time
    pub async fn end(&self, session: ValidationSession) {
        self.mark_context();
        match tokio::time::timeout(self.settings.session_end_timeout, self.driver.switch_to_default())
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not reset browser context: {}", e),
            Err(_) => warn!(
                "Browser context reset exceeded {:?}",
                self.settings.session_end_timeout
            ),
        }
        debug!(
            "Validation session {} ended after {} lookup(s) in {:?}",
            session.id,
            session.lookups,
            session.started.elapsed()
        );
    }

    async fn query_once(&self, locator: &Locator, query: Query) -> Result<Option<QueryHit>, DriverFault> {
        let lookup = async {
            match query {
                Query::Count => match self.driver.find_all(locator).await {
                    Ok(0) | Err(DriverFault::NotFound(_)) => Ok(None),
                    Ok(n) => Ok(Some(QueryHit::Count(n))),
                    Err(fault) => Err(fault),
                },
                Query::Describe { include_attributes } => {
                    match self.driver.describe_element(locator, include_attributes).await {
                        Ok(info) => Ok(info.map(QueryHit::Info)),
                        Err(DriverFault::NotFound(_)) => Ok(None),
                        Err(fault) => Err(fault),
                    }
                }
            }
        };

        match tokio::time::timeout(self.settings.lookup_timeout, lookup).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DriverFault::Timeout(format!(
                "lookup of {} exceeded {:?}",
                locator, self.settings.lookup_timeout
            ))),
        }
    }

    /// Lookup in the current context; a stale reference is retried once
    async fn query_here(&self, locator: &Locator, query: Query) -> Result<Option<QueryHit>, DriverFault> {
        match self.query_once(locator, query).await {
            Err(DriverFault::StaleReference(msg)) => {
                debug!("Stale reference for {}, retrying: {}", locator, msg);
                match self.query_once(locator, query).await {
                    Err(DriverFault::StaleReference(_)) => Ok(None),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn enter_frame(&self, path: &str, session: &mut ValidationSession) -> Result<bool, DriverFault> {
        let epoch = self.context_epoch.load(Ordering::SeqCst);
        if let Some(current) = &session.current_frame
            && current.path == path
            && current.epoch == epoch
        {
            return Ok(true);
        }

        let node = session
            .topology
            .iter()
            .find(|node| node.frame_path == path)
            .map(|node| node.index_path.clone());

        let entered = if is_main(path) {
            self.reset_to_default().await.map(|_| true)
        } else if let Some(index_path) = node {
            match self.enter_index_path(&index_path).await {
                Ok(()) => Ok(true),
                Err(fault) if fault.is_session_level() => Err(fault),
                Err(_) => self.enter_path(path).await,
            }
        } else {
            self.enter_path(path).await
        };

        session.current_frame = match entered {
            Ok(true) => Some(CurrentFrame {
                path: path.to_string(),
                epoch: self.context_epoch.load(Ordering::SeqCst),
            }),
            _ => None,
        };
        entered
    }

    async fn driver_failure(&self, fault: DriverFault, session: &mut ValidationSession) -> LocprobeError {
        warn!("Driver failure during lookup: {}", fault);
        self.needs_recovery.store(true, Ordering::SeqCst);
        session.current_frame = None;
        if let Err(e) = self.reset_to_default().await {
            debug!("Could not reset context after failure: {}", e);
        }
        LocprobeError::Driver(fault.to_string())
    }

    /// Search order: preferred frame, the session's hint, the top-level
    /// document, then every discovered frame shallow to deep
    async fn locate(
        &self,
        locator: &Locator,
        preferred: Option<&str>,
        session: &mut ValidationSession,
        query: Query,
    ) -> Result<Option<(String, QueryHit)>, LocprobeError> {
        session.lookups += 1;
        let key = locator.value().to_string();
        let preferred = preferred.map(normalize_path);

        let mut seen = HashSet::new();
        let candidates: Vec<String> = preferred
            .iter()
            .cloned()
            .chain(session.hints.get(&key).cloned())
            .chain(std::iter::once(MAIN_FRAME.to_string()))
            .chain(session.topology.iter().map(|node| node.frame_path.clone()))
            .filter(|path| seen.insert(frame_key(path, &session.topology)))
            .collect();

        let mut timed_out = None;
        let mut unresolved = None;

        for path in candidates {
            match self.enter_frame(&path, session).await {
                Ok(true) => {}
                Ok(false) => {
                    if preferred.as_ref() == Some(&path) {
                        unresolved = Some(path);
                    } else {
                        self.invalidate_topology().await;
                    }
                    continue;
                }
                Err(fault) => return Err(self.driver_failure(fault, session).await),
            }

            match self.query_here(locator, query).await {
                Ok(Some(hit)) => {
                    debug!("{} matched in {}", locator, path);
                    session.misses.remove(&key);
                    session.hints.insert(key, path.clone());
                    return Ok(Some((path, hit)));
                }
                Ok(None) => {}
                Err(DriverFault::Timeout(msg)) => timed_out = Some(msg),
                Err(DriverFault::InvalidSelector(msg)) => {
                    session.current_frame = None;
                    return Err(LocprobeError::InvalidSelector(msg));
                }
                Err(fault) if fault.is_session_level() => {
                    return Err(self.driver_failure(fault, session).await);
                }
                Err(fault) => {
                    debug!("Lookup in {} failed: {}", path, fault);
                    session.current_frame = None;
                }
            }
        }

        session.hints.remove(&key);
        session.misses.insert(key);

        if let Some(msg) = timed_out {
            return Err(LocprobeError::Timeout(msg));
        }
        if let Some(path) = unresolved {
            return Err(LocprobeError::FrameResolution(path));
        }
        Ok(None)
    }

    pub(crate) async fn ensure_alive(&self) -> Result<(), LocprobeError> {
        if self.needs_recovery() && !self.is_alive().await {
            return Err(LocprobeError::Driver(
                "no browser window available".to_string(),
            ));
        }
        Ok(())
    }

    async fn locate_with(
        &self,
        locator: &Locator,
        preferred: Option<&str>,
        session: Option<&mut ValidationSession>,
        query: Query,
    ) -> Result<Option<(String, QueryHit)>, LocprobeError> {
        self.ensure_alive().await?;
        match session {
            Some(session) => self.locate(locator, preferred, session, query).await,
            None => {
                let mut oneshot = self.begin().await;
                let outcome = self.locate(locator, preferred, &mut oneshot, query).await;
                self.end(oneshot).await;
                outcome
            }
        }
    }

    /// Check whether `selector` resolves, searching frames as needed
    ///
    /// Without a session the call runs in a one-shot session of its own.
    /// Absence, timeouts and driver failures are reported in the result.
    pub async fn validate(
        &self,
        selector: &str,
        preferred_frame: Option<&str>,
        session: Option<&mut ValidationSession>,
    ) -> ValidationResult {
        let _span = self.perf.span("session.validate");
        let started = Instant::now();
        let elapsed = || started.elapsed().as_secs_f64() * 1000.0;

        let locator = Locator::parse(selector);
        if locator.is_empty() {
            return ValidationResult::failed(selector, ValidationFailure::NotFound, elapsed());
        }

        match self
            .locate_with(&locator, preferred_frame, session, Query::Count)
            .await
        {
            Ok(Some((path, hit))) => {
                ValidationResult::found(selector, hit.match_count(), &path, elapsed())
            }
            Ok(None) => ValidationResult::failed(selector, ValidationFailure::NotFound, elapsed()),
            Err(LocprobeError::Timeout(_)) => {
                ValidationResult::failed(selector, ValidationFailure::Timeout, elapsed())
            }
            Err(LocprobeError::InvalidSelector(message)) => ValidationResult::failed(
                selector,
                ValidationFailure::InvalidSelector { message },
                elapsed(),
            ),
            Err(LocprobeError::FrameResolution(path)) => ValidationResult::failed(
                selector,
                ValidationFailure::FrameResolution { path },
                elapsed(),
            ),
            Err(e) => ValidationResult::failed(
                selector,
                ValidationFailure::Driver {
                    message: e.to_string(),
                },
                elapsed(),
            ),
        }
    }

    /// Structural record of the first match, `None` when the element is absent
    pub async fn get_element_info(
        &self,
        selector: &str,
        frame_path: Option<&str>,
        include_attributes: bool,
        session: Option<&mut ValidationSession>,
    ) -> Result<Option<ElementInfo>, LocprobeError> {
        let _span = self.perf.span("session.get_element_info");
        let locator = Locator::parse(selector);
        if locator.is_empty() {
            return Ok(None);
        }

        let found = self
            .locate_with(
                &locator,
                frame_path,
                session,
                Query::Describe { include_attributes },
            )
            .await?;

        Ok(match found {
            Some((path, QueryHit::Info(mut info))) => {
                info.frame_path = path;
                Some(info)
            }
            _ => None,
        })
    }

    /// First frame where `selector` matches; restores the top-level document
    pub async fn find_element_in_all_frames(
        &self,
        selector: &str,
    ) -> Result<Option<ElementLocation>, LocprobeError> {
        let locator = Locator::parse(selector);
        if locator.is_empty() {
            return Ok(None);
        }

        let found = self
            .locate_with(&locator, None, None, Query::Count)
            .await?;
        Ok(found.map(|(frame_path, hit)| ElementLocation {
            match_count: hit.match_count(),
            frame_path,
        }))
    }

    /// Live match count in one frame: -1 when the lookup fails, 0 when absent
    pub async fn count_elements(&self, selector: &str, frame_path: Option<&str>) -> i64 {
        let locator = Locator::parse(selector);
        if locator.is_empty() {
            return 0;
        }

        let path = frame_path.unwrap_or(MAIN_FRAME);
        let count = if self.switch_to_frame_path(path).await {
            match self.query_here(&locator, Query::Count).await {
                Ok(hit) => hit.map_or(0, |h| h.match_count() as i64),
                Err(fault) => {
                    debug!("Count of {} in {} failed: {}", selector, path, fault);
                    if fault.is_session_level() {
                        self.needs_recovery.store(true, Ordering::SeqCst);
                    }
                    -1
                }
            }
        } else {
            -1
        };

        if let Err(e) = self.reset_to_default().await {
            debug!("Could not reset context after count: {}", e);
        }
        count
    }

    /// All windows with their titles; the active window is restored afterwards
    pub async fn windows(&self) -> Result<Vec<WindowInfo>, LocprobeError> {
        let original = self.driver.current_window().await.ok();
        let handles = self
            .driver
            .window_handles()
            .await
            .map_err(|fault| self.escalate(fault))?;

        self.mark_context();
        let mut windows = Vec::with_capacity(handles.len());
        for handle in handles {
            let title = match self.driver.switch_to_window(&handle).await {
                Ok(()) => self.driver.title().await.unwrap_or_default(),
                Err(e) => {
                    debug!("Could not inspect window {}: {}", handle, e);
                    String::new()
                }
            };
            windows.push(WindowInfo {
                current: original.as_deref() == Some(handle.as_str()),
                handle,
                title,
            });
        }

        if let Some(original) = &original
            && let Err(e) = self.driver.switch_to_window(original).await
        {
            warn!("Could not return to window {}: {}", original, e);
        }
        Ok(windows)
    }

    /// Make `handle` the active window, recovering to any live window on failure
    pub async fn switch_window(&self, handle: &str) -> bool {
        self.mark_context();
        self.invalidate_topology().await;
        match self.driver.switch_to_window(handle).await {
            Ok(()) => {
                if let Err(e) = self.reset_to_default().await {
                    debug!("Could not reset context in {}: {}", handle, e);
                }
                true
            }
            Err(e) => {
                warn!("Could not switch to window {}: {}", handle, e);
                self.is_alive().await;
                false
            }
        }
    }
}
