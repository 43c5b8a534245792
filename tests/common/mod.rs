// Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use locprobe::{
    BrowserSession, Driver, DriverFault, ElementInfo, FrameDescriptor, Locator, PerfRegistry,
    SessionSettings,
};

/// One document: its elements keyed by selector, and its child frames
#[derive(Debug, Clone, Default)]
pub struct FakeDoc {
    pub elements: HashMap<String, Vec<ElementInfo>>,
    pub frames: Vec<FakeFrame>,
    /// Listing this document's frames fails
    pub unreadable: bool,
    pub picker_active: bool,
    pub picker_result: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FakeFrame {
    pub id: String,
    pub name: String,
    pub doc: FakeDoc,
}

impl FakeDoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, selector: &str, info: ElementInfo) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(info);
        self
    }

    pub fn with_frame(mut self, id: &str, doc: FakeDoc) -> Self {
        self.frames.push(FakeFrame {
            id: id.to_string(),
            name: String::new(),
            doc,
        });
        self
    }

    pub fn with_named_frame(mut self, name: &str, doc: FakeDoc) -> Self {
        self.frames.push(FakeFrame {
            id: String::new(),
            name: name.to_string(),
            doc,
        });
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    pub fn with_picker_result(mut self, value: Value) -> Self {
        self.picker_result = Some(value);
        self
    }

    fn at(&self, path: &[u16]) -> Option<&FakeDoc> {
        let mut doc = self;
        for index in path {
            doc = &doc.frames.get(*index as usize)?.doc;
        }
        Some(doc)
    }

    fn at_mut(&mut self, path: &[u16]) -> Option<&mut FakeDoc> {
        let mut doc = self;
        for index in path {
            doc = &mut doc.frames.get_mut(*index as usize)?.doc;
        }
        Some(doc)
    }
}

pub fn element(tag: &str, id: &str, class: &str, text: &str) -> ElementInfo {
    let mut attributes = BTreeMap::new();
    if !id.is_empty() {
        attributes.insert("id".to_string(), id.to_string());
    }
    if !class.is_empty() {
        attributes.insert("class".to_string(), class.to_string());
    }
    ElementInfo {
        tag: tag.to_string(),
        id: id.to_string(),
        class: class.to_string(),
        text: text.to_string(),
        attributes,
        parent_tag: "div".to_string(),
        sibling_index: 1,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: String,
    pub title: String,
    pub doc: FakeDoc,
}

#[derive(Debug, Default)]
struct State {
    windows: Vec<FakeWindow>,
    current: Option<String>,
    context: Vec<u16>,
    stale_once: HashSet<String>,
    failing: HashMap<String, DriverFault>,
    slow: HashMap<String, Duration>,
    crashed: bool,
    navigations: Vec<String>,
    listings: usize,
    describe_calls: Vec<bool>,
    scripts: Vec<String>,
}

impl State {
    fn check(&self) -> Result<(), DriverFault> {
        if self.crashed {
            return Err(DriverFault::Session("browser crashed".to_string()));
        }
        if self.current.is_none() {
            return Err(DriverFault::NoSuchWindow("window closed".to_string()));
        }
        Ok(())
    }

    fn window_mut(&mut self) -> Result<&mut FakeWindow, DriverFault> {
        self.check()?;
        let handle = self.current.clone().unwrap_or_default();
        self.windows
            .iter_mut()
            .find(|w| w.handle == handle)
            .ok_or_else(|| DriverFault::NoSuchWindow(handle))
    }

    fn doc(&mut self) -> Result<FakeDoc, DriverFault> {
        let context = self.context.clone();
        let window = self.window_mut()?;
        window
            .doc
            .at(&context)
            .cloned()
            .ok_or_else(|| DriverFault::NoSuchFrame(format!("{:?}", context)))
    }

    fn doc_mut(&mut self) -> Result<&mut FakeDoc, DriverFault> {
        let context = self.context.clone();
        let window = self.window_mut()?;
        window
            .doc
            .at_mut(&context)
            .ok_or_else(|| DriverFault::NoSuchFrame(format!("{:?}", context)))
    }
}

/// In-memory browser with nested frames and several windows
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<State>,
}

impl FakeDriver {
    pub fn new(doc: FakeDoc) -> Self {
        Self::with_windows(vec![FakeWindow {
            handle: "w1".to_string(),
            title: "Main".to_string(),
            doc,
        }])
    }

    pub fn with_windows(windows: Vec<FakeWindow>) -> Self {
        let current = windows.first().map(|w| w.handle.clone());
        Self {
            state: Mutex::new(State {
                windows,
                current,
                ..Default::default()
            }),
        }
    }

    pub fn close_window(&self, handle: &str) {
        let mut state = self.state.lock();
        state.windows.retain(|w| w.handle != handle);
        if state.current.as_deref() == Some(handle) {
            state.current = None;
        }
    }

    /// Replace the document of the current window
    pub fn load(&self, doc: FakeDoc) {
        let mut state = self.state.lock();
        state.context.clear();
        if let Ok(window) = state.window_mut() {
            window.doc = doc;
        }
    }

    pub fn stale_once(&self, selector: &str) {
        self.state.lock().stale_once.insert(selector.to_string());
    }

    pub fn fail_selector(&self, selector: &str, fault: DriverFault) {
        self.state
            .lock()
            .failing
            .insert(selector.to_string(), fault);
    }

    pub fn slow_selector(&self, selector: &str, delay: Duration) {
        self.state.lock().slow.insert(selector.to_string(), delay);
    }

    pub fn crash(&self) {
        self.state.lock().crashed = true;
    }

    /// Frame index path of the current browsing context
    pub fn context(&self) -> Vec<u16> {
        self.state.lock().context.clone()
    }

    pub fn current_handle(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    /// Number of frame listings performed so far
    pub fn listings(&self) -> usize {
        self.state.lock().listings
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    /// `include_attributes` flag of every describe call, in order
    pub fn describe_calls(&self) -> Vec<bool> {
        self.state.lock().describe_calls.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    pub fn picker_active_contexts(&self) -> usize {
        fn count(doc: &FakeDoc) -> usize {
            usize::from(doc.picker_active) + doc.frames.iter().map(|f| count(&f.doc)).sum::<usize>()
        }
        let state = self.state.lock();
        state.windows.iter().map(|w| count(&w.doc)).sum()
    }

    async fn delay_for(&self, selector: &str) {
        let delay = self.state.lock().slow.get(selector).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lookup(&self, locator: &Locator) -> Result<Vec<ElementInfo>, DriverFault> {
        let mut state = self.state.lock();
        let selector = locator.value().to_string();
        if let Some(fault) = state.failing.get(&selector) {
            return Err(fault.clone());
        }
        if state.stale_once.remove(&selector) {
            return Err(DriverFault::StaleReference(selector));
        }
        let doc = state.doc()?;
        Ok(doc.elements.get(&selector).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverFault> {
        let mut state = self.state.lock();
        state.check()?;
        state.context.clear();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<usize, DriverFault> {
        self.delay_for(locator.value()).await;
        Ok(self.lookup(locator)?.len())
    }

    async fn execute_script(&self, script: &str, _args: Vec<Value>) -> Result<Value, DriverFault> {
        let mut state = self.state.lock();
        state.scripts.push(script.to_string());
        let doc = state.doc_mut()?;

        if script.contains("return window.__pickerResult") {
            Ok(doc.picker_result.clone().unwrap_or(Value::Null))
        } else if script.contains("return !!window.__pickerActive") {
            Ok(Value::Bool(doc.picker_active))
        } else if script.contains("return !!window.__pickerLocked") {
            Ok(Value::Bool(false))
        } else if script.contains("__pickerCleanup") {
            doc.picker_active = false;
            doc.picker_result = None;
            Ok(Value::Bool(true))
        } else {
            doc.picker_active = true;
            Ok(Value::Null)
        }
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverFault> {
        let state = self.state.lock();
        if state.crashed {
            return Err(DriverFault::Session("browser crashed".to_string()));
        }
        Ok(state.windows.iter().map(|w| w.handle.clone()).collect())
    }

    async fn current_window(&self) -> Result<String, DriverFault> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.current.clone().unwrap_or_default())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverFault> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(DriverFault::Session("browser crashed".to_string()));
        }
        if !state.windows.iter().any(|w| w.handle == handle) {
            return Err(DriverFault::NoSuchWindow(handle.to_string()));
        }
        state.current = Some(handle.to_string());
        state.context.clear();
        Ok(())
    }

    async fn switch_to_default(&self) -> Result<(), DriverFault> {
        let mut state = self.state.lock();
        state.check()?;
        state.context.clear();
        Ok(())
    }

    async fn switch_to_frame(&self, index: u16) -> Result<(), DriverFault> {
        let mut state = self.state.lock();
        let doc = state.doc()?;
        if doc.frames.get(index as usize).is_none() {
            return Err(DriverFault::NoSuchFrame(format!("index {}", index)));
        }
        state.context.push(index);
        Ok(())
    }

    async fn title(&self) -> Result<String, DriverFault> {
        let mut state = self.state.lock();
        Ok(state.window_mut()?.title.clone())
    }

    async fn frame_descriptors(&self) -> Result<Vec<FrameDescriptor>, DriverFault> {
        let mut state = self.state.lock();
        state.listings += 1;
        let doc = state.doc()?;
        if doc.unreadable {
            return Err(DriverFault::NoSuchFrame("permission denied".to_string()));
        }
        Ok(doc
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| FrameDescriptor {
                index: index as u16,
                id: frame.id.clone(),
                name: frame.name.clone(),
            })
            .collect())
    }

    async fn describe_element(
        &self,
        locator: &Locator,
        include_attributes: bool,
    ) -> Result<Option<ElementInfo>, DriverFault> {
        self.delay_for(locator.value()).await;
        self.state.lock().describe_calls.push(include_attributes);
        let matches = self.lookup(locator)?;
        let count = matches.len();
        Ok(matches.into_iter().next().map(|mut info| {
            info.match_count = count;
            if !include_attributes {
                info.attributes.clear();
            }
            info
        }))
    }
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        max_frame_depth: 5,
        frame_cache_ttl: Duration::from_secs(60),
        lookup_timeout: Duration::from_millis(200),
        session_end_timeout: Duration::from_millis(200),
    }
}

pub fn browser_with(driver: Arc<FakeDriver>, settings: SessionSettings) -> BrowserSession {
    BrowserSession::new(driver, settings, Arc::new(PerfRegistry::default()))
}

pub fn browser(driver: Arc<FakeDriver>) -> BrowserSession {
    browser_with(driver, fast_settings())
}

/// Page with a login button at the top, a seat map two frames deep and a
/// footer frame
///
/// ```text
/// main            //*[@id="login"]
/// ├── ifrmSeat
/// │   └── ifrmSeatDetail   //*[@id="seat-12"]
/// └── footer      //a[@class="help"]
/// ```
pub fn ticket_page() -> FakeDoc {
    let detail = FakeDoc::new().with_element(
        r#"//*[@id="seat-12"]"#,
        element("div", "seat-12", "seat free", "A-12"),
    );
    let seat = FakeDoc::new().with_frame("ifrmSeatDetail", detail);
    let footer = FakeDoc::new().with_element(
        r#"//a[@class="help"]"#,
        element("a", "", "help", "Help"),
    );

    FakeDoc::new()
        .with_element(
            r#"//*[@id="login"]"#,
            element("button", "login", "btn primary", "Log in"),
        )
        .with_frame("ifrmSeat", seat)
        .with_frame("footer", footer)
}
