//! In-memory collaborators for tests and demos.
//!
//! Every mock is cheap to clone and shares its state between clones, so a
//! test can hand one copy to the controller and inspect another.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{
    EngineEvent, EngineEventSink, EngineSettings, HostEnvironment, RecognitionEngine,
};
use crate::error::{EngineOperation, VoiceError};
use crate::surface::{
    Announcer, Feedback, MessageField, NoticeBoard, NoticeId, PermissionDenial, PermissionGate,
};

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Default)]
struct EngineState {
    sink: Option<EngineEventSink>,
    settings: Vec<EngineSettings>,
    starts: usize,
    stops: usize,
    capturing: bool,
    fail_start: bool,
    fail_configure: bool,
    lifecycle: bool,
}

/// Scriptable recognition engine.
///
/// By default it emits nothing on its own: tests push events with
/// [`MockEngine::emit`]. With [`MockEngine::with_lifecycle`] it also emits
/// `Started` from `start` and `Ended` from `stop`, like a real engine.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifecycle() -> Self {
        let engine = Self::new();
        lock(&engine.state).lifecycle = true;
        engine
    }

    /// Push an event to the subscribed controller.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let sink = lock(&self.state).sink.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).starts
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.state).capturing
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state).sink.is_some()
    }

    /// Every settings value pushed through `configure`, oldest first.
    pub fn settings_history(&self) -> Vec<EngineSettings> {
        lock(&self.state).settings.clone()
    }

    pub fn last_settings(&self) -> Option<EngineSettings> {
        lock(&self.state).settings.last().cloned()
    }

    /// Make subsequent `configure` calls fail.
    pub fn set_fail_configure(&self, fail: bool) {
        lock(&self.state).fail_configure = fail;
    }

    /// Make subsequent `start` calls fail.
    pub fn set_fail_start(&self, fail: bool) {
        lock(&self.state).fail_start = fail;
    }
}

impl RecognitionEngine for MockEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), VoiceError> {
        let mut state = lock(&self.state);
        if state.fail_configure {
            return Err(VoiceError::fault(
                EngineOperation::Configure,
                "unsupported settings",
            ));
        }
        state.settings.push(settings.clone());
        Ok(())
    }

    fn settings(&self) -> Option<EngineSettings> {
        self.last_settings()
    }

    fn subscribe(&mut self, sink: EngineEventSink) {
        lock(&self.state).sink = Some(sink);
    }

    fn start(&mut self) -> Result<(), VoiceError> {
        let sink = {
            let mut state = lock(&self.state);
            if state.fail_start {
                return Err(VoiceError::fault(
                    EngineOperation::Start,
                    "recognition has already started",
                ));
            }
            state.starts += 1;
            state.capturing = true;
            state.lifecycle.then(|| state.sink.clone()).flatten()
        };
        tracing::debug!("Mock recognition engine started");
        if let Some(sink) = sink {
            sink.emit(EngineEvent::Started);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), VoiceError> {
        let sink = {
            let mut state = lock(&self.state);
            state.stops += 1;
            state.capturing = false;
            state.lifecycle.then(|| state.sink.clone()).flatten()
        };
        tracing::debug!("Mock recognition engine stopped");
        if let Some(sink) = sink {
            sink.emit(EngineEvent::Ended);
        }
        Ok(())
    }
}

// =============================================================================
// Host
// =============================================================================

/// Host exposing zero, one or both recognizer variants.
#[derive(Debug)]
pub struct MockHost {
    user_agent: String,
    standard: Option<MockEngine>,
    prefixed: Option<MockEngine>,
    available: AtomicBool,
}

impl MockHost {
    pub fn new(standard: Option<MockEngine>, prefixed: Option<MockEngine>) -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT.to_string(),
            standard,
            prefixed,
            available: AtomicBool::new(true),
        }
    }

    /// A host with no recognizer at all.
    pub fn unsupported() -> Self {
        Self::new(None, None)
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Hide or expose both recognizers, e.g. to simulate a revoked capability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn offer(&self, engine: &Option<MockEngine>) -> Option<Box<dyn RecognitionEngine>> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        engine
            .clone()
            .map(|engine| Box::new(engine) as Box<dyn RecognitionEngine>)
    }
}

impl HostEnvironment for MockHost {
    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn standard_recognizer(&self) -> Option<Box<dyn RecognitionEngine>> {
        self.offer(&self.standard)
    }

    fn prefixed_recognizer(&self) -> Option<Box<dyn RecognitionEngine>> {
        self.offer(&self.prefixed)
    }
}

// =============================================================================
// Permission gate
// =============================================================================

/// Permission gate with a fixed answer and an optional response delay.
#[derive(Debug, Clone)]
pub struct MockPermissionGate {
    granted: Arc<AtomicBool>,
    delay: Duration,
    requests: Arc<AtomicUsize>,
}

impl MockPermissionGate {
    pub fn granted() -> Self {
        Self {
            granted: Arc::new(AtomicBool::new(true)),
            delay: Duration::ZERO,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denied() -> Self {
        let gate = Self::granted();
        gate.set_granted(false);
        gate
    }

    /// Answer every request only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGate for MockPermissionGate {
    async fn request_microphone(&self) -> Result<(), PermissionDenial> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.granted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PermissionDenial {
                reason: "NotAllowedError".to_string(),
            })
        }
    }
}

// =============================================================================
// Surfaces
// =============================================================================

#[derive(Debug, Default)]
struct SurfaceLog {
    values: Vec<String>,
    placeholder: Option<String>,
    recording: bool,
    highlighted: bool,
    highlight_changes: usize,
    spoken: Vec<String>,
    shown: Vec<String>,
    alerts: Vec<String>,
    notices: Vec<(NoticeId, String)>,
}

/// Records everything the controller does to the UI.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    log: Mutex<SurfaceLog>,
    next_notice: AtomicU64,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current field value.
    pub fn value(&self) -> String {
        lock(&self.log).values.last().cloned().unwrap_or_default()
    }

    /// Every value written to the field, oldest first.
    pub fn values(&self) -> Vec<String> {
        lock(&self.log).values.clone()
    }

    pub fn placeholder(&self) -> Option<String> {
        lock(&self.log).placeholder.clone()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.log).recording
    }

    pub fn is_highlighted(&self) -> bool {
        lock(&self.log).highlighted
    }

    pub fn highlight_changes(&self) -> usize {
        lock(&self.log).highlight_changes
    }

    pub fn spoken(&self) -> Vec<String> {
        lock(&self.log).spoken.clone()
    }

    pub fn shown(&self) -> Vec<String> {
        lock(&self.log).shown.clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        lock(&self.log).alerts.clone()
    }

    /// Notices currently on screen.
    pub fn notices(&self) -> Vec<String> {
        lock(&self.log)
            .notices
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl MessageField for RecordingSurface {
    fn set_value(&self, value: &str) {
        lock(&self.log).values.push(value.to_string());
    }

    fn set_placeholder(&self, placeholder: &str) {
        lock(&self.log).placeholder = Some(placeholder.to_string());
    }

    fn set_recording(&self, recording: bool) {
        lock(&self.log).recording = recording;
    }

    fn set_highlight(&self, highlighted: bool) {
        let mut log = lock(&self.log);
        log.highlighted = highlighted;
        log.highlight_changes += 1;
    }
}

impl NoticeBoard for RecordingSurface {
    fn append(&self, text: &str) -> NoticeId {
        let id = NoticeId(self.next_notice.fetch_add(1, Ordering::SeqCst));
        lock(&self.log).notices.push((id, text.to_string()));
        id
    }

    fn remove(&self, id: NoticeId) {
        lock(&self.log).notices.retain(|(notice, _)| *notice != id);
    }
}

impl Announcer for RecordingSurface {
    fn speak(&self, text: &str) {
        lock(&self.log).spoken.push(text.to_string());
    }
}

impl Feedback for RecordingSurface {
    fn show(&self, text: &str) {
        lock(&self.log).shown.push(text.to_string());
    }

    fn alert(&self, text: &str) {
        lock(&self.log).alerts.push(text.to_string());
    }
}
