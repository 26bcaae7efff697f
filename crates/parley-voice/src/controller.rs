//! Recognition session controller.
//!
//! One controller task owns all session state. Commands from
//! [`VoiceInputHandle`], engine events, timer expiries and permission results
//! arrive on a single queue and are handled one at a time, so no handler
//! ever races another.
//!
//! Every asynchronous continuation (permission result, restart delay) is
//! tagged with the generation that issued it and dropped if a later stop or
//! start has moved the generation on.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;

use parley_core::config::{VoiceConfig, DEFAULT_LANGUAGE};
use parley_core::error::{ParleyError, Result as ParleyResult};
use parley_core::events::VoiceEvent;
use parley_core::types::{Platform, SessionId, StopReason, Timestamp};

use crate::engine::{
    Capability, CapabilityKind, EngineErrorCode, EngineEvent, EngineEventSink, EngineSettings,
    HostEnvironment, RecognitionResult,
};
use crate::error::{EngineOperation, VoiceError};
use crate::messages;
use crate::state::{RecognitionState, StateMachine};
use crate::surface::{NoticeId, PermissionDenial, PermissionGate, Surfaces};
use crate::transcript::TranscriptBuffer;

const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Queue messages
// =============================================================================

#[derive(Debug)]
pub(crate) enum Input {
    Command(Command),
    Engine(EngineEvent),
    Permission {
        generation: u64,
        purpose: PermissionPurpose,
        outcome: Result<(), PermissionDenial>,
    },
    Timer(Timer),
}

#[derive(Debug)]
pub(crate) enum Command {
    Initialize,
    Start,
    Stop,
    Toggle,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PermissionPurpose {
    /// Eager request made during initialization to surface the consent prompt.
    Probe,
    /// Request gating an engine start. `resume` keeps the open session.
    Start { resume: bool },
}

#[derive(Debug)]
pub(crate) enum Timer {
    Restart { generation: u64, resume: bool },
    Watchdog { session_id: SessionId },
    HighlightOff,
    Alert(&'static str),
    NoticeExpired(NoticeId),
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of the controller, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: RecognitionState,
    /// The engine is capturing.
    pub active: bool,
    /// The user asked to record and has not stopped yet.
    pub wants_recording: bool,
    pub accumulated_text: String,
    pub session_id: Option<SessionId>,
    pub capability: Option<CapabilityKind>,
    /// Settings applied to the engine, or the configured ones before
    /// initialization.
    pub settings: EngineSettings,
    pub platform: Platform,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable front end to a running controller.
///
/// Operations are fire-and-forget: failures are announced to the user by the
/// controller, never returned. The only error is `ShuttingDown`, when the
/// controller task is gone.
#[derive(Debug, Clone)]
pub struct VoiceInputHandle {
    tx: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<VoiceEvent>,
}

impl VoiceInputHandle {
    pub fn initialize(&self) -> ParleyResult<()> {
        self.send(Command::Initialize)
    }

    pub fn start(&self) -> ParleyResult<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> ParleyResult<()> {
        self.send(Command::Stop)
    }

    /// The single user-facing control: stop if recording, start otherwise.
    pub fn toggle(&self) -> ParleyResult<()> {
        self.send(Command::Toggle)
    }

    pub async fn snapshot(&self) -> ParleyResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| ParleyError::ShuttingDown)
    }

    /// Stop any session and end the controller task.
    pub async fn shutdown(&self) -> ParleyResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Shutdown(ack))?;
        rx.await.map_err(|_| ParleyError::ShuttingDown)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> ParleyResult<()> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| ParleyError::ShuttingDown)
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Owns one recognition capability and the state of its capture session.
pub struct RecognitionSessionController {
    config: VoiceConfig,
    host: Arc<dyn HostEnvironment>,
    permissions: Arc<dyn PermissionGate>,
    surfaces: Surfaces,
    platform: Platform,
    capability: Option<Capability>,
    settings: EngineSettings,
    state: StateMachine,
    active: bool,
    wants_recording: bool,
    generation: u64,
    session_id: Option<SessionId>,
    transcript: TranscriptBuffer,
    watchdog: Option<AbortHandle>,
    restart: Option<AbortHandle>,
    highlight: Option<AbortHandle>,
    queue: mpsc::WeakUnboundedSender<Input>,
    events: broadcast::Sender<VoiceEvent>,
}

impl RecognitionSessionController {
    /// Spawn a controller task and return its handle.
    ///
    /// The controller starts uninitialized; call `initialize` (or just
    /// `start`, which initializes on demand). Must be called inside a Tokio
    /// runtime.
    pub fn spawn(
        config: VoiceConfig,
        host: Arc<dyn HostEnvironment>,
        permissions: Arc<dyn PermissionGate>,
        surfaces: Surfaces,
    ) -> VoiceInputHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let platform = Platform::from_user_agent(&host.user_agent());

        let controller = Self {
            settings: EngineSettings::from_config(&config),
            config,
            host,
            permissions,
            surfaces,
            platform,
            capability: None,
            state: StateMachine::new(),
            active: false,
            wants_recording: false,
            generation: 0,
            session_id: None,
            transcript: TranscriptBuffer::new(),
            watchdog: None,
            restart: None,
            highlight: None,
            queue: tx.downgrade(),
            events: events.clone(),
        };
        tokio::spawn(controller.run(rx));

        VoiceInputHandle { tx, events }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        tracing::debug!(platform = %self.platform, "Voice input controller running");
        while let Some(input) = rx.recv().await {
            if self.dispatch(input).is_break() {
                break;
            }
        }
        cancel(&mut self.watchdog);
        cancel(&mut self.restart);
        cancel(&mut self.highlight);
        tracing::debug!("Voice input controller stopped");
    }

    fn dispatch(&mut self, input: Input) -> ControlFlow<()> {
        let result = match input {
            Input::Command(Command::Initialize) => self.initialize(),
            Input::Command(Command::Start) => self.start(),
            Input::Command(Command::Stop) => {
                self.stop(StopReason::User);
                Ok(())
            }
            Input::Command(Command::Toggle) => self.toggle(),
            Input::Command(Command::Snapshot(reply)) => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            Input::Command(Command::Shutdown(ack)) => {
                self.stop(StopReason::Shutdown);
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
            Input::Engine(event) => {
                self.on_engine_event(event);
                Ok(())
            }
            Input::Permission {
                generation,
                purpose,
                outcome,
            } => self.on_permission(generation, purpose, outcome),
            Input::Timer(timer) => {
                self.on_timer(timer);
                Ok(())
            }
        };

        if let Err(err) = result {
            self.report(&err);
        }
        ControlFlow::Continue(())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    fn initialize(&mut self) -> Result<(), VoiceError> {
        if self.session_id.is_some() || self.active {
            self.stop(StopReason::Superseded);
        }
        self.capability = None;

        let Some(mut capability) = Capability::detect(self.host.as_ref()) else {
            self.enter(RecognitionState::Uninitialized);
            self.publish(VoiceEvent::Unsupported {
                timestamp: Timestamp::now(),
            });
            return Err(VoiceError::UnsupportedEnvironment);
        };

        let settings = EngineSettings::from_config(&self.config);
        let engine = capability.engine_mut();
        if let Err(err) = engine.configure(&settings) {
            self.enter(RecognitionState::Uninitialized);
            return Err(as_fault(EngineOperation::Configure, err));
        }
        engine.subscribe(EngineEventSink::new(self.queue.clone()));

        let kind = capability.kind();
        self.settings = settings;
        self.capability = Some(capability);
        self.enter(RecognitionState::Idle);

        tracing::info!(
            capability = %kind,
            language = %self.settings.language,
            platform = %self.platform,
            "Speech recognition initialized"
        );
        self.publish(VoiceEvent::Initialized {
            capability: kind.to_string(),
            language: self.settings.language.clone(),
            timestamp: Timestamp::now(),
        });

        self.request_permission(PermissionPurpose::Probe, self.generation);
        Ok(())
    }

    fn toggle(&mut self) -> Result<(), VoiceError> {
        if self.active || self.wants_recording {
            self.stop(StopReason::User);
            Ok(())
        } else {
            self.start()
        }
    }

    fn start(&mut self) -> Result<(), VoiceError> {
        if self.capability.is_none() {
            if let Err(err) = self.initialize() {
                tracing::debug!(error = %err, "Initialization before start failed");
                return Err(VoiceError::EngineUnavailable);
            }
        }

        let restarting = self.active;
        if restarting {
            tracing::debug!("Session already active, restarting engine");
            self.stop_engine();
        }
        if self.active || self.session_id.is_some() {
            self.finish_session(StopReason::Superseded);
        }

        self.transcript.reset();
        self.wants_recording = true;
        self.generation += 1;
        let generation = self.generation;
        cancel(&mut self.restart);

        if restarting {
            self.restart = Some(self.schedule(
                self.config.restart_delay(),
                Timer::Restart {
                    generation,
                    resume: false,
                },
            ));
        } else {
            self.request_permission(PermissionPurpose::Start { resume: false }, generation);
        }
        Ok(())
    }

    fn stop(&mut self, reason: StopReason) {
        let pending = self.wants_recording && !self.active;
        self.wants_recording = false;
        self.generation += 1;
        cancel(&mut self.restart);

        if self.active {
            self.stop_engine();
        }
        if self.active || self.session_id.is_some() {
            self.finish_session(reason);
        } else if pending {
            tracing::debug!("Cancelled pending recognition start");
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.current(),
            active: self.active,
            wants_recording: self.wants_recording,
            accumulated_text: self.transcript.as_str().to_string(),
            session_id: self.session_id,
            capability: self.capability.as_ref().map(Capability::kind),
            settings: self
                .capability
                .as_ref()
                .and_then(|capability| capability.engine().settings())
                .unwrap_or_else(|| self.settings.clone()),
            platform: self.platform,
        }
    }

    // -------------------------------------------------------------------------
    // Session plumbing
    // -------------------------------------------------------------------------

    fn on_permission(
        &mut self,
        generation: u64,
        purpose: PermissionPurpose,
        outcome: Result<(), PermissionDenial>,
    ) -> Result<(), VoiceError> {
        let resume = match purpose {
            PermissionPurpose::Probe => {
                match outcome {
                    Ok(()) => tracing::info!("Microphone permission granted during init"),
                    Err(denial) => {
                        tracing::error!(
                            reason = %denial,
                            "Microphone permission denied during init"
                        );
                        self.surfaces.feedback.alert(messages::PROBE_PERMISSION_ALERT);
                    }
                }
                return Ok(());
            }
            PermissionPurpose::Start { resume } => resume,
        };

        if generation != self.generation || !self.wants_recording {
            tracing::debug!(
                generation,
                current = self.generation,
                "Discarding stale permission result"
            );
            return Ok(());
        }

        match outcome {
            Ok(()) => self.begin_capture(resume),
            Err(denial) => {
                self.wants_recording = false;
                if self.session_id.is_some() {
                    self.finish_session(StopReason::Error);
                }
                self.publish(VoiceEvent::PermissionDenied {
                    reason: denial.reason.clone(),
                    timestamp: Timestamp::now(),
                });
                Err(VoiceError::PermissionDenied {
                    reason: denial.reason,
                })
            }
        }
    }

    fn begin_capture(&mut self, resume: bool) -> Result<(), VoiceError> {
        let mobile = self.platform.is_mobile();
        if mobile && self.active {
            tracing::debug!("Already recognizing, skipping start");
            return Ok(());
        }
        if mobile {
            self.settings.continuous = false;
            self.settings.interim_results = true;
        }

        let result = match self.capability.as_mut() {
            Some(capability) => {
                let engine = capability.engine_mut();
                let configured = if mobile {
                    engine.configure(&self.settings)
                } else {
                    Ok(())
                };
                configured.and_then(|()| engine.start())
            }
            None => {
                self.wants_recording = false;
                return Err(VoiceError::EngineUnavailable);
            }
        };
        if let Err(err) = result {
            self.wants_recording = false;
            if self.session_id.is_some() {
                self.finish_session(StopReason::Error);
            }
            return Err(as_fault(EngineOperation::Start, err));
        }

        let session_id = match self.session_id {
            Some(session_id) if resume => session_id,
            _ => {
                let session_id = SessionId::new();
                self.session_id = Some(session_id);
                let field = &self.surfaces.field;
                field.set_recording(true);
                field.set_placeholder(messages::LISTENING_PLACEHOLDER);
                field.set_value("");
                self.surfaces.feedback.show(messages::LISTENING_FEEDBACK);
                self.publish(VoiceEvent::SessionStarted {
                    session_id,
                    platform: self.platform,
                    timestamp: Timestamp::now(),
                });
                session_id
            }
        };
        self.mark_active();

        if self.watchdog.is_none() {
            self.watchdog = Some(self.schedule(
                self.config.max_duration(),
                Timer::Watchdog { session_id },
            ));
        }

        tracing::info!(
            session_id = %session_id,
            resume,
            continuous = self.settings.continuous,
            "Recognition started"
        );
        Ok(())
    }

    fn finish_session(&mut self, reason: StopReason) {
        cancel(&mut self.watchdog);

        let field = &self.surfaces.field;
        field.set_recording(false);
        field.set_placeholder(messages::STOPPED_PLACEHOLDER);
        let text = self.transcript.committed();
        if !text.is_empty() {
            field.set_value(&text);
        }

        self.active = false;
        self.enter(RecognitionState::Idle);

        let session_id = self.session_id.take();
        tracing::info!(
            session_id = ?session_id,
            reason = ?reason,
            chars = text.len(),
            "Recognition session stopped"
        );
        self.publish(VoiceEvent::SessionStopped {
            session_id,
            reason,
            text,
            timestamp: Timestamp::now(),
        });
    }

    fn stop_engine(&mut self) {
        if let Some(capability) = self.capability.as_mut() {
            if let Err(err) = capability.engine_mut().stop() {
                tracing::error!(error = %err, "Error stopping speech recognition");
            }
        }
    }

    fn mark_active(&mut self) {
        if !self.active {
            self.active = true;
            self.enter(RecognitionState::Active);
        }
    }

    // -------------------------------------------------------------------------
    // Engine events
    // -------------------------------------------------------------------------

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started => self.on_started(),
            EngineEvent::Result {
                results,
                result_index,
            } => self.on_result(&results, result_index),
            EngineEvent::Error { code } => self.on_error(code),
            EngineEvent::Ended => self.on_ended(),
        }
    }

    fn on_started(&mut self) {
        if self.wants_recording && self.session_id.is_some() {
            tracing::debug!("Recognition started");
            self.mark_active();
        } else {
            tracing::debug!("Ignoring start event for a session that is no longer wanted");
        }
    }

    fn on_result(&mut self, results: &[RecognitionResult], result_index: usize) {
        if self.session_id.is_none() {
            tracing::debug!("Ignoring recognition result outside a session");
            return;
        }
        let mut saw_final = false;

        for (index, result) in results.iter().enumerate().skip(result_index) {
            let Some(top) = result.top() else {
                tracing::debug!(index, "Result entry without alternatives");
                continue;
            };

            let text = if result.is_final {
                saw_final = true;
                self.transcript.commit(&top.transcript).to_string()
            } else {
                self.transcript.preview(&top.transcript)
            };
            self.surfaces.field.set_value(&text);
            self.publish(VoiceEvent::TranscriptUpdated {
                session_id: self.session_id,
                text,
                is_final: result.is_final,
                timestamp: Timestamp::now(),
            });
        }

        if saw_final {
            self.surfaces.field.set_highlight(true);
            cancel(&mut self.highlight);
            self.highlight = Some(self.schedule(self.config.highlight(), Timer::HighlightOff));
        }
    }

    fn on_error(&mut self, code: EngineErrorCode) {
        let err = VoiceError::Engine { code: code.clone() };
        tracing::error!(error = %err, platform = %self.platform, "Recognition error");

        let message = messages::error_message(&code, self.platform);
        match code {
            EngineErrorCode::NotAllowed => {
                if let Some(help) = messages::permission_help(self.platform) {
                    self.schedule(self.config.alert_delay(), Timer::Alert(help));
                }
            }
            EngineErrorCode::LanguageNotSupported => {
                self.settings.language = DEFAULT_LANGUAGE.to_string();
                if let Some(capability) = self.capability.as_mut() {
                    if let Err(err) = capability.engine_mut().configure(&self.settings) {
                        tracing::warn!(error = %err, "Failed to switch recognition language");
                    }
                }
            }
            _ => {}
        }

        self.surfaces.notify(message);
        self.enter(RecognitionState::Errored);

        self.active = false;
        self.wants_recording = false;
        self.generation += 1;
        cancel(&mut self.restart);
        cancel(&mut self.watchdog);

        let field = &self.surfaces.field;
        field.set_recording(false);
        if self.transcript.is_empty() {
            field.set_value("");
        }

        if self.platform.is_mobile() {
            let notice = self.surfaces.notices.append(message);
            self.schedule(self.config.notice_ttl(), Timer::NoticeExpired(notice));
        }

        if let Some(session_id) = self.session_id.take() {
            self.publish(VoiceEvent::SessionStopped {
                session_id: Some(session_id),
                reason: StopReason::Error,
                text: self.transcript.committed(),
                timestamp: Timestamp::now(),
            });
        }
        self.publish(VoiceEvent::RecognitionFailed {
            code: code.to_string(),
            message: message.to_string(),
            timestamp: Timestamp::now(),
        });
        self.state.reset();
    }

    fn on_ended(&mut self) {
        if !self.active {
            tracing::debug!("Recognition ended");
            return;
        }

        if self.wants_recording && self.config.auto_restart_on_unexpected_end {
            tracing::info!("Recognition ended unexpectedly, restarting");
            self.active = false;
            self.enter(RecognitionState::Idle);
            self.generation += 1;
            let generation = self.generation;
            self.restart = Some(self.schedule(
                self.config.restart_delay(),
                Timer::Restart {
                    generation,
                    resume: true,
                },
            ));
            return;
        }

        tracing::info!("Recognition ended by the engine");
        self.wants_recording = false;
        self.finish_session(StopReason::EngineEnded);
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Restart { generation, resume } => {
                if generation == self.generation && self.wants_recording {
                    self.restart = None;
                    self.request_permission(PermissionPurpose::Start { resume }, generation);
                } else {
                    tracing::debug!(generation, "Ignoring stale restart timer");
                }
            }
            Timer::Watchdog { session_id } => {
                if self.session_id == Some(session_id) {
                    self.watchdog = None;
                    tracing::info!(
                        session_id = %session_id,
                        max_duration_ms = self.config.max_duration_ms,
                        "Maximum recognition duration reached"
                    );
                    self.stop(StopReason::Watchdog);
                    self.surfaces.announcer.speak(messages::AUTO_STOPPED);
                }
            }
            Timer::HighlightOff => {
                self.highlight = None;
                self.surfaces.field.set_highlight(false);
            }
            Timer::Alert(text) => self.surfaces.feedback.alert(text),
            Timer::NoticeExpired(notice) => self.surfaces.notices.remove(notice),
        }
    }

    fn schedule(&self, delay: Duration, timer: Timer) -> AbortHandle {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = queue.upgrade() {
                let _ = tx.send(Input::Timer(timer));
            }
        })
        .abort_handle()
    }

    fn request_permission(&self, purpose: PermissionPurpose, generation: u64) {
        let gate = Arc::clone(&self.permissions);
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let outcome = gate.request_microphone().await;
            if let Some(tx) = queue.upgrade() {
                let _ = tx.send(Input::Permission {
                    generation,
                    purpose,
                    outcome,
                });
            }
        });
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    fn report(&self, err: &VoiceError) {
        tracing::warn!(error = %err, "Voice input failure");
        let surfaces = &self.surfaces;
        match err {
            VoiceError::UnsupportedEnvironment => surfaces.notify(messages::UNSUPPORTED),
            VoiceError::EngineUnavailable => {
                surfaces.announcer.speak(messages::UNAVAILABLE_SPOKEN);
                surfaces.feedback.show(messages::UNAVAILABLE_FEEDBACK);
            }
            VoiceError::PermissionDenied { .. } => {
                surfaces.announcer.speak(messages::PERMISSION_DENIED_SPOKEN);
                surfaces.feedback.show(messages::PERMISSION_DENIED_FEEDBACK);
                if self.platform.is_mobile() {
                    surfaces.feedback.alert(messages::PERMISSION_DENIED_MOBILE_ALERT);
                }
            }
            VoiceError::EngineFault {
                operation: EngineOperation::Configure,
                ..
            } => surfaces.notify(messages::INIT_FAILED),
            VoiceError::EngineFault {
                operation: EngineOperation::Start,
                ..
            } => surfaces.notify(messages::START_FAILED),
            VoiceError::EngineFault {
                operation: EngineOperation::Stop,
                ..
            }
            | VoiceError::Engine { .. }
            | VoiceError::InvalidTransition { .. } => {}
        }
    }

    fn enter(&mut self, target: RecognitionState) {
        if self.state.current() == target {
            return;
        }
        if let Err(err) = self.state.transition(target) {
            tracing::warn!(error = %err, "Unexpected state transition");
        }
    }

    fn publish(&self, event: VoiceEvent) {
        tracing::trace!(event = event.event_name(), "Publishing voice event");
        let _ = self.events.send(event);
    }
}

fn cancel(slot: &mut Option<AbortHandle>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

/// Attribute an engine failure to the primitive that was being invoked.
fn as_fault(operation: EngineOperation, err: VoiceError) -> VoiceError {
    match err {
        VoiceError::EngineFault { message, .. } => VoiceError::EngineFault { operation, message },
        other => VoiceError::fault(operation, other.to_string()),
    }
}
