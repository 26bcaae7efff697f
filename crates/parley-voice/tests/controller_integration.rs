//! End-to-end tests driving the controller through its public handle.
//!
//! All tests run on a paused clock so timer deadlines can be checked to the
//! millisecond.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use parley_core::config::VoiceConfig;
use parley_core::error::ParleyError;
use parley_core::events::VoiceEvent;
use parley_core::types::{Platform, StopReason};
use parley_voice::messages;
use parley_voice::mock::{MockEngine, MockHost, MockPermissionGate, RecordingSurface};
use parley_voice::{
    CapabilityKind, EngineErrorCode, EngineEvent, RecognitionResult, RecognitionSessionController,
    RecognitionState, SessionSnapshot, Surfaces, VoiceInputHandle,
};

const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

/// Let the controller and its helper tasks drain their queues.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

fn drain(events: &mut broadcast::Receiver<VoiceEvent>) -> Vec<VoiceEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn stop_reasons(events: &[VoiceEvent]) -> Vec<StopReason> {
    events
        .iter()
        .filter_map(|event| match event {
            VoiceEvent::SessionStopped { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

struct Harness {
    handle: VoiceInputHandle,
    engine: MockEngine,
    host: Arc<MockHost>,
    gate: MockPermissionGate,
    surface: Arc<RecordingSurface>,
    events: broadcast::Receiver<VoiceEvent>,
}

impl Harness {
    fn desktop() -> Self {
        Self::build(VoiceConfig::default(), None, MockPermissionGate::granted())
    }

    fn mobile(user_agent: &str) -> Self {
        Self::build(
            VoiceConfig::default(),
            Some(user_agent),
            MockPermissionGate::granted(),
        )
    }

    fn build(config: VoiceConfig, user_agent: Option<&str>, gate: MockPermissionGate) -> Self {
        let engine = MockEngine::new();
        let mut host = MockHost::new(Some(engine.clone()), None);
        if let Some(user_agent) = user_agent {
            host = host.with_user_agent(user_agent);
        }
        let host = Arc::new(host);
        let surface = Arc::new(RecordingSurface::new());

        let handle = RecognitionSessionController::spawn(
            config,
            host.clone(),
            Arc::new(gate.clone()),
            Surfaces::shared(surface.clone()),
        );
        let events = handle.subscribe();

        Self {
            handle,
            engine,
            host,
            gate,
            surface,
            events,
        }
    }

    async fn start(&self) {
        self.handle.start().unwrap();
        settle().await;
    }

    async fn stop(&self) {
        self.handle.stop().unwrap();
        settle().await;
    }

    async fn emit(&self, event: EngineEvent) {
        assert!(self.engine.emit(event), "controller should be listening");
        settle().await;
    }

    async fn final_result(&self, text: &str) {
        self.emit(EngineEvent::Result {
            results: vec![RecognitionResult::final_text(text)],
            result_index: 0,
        })
        .await;
    }

    async fn interim_result(&self, text: &str) {
        self.emit(EngineEvent::Result {
            results: vec![RecognitionResult::interim(text)],
            result_index: 0,
        })
        .await;
    }

    async fn error(&self, code: EngineErrorCode) {
        self.emit(EngineEvent::Error { code }).await;
    }

    async fn snapshot(&self) -> SessionSnapshot {
        self.handle.snapshot().await.unwrap()
    }
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_selects_capability_and_configures_engine() {
    let mut h = Harness::desktop();
    h.handle.initialize().unwrap();
    settle().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert_eq!(snapshot.capability, Some(CapabilityKind::Standard));
    assert_eq!(snapshot.platform, Platform::Desktop);

    let settings = h.engine.last_settings().unwrap();
    assert!(settings.continuous);
    assert!(settings.interim_results);
    assert_eq!(settings.language, "en-US");
    assert_eq!(settings.max_alternatives, 3);
    assert!(h.engine.is_subscribed());

    // Eager permission probe.
    assert_eq!(h.gate.request_count(), 1);
    assert!(h.surface.alerts().is_empty());

    let events = drain(&mut h.events);
    assert!(matches!(events.as_slice(), [VoiceEvent::Initialized { .. }]));
}

#[tokio::test(start_paused = true)]
async fn test_initialize_falls_back_to_prefixed_recognizer() {
    let engine = MockEngine::new();
    let host = Arc::new(MockHost::new(None, Some(engine.clone())));
    let surface = Arc::new(RecordingSurface::new());
    let handle = RecognitionSessionController::spawn(
        VoiceConfig::default(),
        host,
        Arc::new(MockPermissionGate::granted()),
        Surfaces::shared(surface),
    );
    handle.initialize().unwrap();
    settle().await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.capability, Some(CapabilityKind::Prefixed));
    assert!(engine.is_subscribed());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_on_unsupported_host() {
    let mut h = Harness::desktop();
    h.host.set_available(false);
    h.handle.initialize().unwrap();
    settle().await;

    assert_eq!(h.snapshot().await.state, RecognitionState::Uninitialized);
    assert_eq!(h.surface.spoken(), vec![messages::UNSUPPORTED.to_string()]);
    assert_eq!(h.surface.shown(), vec![messages::UNSUPPORTED.to_string()]);
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [VoiceEvent::Unsupported { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_initialize_configure_failure() {
    let h = Harness::desktop();
    h.engine.set_fail_configure(true);
    h.handle.initialize().unwrap();
    settle().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Uninitialized);
    assert_eq!(snapshot.capability, None);
    assert_eq!(h.surface.spoken(), vec![messages::INIT_FAILED.to_string()]);
    assert_eq!(h.surface.shown(), vec![messages::INIT_FAILED.to_string()]);
    assert!(!h.engine.is_subscribed());
}

#[tokio::test(start_paused = true)]
async fn test_denied_probe_shows_alert() {
    let h = Harness::build(VoiceConfig::default(), None, MockPermissionGate::denied());
    h.handle.initialize().unwrap();
    settle().await;

    assert_eq!(
        h.surface.alerts(),
        vec![messages::PROBE_PERMISSION_ALERT.to_string()]
    );
    // Initialization still succeeds.
    assert_eq!(h.snapshot().await.state, RecognitionState::Idle);
}

// =============================================================================
// Dictation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_final_results_accumulate_and_capitalize() {
    let h = Harness::desktop();
    h.start().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Active);
    assert!(snapshot.active);
    assert!(h.engine.is_capturing());
    assert!(h.surface.is_recording());
    assert_eq!(
        h.surface.placeholder().as_deref(),
        Some(messages::LISTENING_PLACEHOLDER)
    );
    assert_eq!(h.surface.shown(), vec![messages::LISTENING_FEEDBACK.to_string()]);

    h.final_result("hello world").await;
    assert_eq!(h.surface.value(), "Hello world");

    h.emit(EngineEvent::Result {
        results: vec![
            RecognitionResult::final_text("hello world"),
            RecognitionResult::final_text("it is raining"),
        ],
        result_index: 1,
    })
    .await;
    assert_eq!(h.surface.value(), "Hello world it is raining");

    h.stop().await;
    assert_eq!(h.surface.value(), "Hello world it is raining");
    assert!(!h.surface.is_recording());
    assert_eq!(
        h.surface.placeholder().as_deref(),
        Some(messages::STOPPED_PLACEHOLDER)
    );
    assert_eq!(h.engine.stop_count(), 1);

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.active);
    assert_eq!(snapshot.session_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_interim_is_shown_but_not_committed() {
    let h = Harness::desktop();
    h.start().await;

    h.interim_result("how ar").await;
    assert_eq!(h.surface.value(), "how ar");
    assert_eq!(h.snapshot().await.accumulated_text, "");

    h.final_result("how are you").await;
    assert_eq!(h.surface.value(), "How are you");
    assert_eq!(h.snapshot().await.accumulated_text, "How are you");

    h.interim_result("doi").await;
    assert_eq!(h.surface.value(), "How are you doi");
}

#[tokio::test(start_paused = true)]
async fn test_mixed_final_and_interim_in_one_event() {
    let h = Harness::desktop();
    h.start().await;

    h.emit(EngineEvent::Result {
        results: vec![
            RecognitionResult::final_text("hello world"),
            RecognitionResult::interim("how ar"),
        ],
        result_index: 0,
    })
    .await;
    assert_eq!(h.surface.value(), "Hello world how ar");
    assert_eq!(h.snapshot().await.accumulated_text, "Hello world");
    assert!(h.surface.is_highlighted());

    h.emit(EngineEvent::Result {
        results: vec![
            RecognitionResult::interim("how"),
            RecognitionResult::interim("how are"),
        ],
        result_index: 0,
    })
    .await;
    assert_eq!(h.surface.value(), "Hello world how are");
    assert_eq!(h.snapshot().await.accumulated_text, "Hello world");
}

#[tokio::test(start_paused = true)]
async fn test_entries_without_alternatives_are_skipped() {
    let h = Harness::desktop();
    h.start().await;

    h.emit(EngineEvent::Result {
        results: vec![
            RecognitionResult {
                is_final: true,
                alternatives: vec![],
            },
            RecognitionResult::final_text("still here"),
        ],
        result_index: 0,
    })
    .await;
    assert_eq!(h.surface.value(), "Still here");
}

#[tokio::test(start_paused = true)]
async fn test_sentence_boundaries_are_capitalized_across_fragments() {
    let h = Harness::desktop();
    h.start().await;

    h.final_result("it is late.").await;
    h.final_result("see you tomorrow").await;
    assert_eq!(h.surface.value(), "It is late. See you tomorrow");
}

#[tokio::test(start_paused = true)]
async fn test_start_resets_accumulated_text() {
    let h = Harness::desktop();
    h.start().await;
    h.final_result("first message").await;
    h.stop().await;
    assert_eq!(h.surface.value(), "First message");

    h.start().await;
    assert_eq!(h.snapshot().await.accumulated_text, "");
    assert_eq!(h.surface.value(), "");

    h.final_result("second").await;
    assert_eq!(h.surface.value(), "Second");
}

#[tokio::test(start_paused = true)]
async fn test_results_after_stop_are_ignored() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("hello there").await;
    h.stop().await;
    assert_eq!(h.surface.value(), "Hello there");
    drain(&mut h.events);

    h.interim_result("ghost").await;
    assert_eq!(h.surface.value(), "Hello there");
    h.final_result("late words").await;
    assert_eq!(h.surface.value(), "Hello there");
    assert_eq!(h.snapshot().await.accumulated_text, "Hello there");

    let events = drain(&mut h.events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, VoiceEvent::TranscriptUpdated { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_inactive_is_noop() {
    let mut h = Harness::desktop();
    h.handle.initialize().unwrap();
    settle().await;
    drain(&mut h.events);

    h.stop().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert_eq!(h.engine.stop_count(), 0);
    assert!(h.surface.values().is_empty());
    assert!(h.surface.placeholder().is_none());
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_twice() {
    let h = Harness::desktop();

    h.handle.toggle().unwrap();
    settle().await;
    assert_eq!(h.snapshot().await.state, RecognitionState::Active);
    assert_eq!(h.engine.start_count(), 1);

    h.handle.toggle().unwrap();
    settle().await;
    assert_eq!(h.snapshot().await.state, RecognitionState::Idle);
    assert_eq!(h.engine.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_events() {
    let mut h = Harness::desktop();
    h.start().await;
    h.interim_result("hel").await;
    h.final_result("hello").await;
    h.stop().await;

    let events = drain(&mut h.events);
    let names: Vec<&str> = events.iter().map(VoiceEvent::event_name).collect();
    assert_eq!(
        names,
        vec![
            "initialized",
            "session_started",
            "transcript_updated",
            "transcript_updated",
            "session_stopped",
        ]
    );

    let started_id = match &events[1] {
        VoiceEvent::SessionStarted { session_id, .. } => *session_id,
        other => panic!("Expected SessionStarted, got {other:?}"),
    };
    match &events[4] {
        VoiceEvent::SessionStopped {
            session_id,
            reason,
            text,
            ..
        } => {
            assert_eq!(*session_id, Some(started_id));
            assert_eq!(*reason, StopReason::User);
            assert_eq!(text, "Hello");
        }
        other => panic!("Expected SessionStopped, got {other:?}"),
    }
}

// =============================================================================
// Timers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_watchdog_stops_after_max_duration() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("almost done").await;

    advance_ms(29_999).await;
    assert!(h.snapshot().await.active);
    assert!(h.surface.spoken().is_empty());

    advance_ms(1).await;
    let snapshot = h.snapshot().await;
    assert!(!snapshot.active);
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert_eq!(h.engine.stop_count(), 1);
    assert_eq!(h.surface.spoken(), vec![messages::AUTO_STOPPED.to_string()]);
    assert_eq!(h.surface.value(), "Almost done");
    assert_eq!(stop_reasons(&drain(&mut h.events)), vec![StopReason::Watchdog]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_watchdog() {
    let h = Harness::desktop();
    h.start().await;
    advance_ms(10_000).await;
    h.stop().await;

    advance_ms(30_000).await;
    assert_eq!(h.engine.stop_count(), 1);
    assert!(!h.surface.spoken().contains(&messages::AUTO_STOPPED.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_honours_configured_duration() {
    let config = VoiceConfig {
        max_duration_ms: 5_000,
        ..VoiceConfig::default()
    };
    let h = Harness::build(config, None, MockPermissionGate::granted());
    h.start().await;

    advance_ms(4_999).await;
    assert!(h.snapshot().await.active);
    advance_ms(1).await;
    assert!(!h.snapshot().await.active);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_restarts_after_delay() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("old text").await;

    h.start().await;
    let snapshot = h.snapshot().await;
    assert!(!snapshot.active);
    assert!(snapshot.wants_recording);
    assert_eq!(snapshot.accumulated_text, "");
    assert_eq!(h.engine.stop_count(), 1);
    assert_eq!(h.engine.start_count(), 1);

    advance_ms(199).await;
    assert_eq!(h.engine.start_count(), 1);

    advance_ms(1).await;
    assert_eq!(h.engine.start_count(), 2);
    let snapshot = h.snapshot().await;
    assert!(snapshot.active);
    assert_eq!(snapshot.state, RecognitionState::Active);

    let events = drain(&mut h.events);
    assert_eq!(stop_reasons(&events), vec![StopReason::Superseded]);
    let started = events
        .iter()
        .filter(|event| matches!(event, VoiceEvent::SessionStarted { .. }))
        .count();
    assert_eq!(started, 2);
}

#[tokio::test(start_paused = true)]
async fn test_old_session_results_during_restart_delay_are_ignored() {
    let h = Harness::desktop();
    h.start().await;
    h.final_result("first session").await;

    h.start().await;
    h.final_result("late old words").await;
    assert_eq!(h.surface.value(), "First session");
    assert_eq!(h.snapshot().await.accumulated_text, "");

    advance_ms(200).await;
    assert!(h.snapshot().await.active);
    h.final_result("fresh start").await;
    assert_eq!(h.surface.value(), "Fresh start");
    assert_eq!(h.snapshot().await.accumulated_text, "Fresh start");
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_restart_delay_cancels_restart() {
    let h = Harness::desktop();
    h.start().await;
    h.start().await;
    h.stop().await;

    advance_ms(500).await;
    assert_eq!(h.engine.start_count(), 1);
    assert_eq!(h.snapshot().await.state, RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_highlight_clears_after_delay() {
    let h = Harness::desktop();
    h.start().await;

    h.final_result("one").await;
    assert!(h.surface.is_highlighted());

    advance_ms(300).await;
    h.final_result("two").await;

    advance_ms(300).await;
    assert!(h.surface.is_highlighted());

    advance_ms(199).await;
    assert!(h.surface.is_highlighted());
    advance_ms(1).await;
    assert!(!h.surface.is_highlighted());
}

#[tokio::test(start_paused = true)]
async fn test_interim_does_not_highlight() {
    let h = Harness::desktop();
    h.start().await;
    h.interim_result("maybe").await;
    assert!(!h.surface.is_highlighted());
    assert_eq!(h.surface.highlight_changes(), 0);
}

// =============================================================================
// Permission
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_permission_result_is_discarded() {
    let gate = MockPermissionGate::granted().with_delay(Duration::from_millis(100));
    let h = Harness::build(VoiceConfig::default(), None, gate);

    h.start().await;
    h.stop().await;
    advance_ms(100).await;

    assert_eq!(h.engine.start_count(), 0);
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.wants_recording);
    assert!(!h.surface.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_only_latest_start_proceeds() {
    let gate = MockPermissionGate::granted().with_delay(Duration::from_millis(100));
    let h = Harness::build(VoiceConfig::default(), None, gate);

    h.start().await;
    h.stop().await;
    h.start().await;
    advance_ms(100).await;

    assert_eq!(h.engine.start_count(), 1);
    assert!(h.snapshot().await.active);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_on_desktop() {
    let mut h = Harness::build(VoiceConfig::default(), None, MockPermissionGate::granted());
    h.handle.initialize().unwrap();
    settle().await;
    h.gate.set_granted(false);

    h.start().await;

    assert_eq!(h.engine.start_count(), 0);
    assert_eq!(
        h.surface.spoken(),
        vec![messages::PERMISSION_DENIED_SPOKEN.to_string()]
    );
    assert_eq!(
        h.surface.shown(),
        vec![messages::PERMISSION_DENIED_FEEDBACK.to_string()]
    );
    assert!(h.surface.alerts().is_empty());

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.wants_recording);
    assert!(drain(&mut h.events)
        .iter()
        .any(|event| matches!(event, VoiceEvent::PermissionDenied { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_on_mobile_adds_alert() {
    let h = Harness::build(
        VoiceConfig::default(),
        Some(IPHONE_UA),
        MockPermissionGate::denied(),
    );
    h.start().await;

    assert_eq!(h.engine.start_count(), 0);
    let alerts = h.surface.alerts();
    assert!(alerts.contains(&messages::PERMISSION_DENIED_MOBILE_ALERT.to_string()));
    assert!(alerts.contains(&messages::PROBE_PERMISSION_ALERT.to_string()));
    assert_eq!(
        h.surface.spoken(),
        vec![messages::PERMISSION_DENIED_SPOKEN.to_string()]
    );
}

// =============================================================================
// Capability loss and engine failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_without_capability_reports_unavailable_then_recovers() {
    let h = Harness::desktop();
    h.host.set_available(false);

    h.start().await;
    assert_eq!(
        h.surface.spoken(),
        vec![messages::UNAVAILABLE_SPOKEN.to_string()]
    );
    assert_eq!(
        h.surface.shown(),
        vec![messages::UNAVAILABLE_FEEDBACK.to_string()]
    );
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Uninitialized);
    assert!(!snapshot.wants_recording);

    h.host.set_available(true);
    h.start().await;
    assert_eq!(h.snapshot().await.state, RecognitionState::Active);
    assert_eq!(h.engine.start_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_engine_start_failure() {
    let h = Harness::desktop();
    h.engine.set_fail_start(true);
    h.start().await;

    assert_eq!(h.surface.spoken(), vec![messages::START_FAILED.to_string()]);
    assert_eq!(h.surface.shown(), vec![messages::START_FAILED.to_string()]);
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.wants_recording);
    assert!(!h.surface.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_engine_error_keeps_partial_text() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("keep this").await;

    h.error(EngineErrorCode::Network).await;

    let message = "Network error. Please check your internet connection.";
    assert_eq!(h.surface.spoken(), vec![message.to_string()]);
    assert!(h.surface.shown().contains(&message.to_string()));
    assert_eq!(h.surface.value(), "Keep this");
    assert!(!h.surface.is_recording());
    // Desktop errors do not post notices.
    assert!(h.surface.notices().is_empty());

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.active);

    let events = drain(&mut h.events);
    assert_eq!(stop_reasons(&events), vec![StopReason::Error]);
    assert!(events.iter().any(|event| matches!(
        event,
        VoiceEvent::RecognitionFailed { code, .. } if code == "network"
    )));

    // The trailing end event is ignored.
    h.emit(EngineEvent::Ended).await;
    assert_eq!(h.surface.value(), "Keep this");
}

#[tokio::test(start_paused = true)]
async fn test_engine_error_with_no_text_clears_field() {
    let h = Harness::desktop();
    h.start().await;
    h.interim_result("mumble").await;

    h.error(EngineErrorCode::NoSpeech).await;
    assert_eq!(h.surface.value(), "");
    assert_eq!(
        h.surface.spoken(),
        vec!["No speech detected. Please speak clearly into your microphone.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_not_allowed_on_mobile() {
    let h = Harness::mobile(ANDROID_UA);
    h.start().await;

    h.error(EngineErrorCode::NotAllowed).await;

    let message =
        "Microphone access denied. You must allow microphone access in your device settings.";
    assert_eq!(h.surface.spoken(), vec![message.to_string()]);
    assert_eq!(
        h.surface.shown(),
        vec![messages::LISTENING_FEEDBACK.to_string(), message.to_string()]
    );
    assert_eq!(h.surface.notices(), vec![message.to_string()]);
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.active);

    advance_ms(999).await;
    assert!(h.surface.alerts().is_empty());
    advance_ms(1).await;
    assert_eq!(
        h.surface.alerts(),
        vec![messages::ANDROID_PERMISSION_HELP.to_string()]
    );

    advance_ms(3_999).await;
    assert_eq!(h.surface.notices().len(), 1);
    advance_ms(1).await;
    assert!(h.surface.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_not_allowed_on_ios_uses_settings_walkthrough() {
    let h = Harness::mobile(IPHONE_UA);
    h.start().await;
    h.error(EngineErrorCode::NotAllowed).await;

    advance_ms(1_000).await;
    assert_eq!(
        h.surface.alerts(),
        vec![messages::IOS_PERMISSION_HELP.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_audio_capture_wording_depends_on_platform() {
    let desktop = Harness::desktop();
    desktop.start().await;
    desktop.error(EngineErrorCode::AudioCapture).await;
    assert_eq!(
        desktop.surface.spoken(),
        vec!["No microphone detected. Please check your microphone connection.".to_string()]
    );

    let mobile = Harness::mobile(ANDROID_UA);
    mobile.start().await;
    mobile.error(EngineErrorCode::AudioCapture).await;
    assert_eq!(
        mobile.surface.spoken(),
        vec![
            "No microphone access. Please check your device settings and browser permissions."
                .to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_language_not_supported_falls_back_to_english() {
    let config = VoiceConfig {
        language: "xx-XX".to_string(),
        ..VoiceConfig::default()
    };
    let h = Harness::build(config, None, MockPermissionGate::granted());
    h.start().await;
    assert_eq!(h.engine.last_settings().unwrap().language, "xx-XX");

    h.error(EngineErrorCode::LanguageNotSupported).await;

    assert_eq!(h.engine.last_settings().unwrap().language, "en-US");
    assert_eq!(h.snapshot().await.settings.language, "en-US");
    assert_eq!(
        h.surface.spoken(),
        vec!["The selected language is not supported. Switching to English.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_error_code_gets_generic_message() {
    let h = Harness::desktop();
    h.start().await;
    h.error(EngineErrorCode::from("phasers")).await;
    assert_eq!(
        h.surface.spoken(),
        vec!["Error with speech recognition.".to_string()]
    );
}

// =============================================================================
// Mobile constraints
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_mobile_forces_single_shot_with_interim() {
    let config = VoiceConfig {
        interim_results: false,
        ..VoiceConfig::default()
    };
    let h = Harness::build(config, Some(ANDROID_UA), MockPermissionGate::granted());
    h.start().await;

    assert_eq!(h.snapshot().await.platform, Platform::Android);
    let history = h.engine.settings_history();
    assert_eq!(history.len(), 2);
    assert!(history[0].continuous);
    assert!(!history[0].interim_results);
    assert!(!history[1].continuous);
    assert!(history[1].interim_results);
}

#[tokio::test(start_paused = true)]
async fn test_desktop_keeps_continuous_mode() {
    let h = Harness::desktop();
    h.start().await;
    assert!(h.engine.last_settings().unwrap().continuous);
}

// =============================================================================
// Engine end
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unexpected_end_finishes_session() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("cut short").await;

    h.emit(EngineEvent::Ended).await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.state, RecognitionState::Idle);
    assert!(!snapshot.wants_recording);
    assert!(!h.surface.is_recording());
    assert_eq!(h.surface.value(), "Cut short");
    assert_eq!(
        stop_reasons(&drain(&mut h.events)),
        vec![StopReason::EngineEnded]
    );

    advance_ms(30_000).await;
    assert_eq!(h.engine.start_count(), 1);
    assert!(h.surface.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_end_restarts_when_enabled() {
    let config = VoiceConfig {
        auto_restart_on_unexpected_end: true,
        ..VoiceConfig::default()
    };
    let mut h = Harness::build(config, None, MockPermissionGate::granted());
    h.start().await;
    h.final_result("part one").await;
    let session_id = h.snapshot().await.session_id;

    h.emit(EngineEvent::Ended).await;
    let snapshot = h.snapshot().await;
    assert!(!snapshot.active);
    assert!(snapshot.wants_recording);

    advance_ms(200).await;
    assert_eq!(h.engine.start_count(), 2);
    let snapshot = h.snapshot().await;
    assert!(snapshot.active);
    assert_eq!(snapshot.session_id, session_id);
    assert_eq!(snapshot.accumulated_text, "Part one");

    h.final_result("part two").await;
    assert_eq!(h.surface.value(), "Part one part two");

    let events = drain(&mut h.events);
    assert!(stop_reasons(&events).is_empty());
    let started = events
        .iter()
        .filter(|event| matches!(event, VoiceEvent::SessionStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_with_lifecycle_engine() {
    let engine = MockEngine::with_lifecycle();
    let host = Arc::new(MockHost::new(Some(engine.clone()), None));
    let surface = Arc::new(RecordingSurface::new());
    let handle = RecognitionSessionController::spawn(
        VoiceConfig {
            auto_restart_on_unexpected_end: true,
            ..VoiceConfig::default()
        },
        host,
        Arc::new(MockPermissionGate::granted()),
        Surfaces::shared(surface.clone()),
    );

    handle.start().unwrap();
    settle().await;
    assert!(handle.snapshot().await.unwrap().active);

    handle.stop().unwrap();
    settle().await;
    advance_ms(1_000).await;

    // The engine's own end event after a user stop must not restart it.
    assert_eq!(engine.start_count(), 1);
    assert_eq!(
        handle.snapshot().await.unwrap().state,
        RecognitionState::Idle
    );
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_session_and_closes_handle() {
    let mut h = Harness::desktop();
    h.start().await;
    h.final_result("last words").await;

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.engine.stop_count(), 1);
    assert_eq!(h.surface.value(), "Last words");
    assert_eq!(
        stop_reasons(&drain(&mut h.events)),
        vec![StopReason::Shutdown]
    );

    settle().await;
    assert!(matches!(h.handle.start(), Err(ParleyError::ShuttingDown)));
    assert!(matches!(
        h.handle.snapshot().await,
        Err(ParleyError::ShuttingDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_ends_controller() {
    let h = Harness::desktop();
    h.start().await;
    let engine = h.engine.clone();
    drop(h);
    settle().await;

    assert!(!engine.emit(EngineEvent::Ended));
}
