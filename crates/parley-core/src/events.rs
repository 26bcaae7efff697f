use serde::{Deserialize, Serialize};

use crate::types::{Platform, SessionId, StopReason, Timestamp};

/// Events published by the voice input controller.
///
/// Consumed by observers that subscribe to the controller's broadcast
/// channel (the binary prints them, hosts may mirror them into their UI).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum VoiceEvent {
    /// A recognition capability was found and configured.
    Initialized {
        capability: String,
        language: String,
        timestamp: Timestamp,
    },

    /// The host offers no recognition capability at all.
    Unsupported { timestamp: Timestamp },

    /// The engine was started and the field switched to recording.
    SessionStarted {
        session_id: SessionId,
        platform: Platform,
        timestamp: Timestamp,
    },

    /// The message buffer changed because of a transcript fragment.
    TranscriptUpdated {
        session_id: Option<SessionId>,
        text: String,
        is_final: bool,
        timestamp: Timestamp,
    },

    /// A session ended and its text was committed.
    SessionStopped {
        session_id: Option<SessionId>,
        reason: StopReason,
        text: String,
        timestamp: Timestamp,
    },

    /// Microphone access was refused.
    PermissionDenied { reason: String, timestamp: Timestamp },

    /// The engine reported an error.
    RecognitionFailed {
        code: String,
        message: String,
        timestamp: Timestamp,
    },
}

impl VoiceEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            VoiceEvent::Initialized { timestamp, .. }
            | VoiceEvent::Unsupported { timestamp }
            | VoiceEvent::SessionStarted { timestamp, .. }
            | VoiceEvent::TranscriptUpdated { timestamp, .. }
            | VoiceEvent::SessionStopped { timestamp, .. }
            | VoiceEvent::PermissionDenied { timestamp, .. }
            | VoiceEvent::RecognitionFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable snake_case name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            VoiceEvent::Initialized { .. } => "initialized",
            VoiceEvent::Unsupported { .. } => "unsupported",
            VoiceEvent::SessionStarted { .. } => "session_started",
            VoiceEvent::TranscriptUpdated { .. } => "transcript_updated",
            VoiceEvent::SessionStopped { .. } => "session_stopped",
            VoiceEvent::PermissionDenied { .. } => "permission_denied",
            VoiceEvent::RecognitionFailed { .. } => "recognition_failed",
        }
    }
}
