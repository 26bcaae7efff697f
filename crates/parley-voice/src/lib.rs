//! Parley Voice crate - speech-driven message input.
//!
//! Turns a host speech recognition engine into dictation for a single message
//! field. [`RecognitionSessionController`] runs as its own task and owns the
//! session lifecycle: Uninitialized -> Idle -> Active -> Idle, with a
//! transient Errored state when the engine reports a failure. Callers drive it
//! through a cloneable [`VoiceInputHandle`].

pub mod accessibility;
pub mod controller;
pub mod engine;
pub mod error;
pub mod messages;
pub mod mock;
pub mod state;
pub mod surface;
pub mod transcript;

pub use controller::{RecognitionSessionController, SessionSnapshot, VoiceInputHandle};
pub use engine::{
    Capability, CapabilityKind, EngineErrorCode, EngineEvent, EngineEventSink, EngineSettings,
    HostEnvironment, RecognitionAlternative, RecognitionEngine, RecognitionResult,
};
pub use error::{EngineOperation, VoiceError};
pub use state::{RecognitionState, StateMachine};
pub use surface::{
    Announcer, Feedback, MessageField, NoticeBoard, NoticeId, PermissionDenial, PermissionGate,
    Surfaces,
};
pub use transcript::{capitalize_sentences, TranscriptBuffer};
