//! Speech recognition engine abstraction and capability selection.
//!
//! The engine itself (audio capture, acoustic model, transcription) lives in
//! the host. This module describes the surface the controller needs from it:
//! a configure/start/stop trio plus four lifecycle events delivered through
//! an [`EngineEventSink`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::WeakUnboundedSender;

use parley_core::config::VoiceConfig;

use crate::controller::Input;
use crate::error::VoiceError;

// =============================================================================
// Settings and results
// =============================================================================

/// Configuration pushed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
    pub max_alternatives: u32,
}

impl EngineSettings {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            continuous: config.continuous,
            interim_results: config.interim_results,
            language: config.language.clone(),
            max_alternatives: config.max_alternatives,
        }
    }
}

/// One candidate transcription of a result entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionAlternative {
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// One entry of the engine's result list.
///
/// Alternatives are ordered best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub is_final: bool,
    pub alternatives: Vec<RecognitionAlternative>,
}

impl RecognitionResult {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            is_final: false,
            alternatives: vec![RecognitionAlternative {
                transcript: transcript.into(),
                confidence: None,
            }],
        }
    }

    pub fn final_text(transcript: impl Into<String>) -> Self {
        Self {
            is_final: true,
            alternatives: vec![RecognitionAlternative {
                transcript: transcript.into(),
                confidence: None,
            }],
        }
    }

    /// The top-ranked alternative, if the engine produced any.
    pub fn top(&self) -> Option<&RecognitionAlternative> {
        self.alternatives.first()
    }
}

/// Error codes reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    NotAllowed,
    Network,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    Other(String),
}

impl EngineErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            EngineErrorCode::NoSpeech => "no-speech",
            EngineErrorCode::Aborted => "aborted",
            EngineErrorCode::AudioCapture => "audio-capture",
            EngineErrorCode::NotAllowed => "not-allowed",
            EngineErrorCode::Network => "network",
            EngineErrorCode::ServiceNotAllowed => "service-not-allowed",
            EngineErrorCode::BadGrammar => "bad-grammar",
            EngineErrorCode::LanguageNotSupported => "language-not-supported",
            EngineErrorCode::Other(code) => code,
        }
    }
}

impl From<&str> for EngineErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "no-speech" => EngineErrorCode::NoSpeech,
            "aborted" => EngineErrorCode::Aborted,
            "audio-capture" => EngineErrorCode::AudioCapture,
            "not-allowed" => EngineErrorCode::NotAllowed,
            "network" => EngineErrorCode::Network,
            "service-not-allowed" => EngineErrorCode::ServiceNotAllowed,
            "bad-grammar" => EngineErrorCode::BadGrammar,
            "language-not-supported" => EngineErrorCode::LanguageNotSupported,
            other => EngineErrorCode::Other(other.to_string()),
        }
    }
}

impl From<String> for EngineErrorCode {
    fn from(code: String) -> Self {
        EngineErrorCode::from(code.as_str())
    }
}

impl From<EngineErrorCode> for String {
    fn from(code: EngineErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Audio capture began.
    Started,
    /// New or updated results; entries before `result_index` are unchanged.
    Result {
        results: Vec<RecognitionResult>,
        #[serde(default)]
        result_index: usize,
    },
    /// The engine failed; usually followed by `Ended`.
    Error { code: EngineErrorCode },
    /// The engine stopped capturing.
    Ended,
}

// =============================================================================
// Engine trait
// =============================================================================

/// Where an engine posts its lifecycle events.
///
/// Holds only a weak reference to the controller's queue, so an engine that
/// outlives its controller simply has its events dropped.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    tx: WeakUnboundedSender<Input>,
}

impl EngineEventSink {
    pub(crate) fn new(tx: WeakUnboundedSender<Input>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Returns `false` if the controller is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(Input::Engine(event)).is_ok(),
            None => false,
        }
    }
}

/// A host-provided speech recognition engine.
pub trait RecognitionEngine: Send {
    /// Apply settings. Called at initialization and whenever a setting changes.
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), VoiceError>;

    /// The settings currently applied, if the engine has been configured.
    fn settings(&self) -> Option<EngineSettings>;

    /// Register the sink that receives this engine's lifecycle events.
    fn subscribe(&mut self, sink: EngineEventSink);

    /// Begin capturing audio.
    fn start(&mut self) -> Result<(), VoiceError>;

    /// Stop capturing audio. Pending results may still be delivered.
    fn stop(&mut self) -> Result<(), VoiceError>;
}

// =============================================================================
// Capability selection
// =============================================================================

/// The host environment the controller runs in.
pub trait HostEnvironment: Send + Sync {
    /// The host's user agent, used for platform detection.
    fn user_agent(&self) -> String;

    /// The standard recognizer, if the host exposes one.
    fn standard_recognizer(&self) -> Option<Box<dyn RecognitionEngine>>;

    /// The vendor-prefixed recognizer, if the host exposes one.
    fn prefixed_recognizer(&self) -> Option<Box<dyn RecognitionEngine>>;
}

/// Which recognizer variant was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Standard,
    Prefixed,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Standard => write!(f, "standard"),
            CapabilityKind::Prefixed => write!(f, "prefixed"),
        }
    }
}

/// A selected recognition capability.
pub enum Capability {
    Standard(Box<dyn RecognitionEngine>),
    Prefixed(Box<dyn RecognitionEngine>),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

impl Capability {
    /// Probe the host, preferring the standard recognizer.
    pub fn detect(host: &dyn HostEnvironment) -> Option<Self> {
        if let Some(engine) = host.standard_recognizer() {
            tracing::info!("Using standard speech recognition capability");
            return Some(Capability::Standard(engine));
        }
        if let Some(engine) = host.prefixed_recognizer() {
            tracing::info!("Using vendor-prefixed speech recognition capability");
            return Some(Capability::Prefixed(engine));
        }
        tracing::warn!("Speech recognition not supported by this host");
        None
    }

    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Standard(_) => CapabilityKind::Standard,
            Capability::Prefixed(_) => CapabilityKind::Prefixed,
        }
    }

    pub fn engine(&self) -> &dyn RecognitionEngine {
        match self {
            Capability::Standard(engine) | Capability::Prefixed(engine) => engine.as_ref(),
        }
    }

    pub fn engine_mut(&mut self) -> &mut dyn RecognitionEngine {
        match self {
            Capability::Standard(engine) | Capability::Prefixed(engine) => engine.as_mut(),
        }
    }
}
