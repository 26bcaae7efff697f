//! User-facing wording for every notice the controller produces.

use parley_core::types::Platform;

use crate::engine::EngineErrorCode;

pub const UNSUPPORTED: &str = "Speech recognition is not supported in your browser. Please use a modern browser like Chrome or Edge.";
pub const INIT_FAILED: &str =
    "Error initializing speech recognition. Please check your microphone permissions.";
pub const PROBE_PERMISSION_ALERT: &str = "Please enable microphone access to use voice recognition features. You may need to go to browser settings to grant permission.";

pub const UNAVAILABLE_SPOKEN: &str = "Speech recognition is not available. Please check your browser support and microphone permissions.";
pub const UNAVAILABLE_FEEDBACK: &str =
    "Speech recognition not available. Try a different browser like Chrome.";

pub const START_FAILED: &str =
    "Error starting speech recognition. Please try again or use text input.";

pub const PERMISSION_DENIED_SPOKEN: &str =
    "Microphone access denied. Please allow microphone access to use voice input.";
pub const PERMISSION_DENIED_FEEDBACK: &str = "Microphone access needed for voice input";
pub const PERMISSION_DENIED_MOBILE_ALERT: &str =
    "Please grant microphone access in your browser settings to use voice input.";

pub const LISTENING_PLACEHOLDER: &str = "Listening... Speak your message";
pub const LISTENING_FEEDBACK: &str = "Listening... Speak your message now";
pub const STOPPED_PLACEHOLDER: &str = "Message will be sent automatically";
pub const AUTO_STOPPED: &str = "Recording stopped automatically. Your message will be sent.";

pub const IOS_PERMISSION_HELP: &str =
    "On iOS, you need to allow microphone access in Settings > Safari > Microphone.";
pub const ANDROID_PERMISSION_HELP: &str = "On Android, please check your browser settings or tap the lock/info icon in the address bar to manage site permissions.";

/// One-line message for an engine error code.
pub fn error_message(code: &EngineErrorCode, platform: Platform) -> &'static str {
    let mobile = platform.is_mobile();
    match code {
        EngineErrorCode::NoSpeech => {
            "No speech detected. Please speak clearly into your microphone."
        }
        EngineErrorCode::Aborted => "Speech recognition was aborted. Please try again.",
        EngineErrorCode::AudioCapture if mobile => {
            "No microphone access. Please check your device settings and browser permissions."
        }
        EngineErrorCode::AudioCapture => {
            "No microphone detected. Please check your microphone connection."
        }
        EngineErrorCode::NotAllowed if mobile => {
            "Microphone access denied. You must allow microphone access in your device settings."
        }
        EngineErrorCode::NotAllowed => {
            "Microphone access denied. Please allow microphone access in your browser settings."
        }
        EngineErrorCode::Network => "Network error. Please check your internet connection.",
        EngineErrorCode::ServiceNotAllowed => {
            "Speech recognition service not allowed. Please check your browser settings."
        }
        EngineErrorCode::BadGrammar => {
            "Speech recognition encountered a problem understanding your speech."
        }
        EngineErrorCode::LanguageNotSupported => {
            "The selected language is not supported. Switching to English."
        }
        EngineErrorCode::Other(_) => "Error with speech recognition.",
    }
}

/// Settings walkthrough shown after a `not-allowed` error on mobile.
pub fn permission_help(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Ios => Some(IOS_PERMISSION_HELP),
        Platform::Android => Some(ANDROID_PERMISSION_HELP),
        Platform::Desktop => None,
    }
}
