//! Host-side collaborators: the message field, the notice area, speech
//! output, on-screen feedback and the microphone permission gate.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// The text entry element the controller dictates into.
pub trait MessageField: Send + Sync {
    fn set_value(&self, value: &str);
    fn set_placeholder(&self, placeholder: &str);
    /// Toggle the "recording" visual state.
    fn set_recording(&self, recording: bool);
    /// Toggle the transient "highlight" visual state.
    fn set_highlight(&self, highlighted: bool);
}

/// Identifier of a notice appended to the conversation view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(pub u64);

/// Container for transient error notices.
pub trait NoticeBoard: Send + Sync {
    fn append(&self, text: &str) -> NoticeId;
    /// Remove a notice. Unknown ids are ignored.
    fn remove(&self, id: NoticeId);
}

/// Audible announcements (text-to-speech).
pub trait Announcer: Send + Sync {
    fn speak(&self, text: &str);
}

/// Visual feedback.
pub trait Feedback: Send + Sync {
    /// Transient status line.
    fn show(&self, text: &str);
    /// Blocking alert the user has to dismiss.
    fn alert(&self, text: &str);
}

/// Why microphone access was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenial {
    pub reason: String,
}

impl fmt::Display for PermissionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Gate in front of the microphone.
///
/// The request may take arbitrarily long (the host can show a consent prompt).
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request_microphone(&self) -> Result<(), PermissionDenial>;
}

/// Bundle of the UI collaborators handed to the controller.
#[derive(Clone)]
pub struct Surfaces {
    pub field: Arc<dyn MessageField>,
    pub notices: Arc<dyn NoticeBoard>,
    pub announcer: Arc<dyn Announcer>,
    pub feedback: Arc<dyn Feedback>,
}

impl Surfaces {
    /// Use one object for every surface.
    pub fn shared<T>(surface: Arc<T>) -> Self
    where
        T: MessageField + NoticeBoard + Announcer + Feedback + 'static,
    {
        Self {
            field: surface.clone(),
            notices: surface.clone(),
            announcer: surface.clone(),
            feedback: surface,
        }
    }

    /// Speak and show the same message.
    pub fn notify(&self, text: &str) {
        self.feedback.show(text);
        self.announcer.speak(text);
    }
}

impl fmt::Debug for Surfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surfaces").finish_non_exhaustive()
    }
}
