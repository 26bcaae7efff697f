//! Terminal-backed UI collaborators.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use parley_voice::{
    Announcer, Feedback, MessageField, NoticeBoard, NoticeId, PermissionDenial, PermissionGate,
};

/// Prints every UI effect as a tagged line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    next_notice: AtomicU64,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, tag: &str, text: &str) {
        println!("[{tag:>8}] {text}");
    }
}

impl MessageField for ConsoleSurface {
    fn set_value(&self, value: &str) {
        self.line("field", &format!("{value:?}"));
    }

    fn set_placeholder(&self, placeholder: &str) {
        self.line("hint", placeholder);
    }

    fn set_recording(&self, recording: bool) {
        self.line("mic", if recording { "recording" } else { "idle" });
    }

    fn set_highlight(&self, highlighted: bool) {
        tracing::trace!(highlighted, "Field highlight changed");
    }
}

impl NoticeBoard for ConsoleSurface {
    fn append(&self, text: &str) -> NoticeId {
        let id = NoticeId(self.next_notice.fetch_add(1, Ordering::Relaxed));
        self.line("notice", &format!("#{} {text}", id.0));
        id
    }

    fn remove(&self, id: NoticeId) {
        self.line("notice", &format!("#{} dismissed", id.0));
    }
}

impl Announcer for ConsoleSurface {
    fn speak(&self, text: &str) {
        self.line("speak", text);
    }
}

impl Feedback for ConsoleSurface {
    fn show(&self, text: &str) {
        self.line("feedback", text);
    }

    fn alert(&self, text: &str) {
        self.line("alert", text);
    }
}

/// Answers microphone requests from a command-line flag.
#[derive(Debug, Clone, Copy)]
pub struct ConsolePermissionGate {
    granted: bool,
}

impl ConsolePermissionGate {
    pub fn new(granted: bool) -> Self {
        Self { granted }
    }
}

#[async_trait]
impl PermissionGate for ConsolePermissionGate {
    async fn request_microphone(&self) -> Result<(), PermissionDenial> {
        if self.granted {
            Ok(())
        } else {
            Err(PermissionDenial {
                reason: "denied on the command line".to_string(),
            })
        }
    }
}
