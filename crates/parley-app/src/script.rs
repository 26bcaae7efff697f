//! Scripted dictation sessions.
//!
//! A script is a JSON document listing user actions and engine events, each
//! preceded by a delay:
//!
//! ```json
//! {
//!   "user_agent": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
//!   "steps": [
//!     {"action": "start"},
//!     {"after_ms": 300, "action": "engine", "event": {"type": "started"}},
//!     {"after_ms": 800, "action": "engine", "event": {"type": "result",
//!       "results": [{"is_final": true, "alternatives": [{"transcript": "hello"}]}]}},
//!     {"after_ms": 500, "action": "stop"}
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use parley_core::error::{ParleyError, Result};
use parley_voice::accessibility::{announce_focus, ScreenAnnouncer};
use parley_voice::mock::MockEngine;
use parley_voice::{Announcer, EngineEvent, SessionSnapshot, VoiceInputHandle};

/// Time given to the controller to settle before the final snapshot.
const SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub user_agent: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Delay before this step, relative to the previous one.
    #[serde(default)]
    pub after_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Initialize,
    Start,
    Stop,
    Toggle,
    /// Print the controller snapshot.
    Snapshot,
    /// Have the simulated engine emit an event.
    Engine { event: EngineEvent },
    /// An input gained focus.
    Focus {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        placeholder: Option<String>,
    },
    /// The app navigated to another screen.
    Screen {
        screen: String,
        #[serde(default)]
        heading: Option<String>,
    },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let script = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), steps = script.steps.len(), "Script loaded");
        Ok(script)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let script: Script = serde_json::from_str(json)?;
        if script.steps.is_empty() {
            return Err(ParleyError::Script("script has no steps".to_string()));
        }
        Ok(script)
    }
}

/// Play a script against a running controller and return its final snapshot.
pub async fn replay(
    script: &Script,
    handle: &VoiceInputHandle,
    engine: &MockEngine,
    announcer: Arc<dyn Announcer>,
) -> Result<SessionSnapshot> {
    let mut screens = ScreenAnnouncer::new(Arc::clone(&announcer));
    for (index, step) in script.steps.iter().enumerate() {
        if step.after_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
        }
        tracing::debug!(step = index, action = ?step.action, "Replaying step");

        match &step.action {
            Action::Initialize => handle.initialize()?,
            Action::Start => handle.start()?,
            Action::Stop => handle.stop()?,
            Action::Toggle => handle.toggle()?,
            Action::Snapshot => {
                let snapshot = handle.snapshot().await?;
                println!("[snapshot] {}", serde_json::to_string(&snapshot)?);
            }
            Action::Engine { event } => {
                if !engine.emit(event.clone()) {
                    tracing::warn!(step = index, "Engine has no listener, event dropped");
                }
            }
            Action::Focus { label, placeholder } => {
                announce_focus(
                    announcer.as_ref(),
                    label.as_deref(),
                    placeholder.as_deref(),
                );
            }
            Action::Screen { screen, heading } => {
                screens.screen_activated(screen, heading.as_deref());
            }
        }
    }

    tokio::time::sleep(SETTLE).await;
    handle.snapshot().await
}
