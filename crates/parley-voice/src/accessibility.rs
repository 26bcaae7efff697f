//! Screen-reader support for the rest of the host UI.

use std::sync::Arc;

use crate::surface::Announcer;

/// A clickable control as seen by assistive technology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Visible text.
    pub text: String,
    /// Accessible name, if the host set one.
    pub accessible_label: Option<String>,
}

impl Control {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accessible_label: None,
        }
    }
}

/// Give every unlabelled control its visible text as accessible name.
///
/// Returns how many controls were changed. Blank labels count as missing.
pub fn fill_missing_labels(controls: &mut [Control]) -> usize {
    let mut filled = 0;
    for control in controls.iter_mut() {
        let missing = control
            .accessible_label
            .as_deref()
            .map_or(true, |label| label.trim().is_empty());
        if missing {
            control.accessible_label = Some(control.text.trim().to_string());
            filled += 1;
        }
    }
    if filled > 0 {
        tracing::debug!(filled, "Filled missing accessible labels");
    }
    filled
}

/// What to say when an input gains focus: `"<label> field. <placeholder>"`.
///
/// Inputs without a label are not announced.
pub fn focus_announcement(label: Option<&str>, placeholder: Option<&str>) -> Option<String> {
    let label = label.map(str::trim).filter(|label| !label.is_empty())?;
    let text = format!("{label} field. {}", placeholder.unwrap_or_default());
    Some(text.trim_end().to_string())
}

/// Speak the focus announcement for an input, if it has one.
pub fn announce_focus(
    announcer: &dyn Announcer,
    label: Option<&str>,
    placeholder: Option<&str>,
) -> bool {
    match focus_announcement(label, placeholder) {
        Some(text) => {
            announcer.speak(&text);
            true
        }
        None => false,
    }
}

/// Announces "Screen changed to <heading>" when the active screen changes.
pub struct ScreenAnnouncer {
    announcer: Arc<dyn Announcer>,
    current: Option<String>,
}

impl ScreenAnnouncer {
    pub fn new(announcer: Arc<dyn Announcer>) -> Self {
        Self {
            announcer,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Record that `screen` became active. Returns whether anything was spoken.
    ///
    /// Re-activating the current screen is silent, as is a screen without a
    /// heading.
    pub fn screen_activated(&mut self, screen: &str, heading: Option<&str>) -> bool {
        if self.current.as_deref() == Some(screen) {
            return false;
        }
        self.current = Some(screen.to_string());
        tracing::debug!(screen, "Active screen changed");

        match heading.map(str::trim).filter(|heading| !heading.is_empty()) {
            Some(heading) => {
                self.announcer.speak(&format!("Screen changed to {heading}"));
                true
            }
            None => false,
        }
    }
}
