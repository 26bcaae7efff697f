//! Parley core crate - shared configuration, error, event and platform types.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{ParleyConfig, VoiceConfig};
pub use error::{ParleyError, Result};
pub use events::VoiceEvent;
pub use types::*;
