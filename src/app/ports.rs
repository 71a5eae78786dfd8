//! Port traits — the boundary between the orchestrator and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Orchestrator (domain)
//! ```
//!
//! Driven adapters (settings storage, clock, the controller link's command
//! writer) implement these traits. The orchestrator holds them as trait
//! objects, so the domain core never touches NVS or the radio directly.
//!
//! **SettingsPort** implementations MUST validate before persisting.

use crate::config::Settings;
use crate::link::protocol::{AdvancedOutputCommand, OutputCommand};

pub use crate::profile::ProfileSource;

// ───────────────────────────────────────────────────────────────
// Settings port (driven adapter: domain ↔ persistent settings)
// ───────────────────────────────────────────────────────────────

/// Loads and persists user settings.
///
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`], not
/// silently clamped, so a misbehaving collaborator cannot store a steam
/// target of 400 °C.
pub trait SettingsPort {
    /// Load settings from persistent storage.
    /// Returns [`ConfigError::NotFound`] on first boot.
    fn load(&self) -> Result<Settings, ConfigError>;

    /// Validate and persist settings.
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Output port (driven adapter: domain → controller board)
// ───────────────────────────────────────────────────────────────

/// Write-side port used by the control tick. Every call is fire-and-forget:
/// the next tick re-sends the desired state.
pub trait OutputPort {
    /// Relay, pump power and boiler setpoint.
    fn output(&self, cmd: &OutputCommand);

    /// Output command with a pressure target.
    fn advanced_output(&self, cmd: &AdvancedOutputCommand);

    /// Auxiliary (grinder) relay.
    fn alt_control(&self, on: bool);

    /// Boiler setpoint only.
    fn temperature_control(&self, setpoint: f32);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`SettingsPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No settings found in storage (first boot).
    NotFound,
    /// Stored blob failed deserialization.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("settings not found"),
            ConfigError::Corrupted => Self::Config("settings corrupted"),
            ConfigError::StorageFull => Self::Config("storage full"),
            ConfigError::IoError => Self::Config("settings I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
