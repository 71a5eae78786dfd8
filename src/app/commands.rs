//! Inbound commands to the orchestrator.
//!
//! Plugins queue these through their [`Outbox`](crate::bus::Outbox) (UI
//! touches, network manager, scale integration, firmware updater) and the
//! [`Orchestrator`](super::orchestrator::Orchestrator) interprets them after
//! the bus pass that produced them.

use crate::config::Settings;
use crate::mode::Mode;

/// Actions collaborators can request from the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Start the process for the current mode.
    Activate,
    /// Stop the current process.
    Deactivate,
    /// Drop the finished process from the display.
    Clear,
    ActivateGrind,
    DeactivateGrind,
    ActivateStandby,
    DeactivateStandby,
    SetMode(Mode),

    // ── Target editing ────────────────────────────────────────
    SetTargetTemp(i32),
    RaiseTemp,
    LowerTemp,
    SetTargetDuration(u32),
    SetTargetVolume(u32),
    SetTargetGrindDuration(u32),
    SetTargetGrindVolume(u32),
    RaiseBrewTarget,
    LowerBrewTarget,
    RaiseGrindTarget,
    LowerGrindTarget,

    /// PID autotune on the controller board.
    Autotune { test_time: u32, samples: u32 },

    // ── Scale integration ─────────────────────────────────────
    /// Latest weight (g) reported by the scale.
    VolumetricMeasurement(f64),
    /// Scale connected (`true`) or lost (`false`).
    SetVolumetricAvailable(bool),
    /// Prefer volumetric targets when a scale is available.
    SetVolumetricTarget(bool),

    /// User dismissed the latched fault.
    AcknowledgeError,
    /// Firmware update about to begin.
    StartOtaUpdate,

    /// Replace the live settings (validated first).
    UpdateSettings(Box<Settings>),
    /// Persist settings now instead of waiting for the debounce.
    SaveSettings,

    /// Display is up; the link may be started.
    ScreenReady,
    WifiConnected { ap_mode: bool },
    WifiDisconnected,
}
