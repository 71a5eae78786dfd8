//! Persisted machine settings
//!
//! All tunable parameters for the display firmware. Values are loaded from
//! NVS at boot (see [`crate::adapters::nvs`]) and written back by the
//! orchestrator's debounced auto-save.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::mode::Mode;

// --- Limits shared by validation and the raise/lower commands ---

pub const MIN_TEMP: i32 = 0;
pub const MAX_TEMP: i32 = 160;
pub const BREW_MIN_DURATION_MS: u32 = 1_000;
pub const BREW_MAX_DURATION_MS: u32 = 120_000;
pub const BREW_MIN_VOLUME: u32 = 1;
pub const BREW_MAX_VOLUME: u32 = 150;
pub const GRIND_MIN_DURATION_MS: u32 = 1_000;
pub const GRIND_MAX_DURATION_MS: u32 = 60_000;
pub const GRIND_MIN_VOLUME: u32 = 1;
pub const GRIND_MAX_VOLUME: u32 = 60;
/// Step used by raise/lower for time targets.
pub const DURATION_STEP_MS: u32 = 1_000;
/// Step used by raise/lower for volumetric targets.
pub const VOLUME_STEP: u32 = 1;

/// Core persisted settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // --- Boot ---
    /// Mode entered after the controller board first reports ready
    pub startup_mode: Mode,

    // --- Temperatures (°C) ---
    pub target_steam_temp: i32,
    pub target_water_temp: i32,
    /// Added to the commanded setpoint, subtracted from readings
    pub temperature_offset: i32,

    // --- Brew targets ---
    pub target_duration_ms: u32,
    /// Target output in grams (or ml when no scale is present)
    pub target_volume: u32,
    /// Signed stop offset applied to volumetric brews (ms, negative stops early)
    pub brew_delay_ms: f64,

    // --- Grind targets ---
    pub target_grind_duration_ms: u32,
    pub target_grind_volume: u32,
    pub grind_delay_ms: f64,

    // --- Behaviour ---
    /// Learn the stop offsets after each volumetric run
    pub delay_adjust: bool,
    /// Prefer volumetric targets when a scale is available
    pub volumetric_target: bool,
    /// Buttons are momentary (release ends the run) instead of latching
    pub momentary_buttons: bool,
    /// Idle time before the machine drops to standby
    pub standby_timeout_ms: u64,

    // --- Controller board ---
    /// PID gains as `"Kp,Ki,Kd"`
    pub pid: String,
    /// Pressure transducer scale in bar at full range
    pub pressure_scaling: f32,
    /// Pump power used while steaming (0-100%)
    pub steam_pump_percent: f32,

    // --- Timing ---
    /// Control tick period (milliseconds)
    pub control_interval_ms: u32,
    /// Process progress interval (milliseconds)
    pub progress_interval_ms: u32,
    /// Keepalive ping period (milliseconds)
    pub ping_interval_ms: u32,
    /// Silence on the link longer than this raises a timeout (milliseconds)
    pub ping_timeout_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            startup_mode: Mode::Standby,

            target_steam_temp: 145,
            target_water_temp: 80,
            temperature_offset: 0,

            target_duration_ms: 25_000,
            target_volume: 36,
            brew_delay_ms: -1_000.0,

            target_grind_duration_ms: 15_000,
            target_grind_volume: 18,
            grind_delay_ms: -1_000.0,

            delay_adjust: true,
            volumetric_target: false,
            momentary_buttons: false,
            standby_timeout_ms: 900_000, // 15 min

            pid: String::from("2.4,40,0"),
            pressure_scaling: 16.0,
            steam_pump_percent: 4.0,

            control_interval_ms: 100,    // 10 Hz
            progress_interval_ms: 250,   // 4 Hz
            ping_interval_ms: 1_000,     // 1 Hz
            ping_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    /// Range-check every field. Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temp_range = MIN_TEMP..=MAX_TEMP;
        if !temp_range.contains(&self.target_steam_temp) {
            return Err(ConfigError::ValidationFailed("target_steam_temp must be 0–160"));
        }
        if !temp_range.contains(&self.target_water_temp) {
            return Err(ConfigError::ValidationFailed("target_water_temp must be 0–160"));
        }
        if !(-20..=20).contains(&self.temperature_offset) {
            return Err(ConfigError::ValidationFailed("temperature_offset must be -20–20"));
        }
        if !(BREW_MIN_DURATION_MS..=BREW_MAX_DURATION_MS).contains(&self.target_duration_ms) {
            return Err(ConfigError::ValidationFailed(
                "target_duration_ms must be 1000–120000",
            ));
        }
        if !(BREW_MIN_VOLUME..=BREW_MAX_VOLUME).contains(&self.target_volume) {
            return Err(ConfigError::ValidationFailed("target_volume must be 1–150"));
        }
        if !(GRIND_MIN_DURATION_MS..=GRIND_MAX_DURATION_MS).contains(&self.target_grind_duration_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "target_grind_duration_ms must be 1000–60000",
            ));
        }
        if !(GRIND_MIN_VOLUME..=GRIND_MAX_VOLUME).contains(&self.target_grind_volume) {
            return Err(ConfigError::ValidationFailed("target_grind_volume must be 1–60"));
        }
        let delay_range = crate::process::delay::MIN_DELAY_MS..=crate::process::delay::MAX_DELAY_MS;
        if !delay_range.contains(&self.brew_delay_ms) || !delay_range.contains(&self.grind_delay_ms) {
            return Err(ConfigError::ValidationFailed("delay offsets out of range"));
        }
        if self.standby_timeout_ms < 60_000 {
            return Err(ConfigError::ValidationFailed("standby_timeout_ms must be ≥ 60000"));
        }
        if crate::link::protocol::PidGains::parse_setting(&self.pid).is_err() {
            return Err(ConfigError::ValidationFailed("pid must be \"Kp,Ki,Kd\""));
        }
        if !(1.0..=30.0).contains(&self.pressure_scaling) {
            return Err(ConfigError::ValidationFailed("pressure_scaling must be 1–30"));
        }
        if !(0.0..=100.0).contains(&self.steam_pump_percent) {
            return Err(ConfigError::ValidationFailed("steam_pump_percent must be 0–100"));
        }
        if !(20..=1_000).contains(&self.control_interval_ms) {
            return Err(ConfigError::ValidationFailed("control_interval_ms must be 20–1000"));
        }
        if !(50..=1_000).contains(&self.progress_interval_ms) {
            return Err(ConfigError::ValidationFailed("progress_interval_ms must be 50–1000"));
        }
        if self.ping_interval_ms == 0 || self.ping_timeout_ms <= self.ping_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "ping_timeout_ms must exceed ping_interval_ms",
            ));
        }
        Ok(())
    }
}
