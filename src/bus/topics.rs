//! Event topic names.
//!
//! Topics are `component:subject:action` strings shared with the web UI and
//! home-automation bridges, so their spelling is part of the external
//! interface.

pub const STARTUP: &str = "controller:startup";
pub const READY: &str = "controller:ready";

pub const BLUETOOTH_INIT: &str = "controller:bluetooth:init";
pub const BLUETOOTH_CONNECT: &str = "controller:bluetooth:connect";
pub const BLUETOOTH_DISCONNECT: &str = "controller:bluetooth:disconnect";

pub const MODE_CHANGE: &str = "controller:mode:change";
pub const TARGET_DURATION_CHANGE: &str = "controller:targetDuration:change";
pub const TARGET_VOLUME_CHANGE: &str = "controller:targetVolume:change";
pub const GRIND_DURATION_CHANGE: &str = "controller:grindDuration:change";
pub const GRIND_VOLUME_CHANGE: &str = "controller:grindVolume:change";

pub const TARGET_TEMPERATURE_CHANGE: &str = "boiler:targetTemperature:change";
pub const CURRENT_TEMPERATURE_CHANGE: &str = "boiler:currentTemperature:change";
pub const PRESSURE_CHANGE: &str = "boiler:pressure:change";

pub const BREW_START: &str = "controller:brew:start";
pub const BREW_END: &str = "controller:brew:end";
pub const BREW_CLEAR: &str = "controller:brew:clear";
pub const GRIND_START: &str = "controller:grind:start";
pub const GRIND_END: &str = "controller:grind:end";

pub const WIFI_CONNECT: &str = "controller:wifi:connect";
pub const WIFI_DISCONNECT: &str = "controller:wifi:disconnect";

pub const ERROR: &str = "controller:error";
pub const ERROR_CLEAR: &str = "controller:error:clear";

pub const AUTOTUNE_START: &str = "controller:autotune:start";
pub const AUTOTUNE_RESULT: &str = "controller:autotune:result";

pub const OTA_UPDATE_START: &str = "ota:update:start";
pub const OTA_UPDATE_END: &str = "ota:update:end";

pub const PROFILE_SAVE: &str = "profiles:profile:save";
pub const PROFILE_SELECT: &str = "profiles:profile:select";
