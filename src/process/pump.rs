//! Steam and hot-water processes. Both run the pump with the brew valve
//! closed until the user stops them or the safety cap expires.

use super::{Operation, Window};

pub const STEAM_SAFETY_DURATION_MS: u64 = 60_000;
pub const WATER_SAFETY_DURATION_MS: u64 = 30_000;

fn cap(window: &mut Window, limit_ms: u64, now_ms: u64) {
    if window.elapsed_ms() >= limit_ms {
        let start = window.started_ms.unwrap_or(now_ms);
        window.finish(start + limit_ms);
    }
}

/// Steam: low pump power keeps the boiler topped up while steaming.
#[derive(Debug, Clone, PartialEq)]
pub struct SteamProcess {
    pump_percent: f32,
    window: Window,
}

impl SteamProcess {
    pub fn new(pump_percent: f32) -> Self {
        Self {
            pump_percent: pump_percent.clamp(0.0, 100.0),
            window: Window::default(),
        }
    }
}

impl Operation for SteamProcess {
    fn window(&self) -> &Window {
        &self.window
    }

    fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    fn advance(&mut self, now_ms: u64) {
        cap(&mut self.window, STEAM_SAFETY_DURATION_MS, now_ms);
    }

    fn pump_value(&self) -> f32 {
        self.pump_percent
    }
}

/// Hot water: full pump power through the water wand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterProcess {
    window: Window,
}

impl WaterProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for WaterProcess {
    fn window(&self) -> &Window {
        &self.window
    }

    fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    fn advance(&mut self, now_ms: u64) {
        cap(&mut self.window, WATER_SAFETY_DURATION_MS, now_ms);
    }

    fn pump_value(&self) -> f32 {
        100.0
    }
}
