//! Process model — one in-progress brew, grind, steam or water operation.
//!
//! ```text
//!  Created ──start──▶ Active ──(target met | stop)──▶ Settling ──▶ Complete
//!                      ▲   │
//!                      └───┘ progress(now)
//! ```
//!
//! All timing is derived from absolute timestamps passed in by the caller,
//! so calling [`Process::progress`] twice with the same `now` is a no-op.
//! Volume bookkeeping only changes on [`Process::update_volume`].
//!
//! Volumetric runs linger in `Settling` after the pump stops so the final
//! weight is captured before delay learning reads it.

pub mod brew;
pub mod delay;
pub mod grind;
pub mod pump;

pub use brew::BrewProcess;
pub use grind::GrindProcess;
pub use pump::{SteamProcess, WaterProcess};

use crate::mode::Mode;

/// Time the scale is given to settle after a volumetric run stops.
pub const SETTLE_MS: u64 = 3_000;
/// Weight of the newest flow sample in the smoothed flow estimate.
const FLOW_SMOOTHING: f64 = 0.3;

/// Stop condition of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTarget {
    Time,
    Volumetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Active,
    Settling,
    Complete,
}

// ───────────────────────────────────────────────────────────────
// Shared bookkeeping
// ───────────────────────────────────────────────────────────────

/// Start/stop timestamps and the latest observed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    started_ms: Option<u64>,
    finished_ms: Option<u64>,
    now_ms: u64,
}

impl Window {
    fn start(&mut self, now_ms: u64) {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_ms);
            self.now_ms = now_ms;
        }
    }

    fn advance(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    fn finish(&mut self, at_ms: u64) {
        if self.is_active() {
            self.finished_ms = Some(at_ms);
        }
    }

    fn is_active(&self) -> bool {
        self.started_ms.is_some() && self.finished_ms.is_none()
    }

    fn is_finished(&self) -> bool {
        self.finished_ms.is_some()
    }

    /// Time spent active, up to `now` or the finish time.
    fn elapsed_ms(&self) -> u64 {
        let Some(start) = self.started_ms else {
            return 0;
        };
        self.finished_ms
            .unwrap_or(self.now_ms)
            .saturating_sub(start)
    }

    fn since_finish_ms(&self) -> Option<u64> {
        self.finished_ms.map(|f| self.now_ms.saturating_sub(f))
    }

    fn settled(&self, target: ProcessTarget) -> bool {
        match target {
            ProcessTarget::Time => self.is_finished(),
            ProcessTarget::Volumetric => self.since_finish_ms().is_some_and(|t| t >= SETTLE_MS),
        }
    }
}

/// Measured volume and a smoothed flow estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeTracker {
    volume: f64,
    flow: f64,
    last_sample: Option<(u64, f64)>,
}

impl VolumeTracker {
    fn update(&mut self, volume: f64, now_ms: u64) {
        if !volume.is_finite() {
            return;
        }
        if let Some((t, v)) = self.last_sample {
            let dt_ms = now_ms.saturating_sub(t);
            if dt_ms == 0 {
                self.volume = volume;
                return;
            }
            let sample = ((volume - v) * 1000.0 / dt_ms as f64).max(0.0);
            self.flow = FLOW_SMOOTHING * sample + (1.0 - FLOW_SMOOTHING) * self.flow;
        }
        self.last_sample = Some((now_ms, volume));
        self.volume = volume;
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// g/s (or ml/s without a scale).
    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// Whether the stop point `target + flow · delay` has been reached.
    fn reached(&self, target: f64, delay_ms: f64) -> bool {
        self.volume >= target + self.flow * delay_ms / 1000.0
    }
}

// ───────────────────────────────────────────────────────────────
// Per-operation behaviour
// ───────────────────────────────────────────────────────────────

pub(crate) trait Operation {
    fn window(&self) -> &Window;
    fn window_mut(&mut self) -> &mut Window;

    fn target(&self) -> ProcessTarget {
        ProcessTarget::Time
    }

    /// Evaluate the stop condition. Only called while active.
    fn advance(&mut self, now_ms: u64);

    fn update_volume(&mut self, _volume: f64, _now_ms: u64) {}

    /// Record whatever the delay learner needs at the stop point.
    fn on_stop(&mut self) {}

    fn is_relay_active(&self) -> bool {
        false
    }

    fn is_alt_relay_active(&self) -> bool {
        false
    }

    fn pump_value(&self) -> f32 {
        0.0
    }

    fn pump_pressure(&self) -> Option<f32> {
        None
    }

    fn new_delay_time(&self) -> Option<f64> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Process
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Process {
    Brew(BrewProcess),
    Grind(GrindProcess),
    Steam(SteamProcess),
    Water(WaterProcess),
}

impl Process {
    fn op(&self) -> &dyn Operation {
        match self {
            Self::Brew(p) => p,
            Self::Grind(p) => p,
            Self::Steam(p) => p,
            Self::Water(p) => p,
        }
    }

    fn op_mut(&mut self) -> &mut dyn Operation {
        match self {
            Self::Brew(p) => p,
            Self::Grind(p) => p,
            Self::Steam(p) => p,
            Self::Water(p) => p,
        }
    }

    /// The mode this process belongs to.
    pub fn mode(&self) -> Mode {
        match self {
            Self::Brew(_) => Mode::Brew,
            Self::Grind(_) => Mode::Grind,
            Self::Steam(_) => Mode::Steam,
            Self::Water(_) => Mode::Water,
        }
    }

    pub fn target(&self) -> ProcessTarget {
        self.op().target()
    }

    pub fn state(&self) -> ProcessState {
        let w = self.op().window();
        if w.started_ms.is_none() {
            ProcessState::Created
        } else if w.is_active() {
            ProcessState::Active
        } else if self.is_complete() {
            ProcessState::Complete
        } else {
            ProcessState::Settling
        }
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.op().window().started_ms
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.op().window().elapsed_ms()
    }

    pub fn start(&mut self, now_ms: u64) {
        let op = self.op_mut();
        op.window_mut().start(now_ms);
        op.advance(now_ms);
    }

    pub fn progress(&mut self, now_ms: u64) {
        let op = self.op_mut();
        op.window_mut().advance(now_ms);
        if op.window().is_active() {
            op.advance(now_ms);
            if !op.window().is_active() {
                op.on_stop();
            }
        }
    }

    /// Apply a new volume/weight measurement.
    pub fn update_volume(&mut self, volume: f64, now_ms: u64) {
        self.op_mut().update_volume(volume, now_ms);
    }

    /// End the active window early, e.g. when the user cancels.
    pub fn stop(&mut self, now_ms: u64) {
        let op = self.op_mut();
        op.window_mut().advance(now_ms);
        if op.window().is_active() {
            op.window_mut().finish(now_ms);
            op.on_stop();
        }
    }

    /// Relay and pump should be energized.
    pub fn is_active(&self) -> bool {
        self.op().window().is_active()
    }

    pub fn is_complete(&self) -> bool {
        let op = self.op();
        op.window().settled(op.target())
    }

    pub fn is_relay_active(&self) -> bool {
        self.is_active() && self.op().is_relay_active()
    }

    /// Auxiliary relay (grinder).
    pub fn is_alt_relay_active(&self) -> bool {
        self.is_active() && self.op().is_alt_relay_active()
    }

    /// Pump power, 0–100 %.
    pub fn pump_value(&self) -> f32 {
        if self.is_active() {
            self.op().pump_value()
        } else {
            0.0
        }
    }

    /// Pressure target while the current phase is pressure-driven.
    pub fn pump_pressure(&self) -> Option<f32> {
        if self.is_active() {
            self.op().pump_pressure()
        } else {
            None
        }
    }

    /// Learned stop offset for the next run. Only volumetric brew/grind
    /// runs produce one.
    pub fn new_delay_time(&self) -> Option<f64> {
        self.op().new_delay_time()
    }
}
