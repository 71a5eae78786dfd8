//! Brew process: walks the profile phases.

use super::delay::adjust_delay;
use super::{Operation, ProcessTarget, VolumeTracker, Window};
use crate::profile::{Phase, PhaseKind, Profile, PumpSetting};

/// Hard cap on a volumetric extraction phase when the target is never met.
pub const BREW_SAFETY_DURATION_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct BrewProcess {
    profile: Profile,
    target: ProcessTarget,
    target_duration_ms: u32,
    target_volume: f64,
    delay_ms: f64,
    window: Window,
    phase: usize,
    phase_started_ms: u64,
    volume: VolumeTracker,
    stop_flow: f64,
}

impl BrewProcess {
    pub fn new(
        profile: Profile,
        target: ProcessTarget,
        target_duration_ms: u32,
        target_volume: f64,
        delay_ms: f64,
    ) -> Self {
        Self {
            profile,
            target,
            target_duration_ms,
            target_volume,
            delay_ms,
            window: Window::default(),
            phase: 0,
            phase_started_ms: 0,
            volume: VolumeTracker::default(),
            stop_flow: 0.0,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Phase currently running, `None` once the brew has stopped.
    pub fn current_phase(&self) -> Option<&Phase> {
        if self.window.is_active() {
            self.profile.phases.get(self.phase)
        } else {
            None
        }
    }

    pub fn current_volume(&self) -> f64 {
        self.volume.volume()
    }

    fn is_last(&self, idx: usize) -> bool {
        idx + 1 == self.profile.phases.len()
    }

    /// Time-bounded duration of phase `idx`, `None` when only the volume
    /// (or the safety cap) ends it.
    fn phase_duration(&self, idx: usize, phase: &Phase) -> Option<u64> {
        match (phase.kind, self.target) {
            (PhaseKind::Brew, ProcessTarget::Volumetric) if self.is_last(idx) => None,
            (PhaseKind::Brew, ProcessTarget::Time) if self.is_last(idx) => {
                Some(u64::from(self.target_duration_ms))
            }
            _ => Some(u64::from(phase.duration_ms)),
        }
    }
}

impl Operation for BrewProcess {
    fn window(&self) -> &Window {
        &self.window
    }

    fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    fn target(&self) -> ProcessTarget {
        self.target
    }

    fn advance(&mut self, now_ms: u64) {
        if self.phase == 0 && self.phase_started_ms == 0 {
            self.phase_started_ms = self.window.started_ms.unwrap_or(now_ms);
        }
        while let Some(phase) = self.profile.phases.get(self.phase) {
            let in_phase = now_ms.saturating_sub(self.phase_started_ms);
            if phase.kind == PhaseKind::Brew
                && self.target == ProcessTarget::Volumetric
                && self.volume.reached(self.target_volume, self.delay_ms)
            {
                self.window.finish(now_ms);
                return;
            }
            match self.phase_duration(self.phase, phase) {
                Some(duration) if in_phase >= duration => {
                    self.phase_started_ms += duration;
                    self.phase += 1;
                }
                Some(_) => return,
                None => {
                    if in_phase >= BREW_SAFETY_DURATION_MS {
                        log::warn!("brew: volumetric target not reached, safety stop");
                        self.window.finish(now_ms);
                    }
                    return;
                }
            }
        }
        // Ran out of phases: stop at the exact boundary.
        self.window.finish(self.phase_started_ms);
    }

    fn update_volume(&mut self, volume: f64, now_ms: u64) {
        if self.window.started_ms.is_some() {
            self.volume.update(volume, now_ms);
        }
    }

    fn on_stop(&mut self) {
        self.stop_flow = self.volume.flow();
    }

    fn is_relay_active(&self) -> bool {
        self.current_phase().is_some_and(|p| p.valve)
    }

    fn pump_value(&self) -> f32 {
        match self.current_phase().map(|p| p.pump) {
            Some(PumpSetting::Power(power)) => power.clamp(0.0, 100.0),
            Some(PumpSetting::Pressure(_)) => 100.0,
            None => 0.0,
        }
    }

    fn pump_pressure(&self) -> Option<f32> {
        match self.current_phase()?.pump {
            PumpSetting::Pressure(bar) => Some(bar),
            PumpSetting::Power(_) => None,
        }
    }

    fn new_delay_time(&self) -> Option<f64> {
        (self.target == ProcessTarget::Volumetric).then(|| {
            adjust_delay(
                self.delay_ms,
                self.target_volume,
                self.volume.volume(),
                self.stop_flow,
            )
        })
    }
}
