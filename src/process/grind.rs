//! Grind process: drives the auxiliary relay until time or weight is reached.

use super::delay::adjust_delay;
use super::{Operation, ProcessTarget, VolumeTracker, Window};

/// Hard cap on a volumetric grind when the scale never reports the target.
pub const GRIND_SAFETY_DURATION_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq)]
pub struct GrindProcess {
    target: ProcessTarget,
    duration_ms: u32,
    target_volume: f64,
    delay_ms: f64,
    window: Window,
    volume: VolumeTracker,
    stop_flow: f64,
}

impl GrindProcess {
    pub fn new(target: ProcessTarget, duration_ms: u32, target_volume: f64, delay_ms: f64) -> Self {
        Self {
            target,
            duration_ms,
            target_volume,
            delay_ms,
            window: Window::default(),
            volume: VolumeTracker::default(),
            stop_flow: 0.0,
        }
    }

    pub fn current_volume(&self) -> f64 {
        self.volume.volume()
    }
}

impl Operation for GrindProcess {
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
        let elapsed = self.window.elapsed_ms();
        match self.target {
            ProcessTarget::Time => {
                let duration = u64::from(self.duration_ms);
                if elapsed >= duration {
                    let start = self.window.started_ms.unwrap_or(now_ms);
                    self.window.finish(start + duration);
                }
            }
            ProcessTarget::Volumetric => {
                if self.volume.reached(self.target_volume, self.delay_ms) {
                    self.window.finish(now_ms);
                } else if elapsed >= GRIND_SAFETY_DURATION_MS {
                    log::warn!("grind: volumetric target not reached, safety stop");
                    self.window.finish(now_ms);
                }
            }
        }
    }

    fn update_volume(&mut self, volume: f64, now_ms: u64) {
        if self.window.started_ms.is_some() {
            self.volume.update(volume, now_ms);
        }
    }

    fn on_stop(&mut self) {
        self.stop_flow = self.volume.flow();
    }

    fn is_alt_relay_active(&self) -> bool {
        true
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
