//! Brew profiles.
//!
//! A profile is an ordered list of phases. Preinfusion phases always run for
//! their configured duration; the final extraction phase takes its stop
//! condition (time or weight) from the user's brew targets.

use serde::{Deserialize, Serialize};

/// How the pump is driven during a phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PumpSetting {
    /// Fixed power, 0–100 %.
    Power(f32),
    /// Closed-loop pressure target in bar. Needs a pressure-capable board.
    Pressure(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseKind {
    Preinfusion,
    Brew,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    pub duration_ms: u32,
    pub pump: PumpSetting,
    /// Brew valve open
    pub valve: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub label: String,
    /// Brew temperature (°C)
    pub temperature: i32,
    pub phases: Vec<Phase>,
}

impl Profile {
    /// Three-phase lever-style default: soak, bloom, full-power extraction.
    pub fn classic() -> Self {
        Self {
            id: String::from("classic"),
            label: String::from("Classic"),
            temperature: 93,
            phases: vec![
                Phase {
                    name: String::from("Preinfusion"),
                    kind: PhaseKind::Preinfusion,
                    duration_ms: 3_000,
                    pump: PumpSetting::Power(30.0),
                    valve: true,
                },
                Phase {
                    name: String::from("Bloom"),
                    kind: PhaseKind::Preinfusion,
                    duration_ms: 2_000,
                    pump: PumpSetting::Power(0.0),
                    valve: true,
                },
                Phase {
                    name: String::from("Extraction"),
                    kind: PhaseKind::Brew,
                    duration_ms: 25_000,
                    pump: PumpSetting::Power(100.0),
                    valve: true,
                },
            ],
        }
    }

    /// Whether any phase drives the pump by pressure target.
    pub fn uses_pressure(&self) -> bool {
        self.phases
            .iter()
            .any(|p| matches!(p.pump, PumpSetting::Pressure(_)))
    }
}

/// Read access to the profile store, which lives outside the core.
pub trait ProfileSource {
    /// The currently selected profile.
    fn selected(&self) -> Profile;

    /// Persist a new brew temperature on the selected profile.
    fn set_selected_temperature(&mut self, temperature: i32);
}

/// In-memory profile list, used until a persistent store is attached.
#[derive(Debug, Clone)]
pub struct StaticProfiles {
    profiles: Vec<Profile>,
    selected: usize,
}

impl StaticProfiles {
    pub fn new(profiles: Vec<Profile>) -> Self {
        let profiles = if profiles.is_empty() {
            vec![Profile::classic()]
        } else {
            profiles
        };
        Self {
            profiles,
            selected: 0,
        }
    }

    /// Select by id. Returns `false` when no profile has that id.
    pub fn select(&mut self, id: &str) -> bool {
        match self.profiles.iter().position(|p| p.id == id) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }
}

impl Default for StaticProfiles {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ProfileSource for StaticProfiles {
    fn selected(&self) -> Profile {
        self.profiles[self.selected].clone()
    }

    fn set_selected_temperature(&mut self, temperature: i32) {
        self.profiles[self.selected].temperature = temperature;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_ends_with_brew_phase() {
        let p = Profile::classic();
        assert_eq!(p.phases.last().map(|ph| ph.kind), Some(PhaseKind::Brew));
        assert!(!p.uses_pressure());
    }

    #[test]
    fn empty_store_falls_back_to_classic() {
        let store = StaticProfiles::default();
        assert_eq!(store.selected().id, "classic");
    }

    #[test]
    fn select_and_edit_temperature() {
        let mut turbo = Profile::classic();
        turbo.id = String::from("turbo");
        turbo.phases[2].pump = PumpSetting::Pressure(6.0);
        let mut store = StaticProfiles::new(vec![Profile::classic(), turbo]);

        assert!(store.select("turbo"));
        assert!(!store.select("missing"));
        assert!(store.selected().uses_pressure());

        store.set_selected_temperature(90);
        assert_eq!(store.selected().temperature, 90);
    }
}
