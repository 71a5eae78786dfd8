//! Physical button arbitration.
//!
//! The board reports the brew and steam switches as level changes. Latching
//! switches (the default) report both press and release; momentary buttons
//! only act on press. The tables below decide what a transition means in the
//! current mode; the orchestrator executes the resulting steps in order.

use crate::mode::Mode;

/// One orchestrator action requested by a button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStep {
    /// Leave standby and go back to the last working mode.
    ExitStandby,
    Clear,
    Activate,
    Deactivate,
    EnterSteam,
}

/// Button position as reported by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonInput {
    pub pressed: bool,
    /// Only presses count.
    pub momentary: bool,
}

use ButtonStep::{Activate, Clear, Deactivate, EnterSteam, ExitStandby};

/// Brew switch.
///
/// | Mode | press | release |
/// |---|---|---|
/// | Standby | exit standby | |
/// | Brew, idle | clear, activate | clear |
/// | Brew, active | | deactivate, clear |
/// | Water | activate | deactivate |
pub fn brew_button(mode: Mode, active: bool, input: ButtonInput) -> &'static [ButtonStep] {
    if input.pressed {
        return match mode {
            Mode::Standby => &[ExitStandby],
            Mode::Brew if !active => &[Clear, Activate],
            Mode::Water => &[Activate],
            _ => &[],
        };
    }
    if input.momentary {
        return &[];
    }
    match mode {
        Mode::Brew if active => &[Deactivate, Clear],
        Mode::Brew => &[Clear],
        Mode::Water => &[Deactivate],
        _ => &[],
    }
}

/// Steam switch.
///
/// | Mode | press | release |
/// |---|---|---|
/// | Standby | enter steam | |
/// | Brew | enter steam, activate | |
/// | Steam | activate | deactivate |
pub fn steam_button(mode: Mode, input: ButtonInput) -> &'static [ButtonStep] {
    if input.pressed {
        return match mode {
            Mode::Standby => &[EnterSteam],
            Mode::Brew => &[EnterSteam, Activate],
            Mode::Steam => &[Activate],
            _ => &[],
        };
    }
    match mode {
        Mode::Steam if !input.momentary => &[Deactivate],
        _ => &[],
    }
}
