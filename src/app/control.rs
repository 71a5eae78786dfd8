//! Control tick — the fixed-period output loop.
//!
//! The event loop owns the current process. After every state change it
//! publishes a [`ControlSnapshot`] into [`SharedControl`]; the control task
//! clones the latest snapshot and turns it into output commands. The tick
//! never sees a process that is being replaced mid-way.

use std::sync::{Arc, Mutex, PoisonError};

use crate::link::CommandWriter;
use crate::link::protocol::{AdvancedOutputCommand, OutputCommand};
use crate::mode::Mode;
use crate::process::Process;

use super::ports::OutputPort;

/// Immutable view of the state the control tick acts on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSnapshot {
    /// Nothing is sent until the orchestrator has started the link.
    pub initialized: bool,
    pub mode: Mode,
    /// Target for the current mode, before the calibration offset.
    pub target_temp: i32,
    pub temperature_offset: i32,
    pub autotuning: bool,
    pub process: Option<Process>,
    /// Board reported pressure sensing.
    pub pressure_capable: bool,
}

impl ControlSnapshot {
    /// Setpoint sent to the board. A zero target stays zero so standby
    /// does not heat to the offset.
    pub fn effective_target(&self) -> f32 {
        if self.target_temp > 0 {
            (self.target_temp + self.temperature_offset) as f32
        } else {
            0.0
        }
    }
}

/// Single-slot mailbox between the event loop and the control task.
#[derive(Debug, Clone, Default)]
pub struct SharedControl(Arc<Mutex<ControlSnapshot>>);

impl SharedControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: ControlSnapshot) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One control tick: derive the output commands for `snapshot`.
pub fn tick(snapshot: &ControlSnapshot, out: &impl OutputPort) {
    if !snapshot.initialized {
        return;
    }
    let temperature = snapshot.effective_target();

    // The board runs its own loop while tuning; only the setpoint matters.
    if snapshot.autotuning {
        out.temperature_control(temperature);
        return;
    }

    let active = snapshot.process.as_ref().filter(|p| p.is_active());
    out.alt_control(active.is_some_and(Process::is_alt_relay_active));

    match active {
        Some(process @ Process::Brew(_)) if snapshot.pressure_capable => {
            match process.pump_pressure() {
                Some(pressure) => out.advanced_output(&AdvancedOutputCommand {
                    relay: process.is_relay_active(),
                    pump: 100.0,
                    temperature,
                    pressure,
                }),
                None => out.output(&output_for(process, temperature)),
            }
        }
        Some(process) => out.output(&output_for(process, temperature)),
        None => out.output(&OutputCommand {
            temperature,
            ..OutputCommand::OFF
        }),
    }
}

fn output_for(process: &Process, temperature: f32) -> OutputCommand {
    OutputCommand {
        relay: process.is_relay_active(),
        pump: process.pump_value(),
        temperature,
    }
}

impl OutputPort for CommandWriter {
    fn output(&self, cmd: &OutputCommand) {
        self.send_output(cmd);
    }

    fn advanced_output(&self, cmd: &AdvancedOutputCommand) {
        self.send_advanced_output(cmd);
    }

    fn alt_control(&self, on: bool) {
        self.send_alt_control(on);
    }

    fn temperature_control(&self, setpoint: f32) {
        self.send_temperature_control(setpoint);
    }
}
