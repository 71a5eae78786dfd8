//! Application core — pure domain logic, zero I/O.
//!
//! The [`orchestrator`] owns mode, processes and fault state. All interaction
//! with storage, time and the controller board happens through the port
//! traits in [`ports`], so the whole layer runs on the host with mocks.

pub mod buttons;
pub mod commands;
pub mod control;
pub mod orchestrator;
pub mod ports;

pub use commands::AppCommand;
pub use control::{ControlSnapshot, SharedControl};
pub use orchestrator::{Orchestrator, Ports};
