//! Plugin capability trait.
//!
//! Optional features (web UI bridge, home automation, scale integration,
//! logging) implement [`Plugin`] and are registered on the
//! [`EventBus`](super::EventBus). They never hold a reference to the
//! orchestrator: they observe events through [`Plugin::on_event`] and feed
//! the core through the [`Outbox`] handed to `setup` and `tick`.

use core::fmt;

use super::event::{Event, Value};
use crate::app::commands::AppCommand;

/// Failure raised by an event handler. Aborts the remaining handler chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<super::event::EventError> for HandlerError {
    fn from(e: super::event::EventError) -> Self {
        Self(e.to_string())
    }
}

/// Events and commands queued by a plugin during `setup` or `tick`.
///
/// The bus publishes queued events right after the plugin returns, in the
/// order they were queued. Commands are handed to the orchestrator.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<Event>,
    commands: Vec<AppCommand>,
}

impl Outbox {
    pub fn trigger(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Shorthand for the common single `value` payload.
    pub fn trigger_value(&mut self, topic: &str, value: impl Into<Value>) {
        self.events.push(Event::new(topic).with("value", value));
    }

    pub fn command(&mut self, command: AppCommand) {
        self.commands.push(command);
    }

    pub(super) fn take_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.events)
    }

    pub(super) fn take_commands(&mut self) -> Vec<AppCommand> {
        core::mem::take(&mut self.commands)
    }
}

/// A collaborator registered on the bus.
pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Called once, in registration order, when the bus is set up.
    fn setup(&mut self, _outbox: &mut Outbox) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Whether [`on_event`](Self::on_event) wants `topic`.
    fn handles(&self, _topic: &str) -> bool {
        false
    }

    fn on_event(&mut self, _event: &mut Event) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once per orchestrator pass.
    fn tick(&mut self, _outbox: &mut Outbox) -> Result<(), HandlerError> {
        Ok(())
    }
}
