//! Synchronous publish/subscribe event bus.
//!
//! ```text
//!  trigger(topic) ──▶ sub #0 ──▶ sub #1 ──▶ … ──▶ mutated Event returned
//!                      │  (closure handler or plugin, registration order)
//!                      └─ Err aborts the rest of the chain
//! ```
//!
//! Every handler runs to completion on the caller's thread before
//! [`EventBus::trigger`] returns. Handlers may rewrite payload values, which
//! is how collaborators veto or clamp a change: the orchestrator commits the
//! value it reads back from the returned event.
//!
//! Plugins and closure handlers share one subscription list, so the order in
//! which they were registered is the order in which they see an event.

pub mod event;
pub mod plugin;
pub mod topics;

use core::fmt;

use log::{debug, warn};

use crate::app::commands::AppCommand;

pub use event::{Event, EventError, Value};
pub use plugin::{HandlerError, Outbox, Plugin};

/// Boxed closure subscribed to a single topic.
pub type Handler = Box<dyn FnMut(&mut Event) -> Result<(), HandlerError>>;

enum Subscriber {
    Handler { topic: String, handler: Handler },
    Plugin(usize),
}

/// A handler failure, annotated with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusError {
    pub topic: String,
    /// Plugin name, or `handler#N` for closure subscriptions.
    pub subscriber: String,
    pub source: HandlerError,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' failed in {}: {}",
            self.topic, self.subscriber, self.source
        )
    }
}

/// Result of one [`EventBus::tick`] pass.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Commands injected by plugins, in the order they were queued.
    pub commands: Vec<AppCommand>,
    /// Plugin or handler failures encountered during the pass.
    pub failures: Vec<BusError>,
}

#[derive(Default)]
pub struct EventBus {
    plugins: Vec<Box<dyn Plugin>>,
    subscribers: Vec<Subscriber>,
    outbox: Outbox,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. Its subscription slot is fixed at this point in the order.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!("bus: registered plugin '{}'", plugin.name());
        let idx = self.plugins.len();
        self.plugins.push(plugin);
        self.subscribers.push(Subscriber::Plugin(idx));
    }

    /// Subscribe a closure to `topic`.
    pub fn on<F>(&mut self, topic: &str, handler: F)
    where
        F: FnMut(&mut Event) -> Result<(), HandlerError> + 'static,
    {
        self.subscribers.push(Subscriber::Handler {
            topic: topic.to_owned(),
            handler: Box::new(handler),
        });
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Publish `topic` with the given payload and return the mutated event.
    pub fn trigger<'a, I>(&mut self, topic: &str, kv: I) -> Result<Event, BusError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut event = Event::new(topic);
        for (k, v) in kv {
            event.set(k, v);
        }
        self.dispatch(event)
    }

    /// Publish `topic` with a single `value` entry.
    pub fn trigger_value(
        &mut self,
        topic: &str,
        value: impl Into<Value>,
    ) -> Result<Event, BusError> {
        self.dispatch(Event::new(topic).with("value", value))
    }

    /// Publish `topic` with an empty payload.
    pub fn emit(&mut self, topic: &str) -> Result<Event, BusError> {
        self.dispatch(Event::new(topic))
    }

    /// Run `event` through every matching subscriber in order.
    pub fn dispatch(&mut self, mut event: Event) -> Result<Event, BusError> {
        for (pos, sub) in self.subscribers.iter_mut().enumerate() {
            let result = match sub {
                Subscriber::Handler { topic, handler } => {
                    if topic.as_str() != event.topic() {
                        continue;
                    }
                    handler(&mut event).map_err(|e| (format!("handler#{pos}"), e))
                }
                Subscriber::Plugin(idx) => {
                    let plugin = &mut self.plugins[*idx];
                    if !plugin.handles(event.topic()) {
                        continue;
                    }
                    plugin
                        .on_event(&mut event)
                        .map_err(|e| (plugin.name().to_owned(), e))
                }
            };
            if let Err((subscriber, source)) = result {
                return Err(BusError {
                    topic: event.topic().to_owned(),
                    subscriber,
                    source,
                });
            }
        }
        Ok(event)
    }

    /// Run every plugin's `setup` in registration order. Fails fast.
    pub fn setup(&mut self) -> Result<Vec<AppCommand>, BusError> {
        for idx in 0..self.plugins.len() {
            let plugin = &mut self.plugins[idx];
            plugin.setup(&mut self.outbox).map_err(|source| BusError {
                topic: String::from("setup"),
                subscriber: plugin.name().to_owned(),
                source,
            })?;
            for event in self.outbox.take_events() {
                self.dispatch(event)?;
            }
        }
        Ok(self.outbox.take_commands())
    }

    /// Forward one pass to every plugin and publish what they queued.
    ///
    /// A failing plugin does not stop the others from running.
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        for idx in 0..self.plugins.len() {
            let plugin = &mut self.plugins[idx];
            if let Err(source) = plugin.tick(&mut self.outbox) {
                warn!("bus: plugin '{}' tick failed: {}", plugin.name(), source);
                outcome.failures.push(BusError {
                    topic: String::from("tick"),
                    subscriber: plugin.name().to_owned(),
                    source,
                });
            }
            for event in self.outbox.take_events() {
                if let Err(e) = self.dispatch(event) {
                    outcome.failures.push(e);
                }
            }
        }
        outcome.commands = self.outbox.take_commands();
        outcome
    }
}

impl std::error::Error for BusError {}
