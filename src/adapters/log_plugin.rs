//! Log-based bus plugin.
//!
//! Subscribes to every topic and writes each event to the ESP-IDF logger
//! (UART / USB-CDC in production). High-rate telemetry topics go to
//! `debug` so the console stays readable at `info`.

use log::{debug, info, warn};

use crate::bus::{topics, Event, HandlerError, Plugin};

/// Plugin that logs every bus event to the serial console.
#[derive(Debug, Default)]
pub struct LogPlugin {
    seen: u64,
}

impl LogPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

fn is_telemetry(topic: &str) -> bool {
    matches!(
        topic,
        topics::CURRENT_TEMPERATURE_CHANGE | topics::PRESSURE_CHANGE
    )
}

impl Plugin for LogPlugin {
    fn name(&self) -> &'static str {
        "log"
    }

    fn handles(&self, _topic: &str) -> bool {
        true
    }

    fn on_event(&mut self, event: &mut Event) -> Result<(), HandlerError> {
        self.seen += 1;
        match event.topic() {
            t if is_telemetry(t) => debug!("EVENT | {}", event),
            topics::ERROR => warn!("EVENT | {}", event),
            _ => info!("EVENT | {}", event),
        }
        Ok(())
    }
}
