//! Hand-off queue from transport callbacks to the event loop.
//!
//! Radio callbacks run on the Bluetooth host task and must not touch
//! orchestrator state. They push [`LinkSignal`]s into a bounded
//! `embassy-sync` channel which the link client drains once per loop pass.
//!
//! ```text
//! ┌──────────────┐  LinkSignal  ┌──────────────┐
//! │  BT host     │────────────▶│  Event loop   │
//! │  callbacks   │   (FIFO)    │  (link poll)  │
//! └──────────────┘             └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use super::transport::Endpoint;

/// Largest notification payload carried through the inbox.
pub const MAX_PAYLOAD: usize = 64;

/// Queue depth. Telemetry arrives at a few Hz, so this covers several
/// loop passes of backlog.
const INBOX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    /// Scan found the controller board's service.
    ServerFound,
    /// The GATT connection dropped.
    Disconnected,
    /// Notification on a subscribed endpoint.
    Notify {
        endpoint: Endpoint,
        payload: Vec<u8, MAX_PAYLOAD>,
    },
    /// Notification that did not fit [`MAX_PAYLOAD`].
    Oversized { endpoint: Endpoint },
}

pub struct LinkInbox {
    channel: Channel<CriticalSectionRawMutex, LinkSignal, INBOX_DEPTH>,
}

impl Default for LinkInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queue `signal`. Returns `false` (and logs) when the inbox is full.
    pub fn push(&self, signal: LinkSignal) -> bool {
        if self.channel.try_send(signal).is_err() {
            warn!("link inbox full, dropping signal");
            return false;
        }
        true
    }

    /// Copy a raw notification into the inbox.
    pub fn notify(&self, endpoint: Endpoint, data: &[u8]) -> bool {
        match Vec::from_slice(data) {
            Ok(payload) => self.push(LinkSignal::Notify { endpoint, payload }),
            Err(()) => self.push(LinkSignal::Oversized { endpoint }),
        }
    }

    pub fn try_recv(&self) -> Option<LinkSignal> {
        self.channel.try_receive().ok()
    }
}
