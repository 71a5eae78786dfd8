//! Remote link to the controller board.
//!
//! - [`transport`] — the outbound transport trait and endpoint table.
//! - [`inbox`] — callback-to-loop hand-off channel.
//! - [`protocol`] — positional text codec.
//! - [`client`] — connection lifecycle, keepalive and fault classification.

pub mod client;
pub mod inbox;
pub mod protocol;
pub mod transport;

pub use client::{CommandWriter, ControllerLink, LinkEvent, LinkState, LinkTimings};
pub use inbox::{LinkInbox, LinkSignal};
pub use transport::{Endpoint, NullTransport, Transport};
