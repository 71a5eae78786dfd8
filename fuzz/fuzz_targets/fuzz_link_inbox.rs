//! Fuzz target: `LinkInbox` → `ControllerLink::poll`
//!
//! Splits the input into notifications on arbitrary endpoints and drains
//! them through a discovering link client. Polling must never panic and
//! never yields more events than notifications were queued.
//!
//! cargo fuzz run fuzz_link_inbox

#![no_main]

use std::sync::Arc;

use brewdeck::link::{ControllerLink, Endpoint, LinkInbox, LinkSignal, LinkTimings, NullTransport};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let inbox = Arc::new(LinkInbox::new());
    let mut link = ControllerLink::new(
        Arc::new(NullTransport),
        inbox.clone(),
        LinkTimings {
            ping_interval_ms: 1_000,
            ping_timeout_ms: 5_000,
        },
    );
    link.poll(0);
    inbox.push(LinkSignal::ServerFound);

    for (i, chunk) in data.split(|b| *b == b'\n').enumerate() {
        let Some((&selector, payload)) = chunk.split_first() else {
            continue;
        };
        let endpoint = Endpoint::ALL[usize::from(selector) % Endpoint::ALL.len()];
        inbox.notify(endpoint, payload);
        let events = link.poll(i as u64);
        assert!(events.len() <= 1);
    }
});
