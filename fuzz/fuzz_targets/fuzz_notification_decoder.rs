//! Fuzz target: `decode_notification`
//!
//! Drives arbitrary bytes into the notification decoder for every endpoint
//! and asserts that it never panics and that a decoded sensor reading is
//! always finite.
//!
//! cargo fuzz run fuzz_notification_decoder

#![no_main]

use brewdeck::link::client::{decode_notification, LinkEvent};
use brewdeck::link::Endpoint;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for endpoint in Endpoint::ALL {
        if let Ok(Some(LinkEvent::Sensor(reading))) = decode_notification(endpoint, data) {
            assert!(reading.temperature.is_finite());
            assert!(reading.pressure.is_finite());
        }
    }
});
