//! Physical button handling, driven through board notifications.

use super::mock_link::{brew_settings, Harness};

use brewdeck::bus::topics;
use brewdeck::config::Settings;
use brewdeck::link::Endpoint;
use brewdeck::mode::Mode;
use brewdeck::process::Process;

// ── Latching buttons ──────────────────────────────────────────

#[test]
fn latching_brew_press_starts_and_release_stops() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::BrewButton, "1");
    h.step(10);
    assert!(h.orchestrator.is_active(), "press should start a brew");
    assert!(matches!(h.orchestrator.current(), Some(Process::Brew(_))));
    assert!(h.saw(topics::BREW_START));

    h.notify(Endpoint::BrewButton, "0");
    h.step(10);
    assert!(!h.orchestrator.is_active(), "release should stop the brew");
    assert!(h.saw(topics::BREW_END));
    // Deactivate is followed by Clear, so nothing lingers as `last`.
    assert!(h.orchestrator.last().is_none());
    assert!(h.saw(topics::BREW_CLEAR));
}

#[test]
fn momentary_release_is_ignored() {
    let settings = Settings {
        momentary_buttons: true,
        ..brew_settings()
    };
    let mut h = Harness::new(settings);
    h.connect();

    h.notify(Endpoint::BrewButton, "1");
    h.step(10);
    assert!(h.orchestrator.is_active());

    h.notify(Endpoint::BrewButton, "0");
    h.step(10);
    assert!(h.orchestrator.is_active(), "momentary release must not stop the brew");
}

#[test]
fn steam_press_in_brew_switches_mode_and_starts_steam() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::SteamButton, "1");
    h.step(10);
    assert_eq!(h.orchestrator.mode(), Mode::Steam);
    assert!(matches!(h.orchestrator.current(), Some(Process::Steam(_))));
    assert!(h.orchestrator.is_active());

    h.notify(Endpoint::SteamButton, "0");
    h.step(10);
    assert!(!h.orchestrator.is_active());
    assert_eq!(h.orchestrator.mode(), Mode::Steam);
}

#[test]
fn brew_press_in_standby_only_wakes() {
    let mut h = Harness::new(Settings::default());
    h.connect();
    assert_eq!(h.orchestrator.mode(), Mode::Standby);

    h.notify(Endpoint::BrewButton, "1");
    h.step(10);
    assert_eq!(h.orchestrator.mode(), Mode::Brew);
    assert!(!h.orchestrator.is_active(), "waking must not start a brew");
}

#[test]
fn water_follows_press_and_release() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.set_mode(Mode::Water).unwrap();

    h.notify(Endpoint::BrewButton, "1");
    h.step(10);
    assert!(matches!(h.orchestrator.current(), Some(Process::Water(_))));

    h.notify(Endpoint::BrewButton, "0");
    h.step(10);
    assert!(!h.orchestrator.is_active());
    assert!(matches!(h.orchestrator.last(), Some(Process::Water(_))));
}

#[test]
fn malformed_button_payload_is_a_protocol_fault() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::BrewButton, "pressed");
    h.step(10);
    assert!(!h.orchestrator.is_active());
    assert!(h.orchestrator.error().is_some());
}
