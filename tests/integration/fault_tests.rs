//! Fault classification and the fail-safe path.

use std::sync::atomic::Ordering;

use super::mock_link::{brew_settings, Harness};

use brewdeck::bus::topics;
use brewdeck::error::ErrorCode;
use brewdeck::link::Endpoint;
use brewdeck::mode::Mode;

#[test]
fn runaway_stops_outputs_within_one_tick() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();
    h.control_tick();
    let running = h.transport.last_output().expect("output while brewing");
    assert!(running.relay);
    assert!(running.pump > 0.0);

    h.notify(Endpoint::Error, "4");
    h.step(10);
    h.control_tick();

    assert_eq!(h.orchestrator.error(), Some(ErrorCode::Runaway));
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
    assert!(!h.orchestrator.is_active());
    let after = h.transport.last_output().expect("output after fault");
    assert!(!after.relay, "relay must drop on the first tick after a fault");
    assert_eq!(after.pump, 0.0);
    assert_eq!(after.temperature, 0.0);
}

#[test]
fn repeated_fault_is_raised_once() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::Error, "4");
    h.notify(Endpoint::Error, "4");
    h.step(10);
    h.notify(Endpoint::Error, "4");
    h.step(10);

    assert_eq!(h.count(topics::ERROR), 1);
}

#[test]
fn reported_send_failure_is_latched_once() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();

    h.notify(Endpoint::Error, "1");
    h.notify(Endpoint::Error, "1");
    h.step(10);

    assert_eq!(h.orchestrator.error(), Some(ErrorCode::CommSend));
    assert_eq!(h.count(topics::ERROR), 1);
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
    assert!(!h.orchestrator.is_active());
}

#[test]
fn reported_receive_failure_is_latched() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::Error, "2");
    h.step(10);
    assert_eq!(h.orchestrator.error(), Some(ErrorCode::CommReceive));
}

#[test]
fn reported_timeout_is_not_latched() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();

    h.notify(Endpoint::Error, "5");
    h.step(10);

    assert_eq!(h.orchestrator.error(), None);
    assert!(h.orchestrator.is_active());
    assert!(!h.saw(topics::ERROR));
}

#[test]
fn local_ping_failure_keeps_the_brew_running() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();
    h.transport.fail_unconfirmed.store(true, Ordering::Release);

    h.notify(Endpoint::TemperatureRead, "93,0");
    h.step(2_000);

    assert_eq!(h.orchestrator.error(), None);
    assert!(h.orchestrator.is_active());
    assert_eq!(h.orchestrator.mode(), Mode::Brew);
}

#[test]
fn unknown_code_is_fatal() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.notify(Endpoint::Error, "42");
    h.step(10);
    assert_eq!(h.orchestrator.error(), Some(ErrorCode::Other(42)));
}

#[test]
fn fault_forces_standby_over_a_mode_veto() {
    let mut h = Harness::with_veto(brew_settings(), Mode::Standby, Mode::Brew);
    h.connect();

    h.orchestrator.handle_remote_error(ErrorCode::Runaway).unwrap();
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
}

#[test]
fn acknowledged_fault_allows_brewing_again() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.notify(Endpoint::Error, "3");
    h.step(10);

    h.orchestrator.set_mode(Mode::Brew).unwrap();
    h.orchestrator.activate().unwrap();
    assert!(!h.orchestrator.is_active(), "latched fault blocks activation");

    h.orchestrator.acknowledge_error().unwrap();
    assert!(h.saw(topics::ERROR_CLEAR));
    h.orchestrator.activate().unwrap();
    assert!(h.orchestrator.is_active());
}

#[test]
fn silent_link_reports_a_transient_timeout() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();

    // No notifications for longer than the ping timeout.
    h.step(6_000);
    assert_eq!(h.orchestrator.error(), None);
    assert!(!h.transport.writes_to(Endpoint::Ping).is_empty());
}

#[test]
fn disconnect_is_announced_and_rediscovered() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    assert!(h.inbox.push(brewdeck::link::LinkSignal::Disconnected));
    h.step(10);
    assert!(h.saw(topics::BLUETOOTH_DISCONNECT));

    // Scanning restarts and the mock finds the board again.
    h.step(10);
    h.step(10);
    assert!(h.orchestrator.writer().is_ready());
    assert_eq!(h.count(topics::READY), 1, "first-connect setup runs once");
}
