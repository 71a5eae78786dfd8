//! Orchestrator lifecycle, timers and persistence against a mock board.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::mock_link::{brew_settings, Harness, Updater};

use brewdeck::app::orchestrator::GRIND_ACTIVE_WINDOW_MS;
use brewdeck::app::AppCommand;
use brewdeck::bus::topics;
use brewdeck::config::Settings;
use brewdeck::link::protocol::SystemInfo;
use brewdeck::link::{Endpoint, LinkState};
use brewdeck::mode::Mode;
use brewdeck::process::{Process, ProcessState};

// ── Startup and capability negotiation ────────────────────────

#[test]
fn first_connect_pushes_tuning_and_announces_ready() {
    let mut h = Harness::new(brew_settings());
    assert_eq!(h.orchestrator.link_state(), LinkState::Disconnected);
    h.connect();

    assert!(h.saw(topics::STARTUP));
    assert!(h.saw(topics::BLUETOOTH_INIT));
    assert!(h.saw(topics::BLUETOOTH_CONNECT));
    assert!(h.saw(topics::READY));
    assert!(h.orchestrator.system_info().capabilities.pressure);
    assert_eq!(h.transport.writes_to(Endpoint::PidControl), ["2.4,40,0"]);
    assert_eq!(h.transport.writes_to(Endpoint::PressureScale).len(), 1);
}

#[test]
fn undecodable_info_falls_back_to_defaults() {
    let mut h = Harness::build(brew_settings(), None, |t| t.set_info("{not json"));
    h.connect();

    assert_eq!(*h.orchestrator.system_info(), SystemInfo::fallback());
    assert!(h.saw(topics::READY), "startup continues on the fallback");
    assert!(
        h.transport.writes_to(Endpoint::PressureScale).is_empty(),
        "no pressure scale without the capability"
    );
}

#[test]
fn standby_startup_mode_is_applied_on_connect() {
    let mut h = Harness::new(Settings::default());
    h.connect();
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
    assert_eq!(h.orchestrator.target_temp(), 0);
}

#[test]
fn nothing_is_sent_before_the_screen_is_ready() {
    let mut h = Harness::new(brew_settings());
    h.step(10);
    h.control_tick();
    assert!(!h.orchestrator.is_initialized());
    assert!(h.transport.writes.lock().unwrap().is_empty());
}

// ── Mode negotiation ──────────────────────────────────────────

#[test]
fn mode_change_commits_the_vetoed_value() {
    let mut h = Harness::with_veto(brew_settings(), Mode::Steam, Mode::Water);
    h.connect();

    h.orchestrator.set_mode(Mode::Steam).unwrap();
    assert_eq!(h.orchestrator.mode(), Mode::Water);
    assert_eq!(h.orchestrator.target_temp(), 80);
}

#[test]
fn mode_command_from_a_plugin_is_applied() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.handle_command(AppCommand::SetMode(Mode::Grind)).unwrap();
    assert_eq!(h.orchestrator.mode(), Mode::Grind);

    h.orchestrator.handle_command(AppCommand::Activate).unwrap();
    assert!(matches!(h.orchestrator.current(), Some(Process::Grind(_))));
    assert!(h.saw(topics::GRIND_START));
}

// ── Timers ────────────────────────────────────────────────────

#[test]
fn idle_machine_drops_to_standby() {
    let settings = Settings {
        standby_timeout_ms: 60_000,
        ..brew_settings()
    };
    let mut h = Harness::new(settings);
    h.connect();

    h.clock.set(50_000);
    h.orchestrator.set_mode(Mode::Water).unwrap();
    h.orchestrator.activate().unwrap();
    h.clock.set(55_000);
    h.orchestrator.deactivate().unwrap();

    h.clock.set(100_000);
    h.orchestrator.loop_once();
    assert_eq!(h.orchestrator.mode(), Mode::Water, "timer restarts on every action");

    h.clock.set(115_001);
    h.orchestrator.loop_once();
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
}

#[test]
fn grind_never_outlives_its_window() {
    let settings = Settings {
        target_grind_duration_ms: 60_000,
        ..brew_settings()
    };
    let mut h = Harness::new(settings);
    h.connect();
    h.orchestrator.activate_grind().unwrap();
    assert!(h.orchestrator.is_active());

    h.step(GRIND_ACTIVE_WINDOW_MS - 1_000);
    assert!(h.orchestrator.is_active());

    h.step(1_000);
    assert!(!h.orchestrator.is_active());
    assert!(h.saw(topics::GRIND_END));
}

#[test]
fn timed_brew_ends_and_is_kept_as_last() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();

    // Preinfusion 3 s + bloom 2 s + 25 s extraction.
    for _ in 0..121 {
        h.step(250);
    }
    assert!(!h.orchestrator.is_active());
    let last = h.orchestrator.last().expect("brew kept as last");
    assert_eq!(last.state(), ProcessState::Complete);
    assert_eq!(last.elapsed_ms(), 30_000);
}

// ── Delay learning ────────────────────────────────────────────

fn volumetric_brew(final_volume: f64) -> f64 {
    let settings = Settings {
        volumetric_target: true,
        target_volume: 100,
        ..brew_settings()
    };
    let mut h = Harness::new(settings);
    h.connect();
    h.orchestrator
        .handle_command(AppCommand::SetVolumetricAvailable(true))
        .unwrap();
    h.orchestrator.activate().unwrap();

    // Into the extraction phase with the cup still empty.
    h.clock.set(6_000);
    h.orchestrator.on_volumetric_measurement(0.0);
    h.orchestrator.loop_once();
    assert!(h.orchestrator.is_active());

    h.clock.set(7_000);
    h.orchestrator.on_volumetric_measurement(final_volume);
    h.orchestrator.loop_once();
    assert!(!h.orchestrator.is_active(), "target reached");
    assert_eq!(h.orchestrator.settings().brew_delay_ms, -1_000.0, "not learned while settling");

    h.clock.set(10_500);
    h.orchestrator.loop_once();
    h.orchestrator.settings().brew_delay_ms
}

#[test]
fn overshoot_moves_the_stop_earlier() {
    assert!(volumetric_brew(110.0) < -1_000.0);
}

#[test]
fn undershoot_moves_the_stop_later() {
    assert!(volumetric_brew(90.0) > -1_000.0);
}

#[test]
fn exact_hit_keeps_the_delay() {
    assert_eq!(volumetric_brew(100.0), -1_000.0);
}

// ── Autotune ──────────────────────────────────────────────────

#[test]
fn autotune_round_trip_stores_gains() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.orchestrator
        .handle_command(AppCommand::Autotune {
            test_time: 120,
            samples: 4,
        })
        .unwrap();
    assert!(h.orchestrator.is_autotuning());
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
    assert_eq!(h.orchestrator.target_temp(), 93);
    assert_eq!(h.transport.writes_to(Endpoint::Autotune), ["120,4"]);

    h.transport.clear();
    h.control_tick();
    assert_eq!(h.transport.writes_to(Endpoint::TemperatureControl).len(), 1);
    assert!(h.transport.writes_to(Endpoint::OutputControl).is_empty());

    h.notify(Endpoint::AutotuneResult, "3.1,42.5,0.25");
    h.step(10);
    assert!(!h.orchestrator.is_autotuning());
    assert_eq!(h.orchestrator.settings().pid, "3.100,42.500,0.250");
    assert!(h.saw(topics::AUTOTUNE_RESULT));
}

#[test]
fn failed_autotune_request_is_rolled_back() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.transport
        .fail_confirmed
        .store(true, std::sync::atomic::Ordering::Release);

    assert!(h.orchestrator.autotune(120, 4).is_err());
    assert!(!h.orchestrator.is_autotuning());
    assert!(!h.saw(topics::AUTOTUNE_START));
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn readings_are_offset_corrected() {
    let settings = Settings {
        temperature_offset: 3,
        ..brew_settings()
    };
    let mut h = Harness::new(settings);
    h.connect();

    h.notify(Endpoint::TemperatureRead, "95.5,8.25");
    h.step(10);
    assert_eq!(h.orchestrator.current_temp(), 92.5);
    assert_eq!(h.orchestrator.pressure(), 8.25);
    assert!(h.saw(topics::CURRENT_TEMPERATURE_CHANGE));
    assert!(h.saw(topics::PRESSURE_CHANGE));

    // The commanded setpoint carries the offset.
    h.control_tick();
    let out = h.transport.last_output().expect("idle output");
    assert_eq!(out.temperature, 96.0);
}

// ── Persistence and updates ───────────────────────────────────

#[test]
fn settings_changes_are_saved_after_debounce() {
    let mut h = Harness::new(brew_settings());
    h.connect();

    h.orchestrator
        .handle_command(AppCommand::SetTargetDuration(30_000))
        .unwrap();
    h.step(1_000);
    assert!(h.store.0.lock().unwrap().is_none());

    h.step(5_000);
    let saved = h.store.0.lock().unwrap().clone().expect("saved");
    assert_eq!(saved.target_duration_ms, 30_000);
    assert!(!h.orchestrator.is_settings_dirty());
}

#[test]
fn ota_update_parks_the_machine() {
    let mut h = Harness::new(brew_settings());
    h.connect();
    h.orchestrator.activate().unwrap();

    h.orchestrator.handle_command(AppCommand::StartOtaUpdate).unwrap();
    assert!(h.orchestrator.is_updating());
    assert!(!h.orchestrator.is_active());
    assert_eq!(h.orchestrator.mode(), Mode::Standby);

    h.orchestrator.set_mode(Mode::Brew).unwrap();
    h.orchestrator.activate().unwrap();
    assert!(!h.orchestrator.is_active(), "no brewing during an update");
}

#[test]
fn update_announced_on_the_bus_parks_the_machine() {
    let start = Arc::new(AtomicBool::new(false));
    let mut h = Harness::with_plugin(
        brew_settings(),
        Box::new(Updater {
            start: start.clone(),
        }),
    );
    h.connect();
    h.orchestrator.activate().unwrap();
    h.step(500);
    assert!(h.orchestrator.is_active());

    start.store(true, Ordering::Release);
    h.step(10);

    assert!(h.orchestrator.is_updating());
    assert!(!h.orchestrator.is_active());
    assert_eq!(h.orchestrator.mode(), Mode::Standby);
    assert!(h.saw(topics::BREW_END));

    h.control_tick();
    let out = h.transport.last_output().expect("parked output");
    assert!(!out.relay);
    assert_eq!(out.pump, 0.0);
}
