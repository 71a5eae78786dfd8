//! BrewDeck Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleClientTransport  NvsAdapter      Esp32TimeAdapter          │
//! │  (Transport)         (SettingsPort)  (ClockPort)               │
//! │  LogPlugin           StaticProfiles                            │
//! │  (Plugin)            (ProfileSource)                           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Orchestrator (event loop)                 │    │
//! │  │  Mode · Process · Event bus · Controller link          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Control task (APP core) · BT host callbacks (PRO core)        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use brewdeck::adapters::ble_client::BleClientTransport;
use brewdeck::adapters::log_plugin::LogPlugin;
use brewdeck::adapters::nvs::NvsAdapter;
use brewdeck::adapters::time::Esp32TimeAdapter;
use brewdeck::app::{Orchestrator, Ports};
use brewdeck::control_task;
use brewdeck::link::LinkInbox;
use brewdeck::profile::StaticProfiles;

/// Event-loop pass interval.
const LOOP_INTERVAL_MS: u64 = 10;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BrewDeck v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load settings from NVS (or defaults) ───────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let settings = nvs.load_or_default();
    let control_period = Duration::from_millis(u64::from(settings.control_interval_ms));

    // ── 3. Controller link transport ──────────────────────────
    let inbox = Arc::new(LinkInbox::new());
    let transport = Arc::new(BleClientTransport::new(inbox.clone())?);

    // ── 4. Orchestrator ───────────────────────────────────────
    let mut orchestrator = Orchestrator::new(
        settings,
        Ports {
            transport,
            inbox,
            settings: Box::new(nvs),
            profiles: Box::new(StaticProfiles::default()),
            clock: Box::new(Esp32TimeAdapter::new()),
        },
    );
    orchestrator.register_plugin(Box::new(LogPlugin::new()));
    orchestrator.setup()?;

    // ── 5. Control task ───────────────────────────────────────
    let _control = control_task::spawn(
        orchestrator.control_handle(),
        orchestrator.writer(),
        control_period,
    )?;

    // No display driver yet: the link starts on the first pass.
    orchestrator.on_screen_ready();

    info!("System ready. Entering event loop.");

    // ── 6. Event loop ─────────────────────────────────────────
    loop {
        orchestrator.loop_once();
        std::thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
    }
}
