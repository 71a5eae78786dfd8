//! Mock controller board and collaborators for integration tests.
//!
//! `RecordingTransport` stands in for the BLE client: scanning finds the
//! board immediately, every write is recorded, and the info read answers
//! with a configurable payload. Notifications are injected through the
//! shared `LinkInbox`, exactly as the radio callbacks would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use brewdeck::app::ports::{ClockPort, ConfigError, SettingsPort};
use brewdeck::app::{Orchestrator, Ports};
use brewdeck::bus::{Event, HandlerError, Outbox, Plugin};
use brewdeck::config::Settings;
use brewdeck::error::LinkError;
use brewdeck::link::protocol::OutputCommand;
use brewdeck::link::{Endpoint, LinkInbox, LinkSignal, Transport};
use brewdeck::mode::Mode;
use brewdeck::profile::StaticProfiles;

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub endpoint: Endpoint,
    pub payload: String,
    pub with_response: bool,
}

pub struct RecordingTransport {
    inbox: Arc<LinkInbox>,
    pub writes: Mutex<Vec<Write>>,
    pub info: Mutex<String>,
    pub fail_confirmed: AtomicBool,
    pub fail_unconfirmed: AtomicBool,
    connected: AtomicBool,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new(inbox: Arc<LinkInbox>) -> Self {
        Self {
            inbox,
            writes: Mutex::new(Vec::new()),
            info: Mutex::new(String::from(r#"{"hw":"GaggiMate Pro","v":"v1.4.0","cp":{"dm":true,"ps":true}}"#)),
            fail_confirmed: AtomicBool::new(false),
            fail_unconfirmed: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    pub fn set_info(&self, payload: &str) {
        *self.info.lock().unwrap() = payload.to_owned();
    }

    pub fn writes_to(&self, endpoint: Endpoint) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.endpoint == endpoint)
            .map(|w| w.payload.clone())
            .collect()
    }

    pub fn last_output(&self) -> Option<OutputCommand> {
        self.writes_to(Endpoint::OutputControl)
            .last()
            .and_then(|p| OutputCommand::decode(p).ok())
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn start_scan(&self) -> Result<(), LinkError> {
        self.inbox.push(LinkSignal::ServerFound);
        Ok(())
    }

    fn connect(&self) -> Result<(), LinkError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn subscribe(&self, _endpoint: Endpoint) -> Result<(), LinkError> {
        Ok(())
    }

    fn write(&self, endpoint: Endpoint, payload: &str, with_response: bool) -> Result<(), LinkError> {
        let fail = if with_response {
            &self.fail_confirmed
        } else {
            &self.fail_unconfirmed
        };
        if fail.load(Ordering::Acquire) {
            return Err(LinkError::WriteFailed);
        }
        self.writes.lock().unwrap().push(Write {
            endpoint,
            payload: payload.to_owned(),
            with_response,
        });
        Ok(())
    }

    fn read(&self, endpoint: Endpoint) -> Result<String, LinkError> {
        match endpoint {
            Endpoint::Info => Ok(self.info.lock().unwrap().clone()),
            _ => Err(LinkError::ReadFailed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ── Clock ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ManualClock(pub Arc<AtomicU64>);

#[allow(dead_code)]
impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Release);
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.0.fetch_add(ms, Ordering::AcqRel) + ms
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

// ── Settings store ────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryStore(pub Arc<Mutex<Option<Settings>>>);

impl SettingsPort for MemoryStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        self.0.lock().unwrap().clone().ok_or(ConfigError::NotFound)
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        *self.0.lock().unwrap() = Some(settings.clone());
        Ok(())
    }
}

// ── Event recorder plugin ─────────────────────────────────────

/// Records every topic it sees, optionally rewriting mode changes.
pub struct Recorder {
    pub topics: Arc<Mutex<Vec<String>>>,
    /// `(requested, replacement)` applied to `controller:mode:change`.
    pub mode_veto: Option<(Mode, Mode)>,
}

impl Plugin for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn handles(&self, _topic: &str) -> bool {
        true
    }

    fn on_event(&mut self, event: &mut Event) -> Result<(), HandlerError> {
        self.topics.lock().unwrap().push(event.topic().to_owned());
        if let Some((from, to)) = self.mode_veto {
            if event.topic() == brewdeck::bus::topics::MODE_CHANGE && event.get_int("value")? == from.value() {
                event.set("value", to.value());
            }
        }
        Ok(())
    }
}

// ── Firmware updater stand-in ─────────────────────────────────

/// Raises `ota:update:start` on its next tick once `start` is set.
pub struct Updater {
    pub start: Arc<AtomicBool>,
}

impl Plugin for Updater {
    fn name(&self) -> &'static str {
        "updater"
    }

    fn tick(&mut self, outbox: &mut Outbox) -> Result<(), HandlerError> {
        if self.start.swap(false, Ordering::AcqRel) {
            outbox.trigger(Event::new(brewdeck::bus::topics::OTA_UPDATE_START));
        }
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub transport: Arc<RecordingTransport>,
    pub inbox: Arc<LinkInbox>,
    pub clock: ManualClock,
    pub store: MemoryStore,
    pub topics: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(settings: Settings) -> Self {
        Self::build(settings, None, |_| {})
    }

    pub fn with_veto(settings: Settings, from: Mode, to: Mode) -> Self {
        Self::build(settings, Some((from, to)), |_| {})
    }

    /// Harness with one extra collaborator registered after the recorder.
    pub fn with_plugin(settings: Settings, plugin: Box<dyn Plugin>) -> Self {
        Self::assemble(settings, None, |_| {}, Some(plugin))
    }

    pub fn build(
        settings: Settings,
        mode_veto: Option<(Mode, Mode)>,
        configure: impl FnOnce(&RecordingTransport),
    ) -> Self {
        Self::assemble(settings, mode_veto, configure, None)
    }

    fn assemble(
        settings: Settings,
        mode_veto: Option<(Mode, Mode)>,
        configure: impl FnOnce(&RecordingTransport),
        extra: Option<Box<dyn Plugin>>,
    ) -> Self {
        let inbox = Arc::new(LinkInbox::new());
        let transport = Arc::new(RecordingTransport::new(inbox.clone()));
        configure(&transport);
        let clock = ManualClock::default();
        let store = MemoryStore::default();
        let topics = Arc::new(Mutex::new(Vec::new()));

        let mut orchestrator = Orchestrator::new(
            settings,
            Ports {
                transport: transport.clone(),
                inbox: inbox.clone(),
                settings: Box::new(store.clone()),
                profiles: Box::new(StaticProfiles::default()),
                clock: Box::new(clock.clone()),
            },
        );
        orchestrator.register_plugin(Box::new(Recorder {
            topics: topics.clone(),
            mode_veto,
        }));
        if let Some(plugin) = extra {
            orchestrator.register_plugin(plugin);
        }
        orchestrator.setup().unwrap();

        Self {
            orchestrator,
            transport,
            inbox,
            clock,
            store,
            topics,
        }
    }

    /// Start the link and run passes until the board is joined.
    pub fn connect(&mut self) {
        self.orchestrator.on_screen_ready();
        for _ in 0..3 {
            self.orchestrator.loop_once();
        }
        assert!(self.orchestrator.writer().is_ready(), "link should be ready");
    }

    pub fn notify(&self, endpoint: Endpoint, payload: &str) {
        assert!(self.inbox.notify(endpoint, payload.as_bytes()));
    }

    /// Advance the clock and run one pass.
    pub fn step(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.orchestrator.loop_once();
    }

    /// Run the control tick once against the real command writer.
    pub fn control_tick(&self) {
        let snapshot = self.orchestrator.control_handle().snapshot();
        brewdeck::app::control::tick(&snapshot, &self.orchestrator.writer());
    }

    pub fn saw(&self, topic: &str) -> bool {
        self.topics.lock().unwrap().iter().any(|t| t == topic)
    }

    pub fn count(&self, topic: &str) -> usize {
        self.topics.lock().unwrap().iter().filter(|t| *t == topic).count()
    }
}

pub fn brew_settings() -> Settings {
    Settings {
        startup_mode: Mode::Brew,
        ..Settings::default()
    }
}
