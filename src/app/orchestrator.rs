//! Orchestrator — the application core.
//!
//! [`Orchestrator`] owns the mode, the current and last [`Process`], the
//! event bus and the controller link. It runs on the event-loop thread and
//! is the only place processes are created, moved or dropped. Everything
//! the control task needs is published as a [`ControlSnapshot`].
//!
//! ```text
//!  plugins ──AppCommand──▶ ┌──────────────────────┐ ──events──▶ plugins
//!                          │     Orchestrator      │
//!  LinkInbox ──LinkEvent─▶ │ mode · process · err  │ ──snapshot──▶ control task
//!                          └──────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use crate::bus::{topics, EventBus, Plugin, Value};
use crate::config::{self, Settings};
use crate::error::{ErrorCode, Result};
use crate::link::protocol::{AutotuneRequest, PidGains, SystemInfo};
use crate::link::{CommandWriter, ControllerLink, LinkEvent, LinkInbox, LinkState, Transport};
use crate::mode::Mode;
use crate::process::{
    BrewProcess, GrindProcess, Process, ProcessTarget, SteamProcess, WaterProcess,
};

use super::buttons::{self, ButtonInput, ButtonStep};
use super::commands::AppCommand;
use super::control::{ControlSnapshot, SharedControl};
use super::ports::{ClockPort, ProfileSource, SettingsPort};

/// Setpoint the board tunes against.
pub const AUTOTUNE_TARGET_TEMP: i32 = 93;
/// Longest a grind may run before it is cut off, whatever its target.
pub const GRIND_ACTIVE_WINDOW_MS: u64 = 60_000;
/// Settings are written this long after the last change.
pub const SETTINGS_SAVE_DEBOUNCE_MS: u64 = 5_000;

/// Collaborators injected at construction.
pub struct Ports {
    pub transport: Arc<dyn Transport>,
    pub inbox: Arc<LinkInbox>,
    pub settings: Box<dyn SettingsPort>,
    pub profiles: Box<dyn ProfileSource>,
    pub clock: Box<dyn ClockPort>,
}

pub struct Orchestrator {
    bus: EventBus,
    link: ControllerLink,
    store: Box<dyn SettingsPort>,
    profiles: Box<dyn ProfileSource>,
    clock: Box<dyn ClockPort>,
    control: SharedControl,

    settings: Settings,
    settings_dirty_since: Option<u64>,

    mode: Mode,
    /// Mode restored when leaving standby.
    resume_mode: Mode,
    current: Option<Process>,
    last: Option<Process>,
    error: Option<ErrorCode>,
    updating: Arc<AtomicBool>,
    /// `ota:update:start` seen on the bus; park on the next pass.
    park_requested: Arc<AtomicBool>,
    profile_changed: Arc<AtomicBool>,
    autotuning: bool,
    /// Delay learning already ran (or was skipped) for `last`.
    process_completed: bool,
    volumetric_available: bool,

    system_info: SystemInfo,
    current_temp: f32,
    pressure: f32,

    last_action_ms: u64,
    last_progress_ms: u64,
    grind_active_until: Option<u64>,

    screen_ready: bool,
    initialized: bool,
    /// First successful link connection has been handled.
    loaded: bool,
}

impl Orchestrator {
    pub fn new(settings: Settings, ports: Ports) -> Self {
        let link = ControllerLink::new(ports.transport, ports.inbox, (&settings).into());
        let mode = settings.startup_mode;
        Self {
            bus: EventBus::new(),
            link,
            store: ports.settings,
            profiles: ports.profiles,
            clock: ports.clock,
            control: SharedControl::new(),
            settings,
            settings_dirty_since: None,
            mode,
            resume_mode: if mode == Mode::Standby { Mode::Brew } else { mode },
            current: None,
            last: None,
            error: None,
            updating: Arc::new(AtomicBool::new(false)),
            park_requested: Arc::new(AtomicBool::new(false)),
            profile_changed: Arc::new(AtomicBool::new(false)),
            autotuning: false,
            process_completed: true,
            volumetric_available: false,
            system_info: SystemInfo::fallback(),
            current_temp: 0.0,
            pressure: 0.0,
            last_action_ms: 0,
            last_progress_ms: 0,
            grind_active_until: None,
            screen_ready: false,
            initialized: false,
            loaded: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Add a collaborator. Must be called before [`setup`](Self::setup).
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.bus.register(plugin);
    }

    /// Subscribe the core's own handlers and run plugin setup.
    pub fn setup(&mut self) -> Result<()> {
        let updating = self.updating.clone();
        let park = self.park_requested.clone();
        self.bus.on(topics::OTA_UPDATE_START, move |_| {
            updating.store(true, Ordering::Release);
            park.store(true, Ordering::Release);
            Ok(())
        });
        let updating = self.updating.clone();
        self.bus.on(topics::OTA_UPDATE_END, move |_| {
            updating.store(false, Ordering::Release);
            Ok(())
        });
        for topic in [topics::PROFILE_SAVE, topics::PROFILE_SELECT] {
            let changed = self.profile_changed.clone();
            self.bus.on(topic, move |_| {
                changed.store(true, Ordering::Release);
                Ok(())
            });
        }

        let commands = self.bus.setup()?;
        for command in commands {
            self.run(command);
        }
        self.last_action_ms = self.clock.now_ms();
        info!(
            "orchestrator: set up with {} plugin(s), mode {}",
            self.bus.plugin_count(),
            self.mode
        );
        Ok(())
    }

    /// The display is up; the link starts on the next loop pass.
    pub fn on_screen_ready(&mut self) {
        self.screen_ready = true;
    }

    /// Start the controller link. Called once, after the screen is ready.
    pub fn connect(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        self.last_action_ms = self.clock.now_ms();
        self.bus.emit(topics::STARTUP)?;
        if let Err(e) = self.link.start_discovery() {
            warn!("orchestrator: link discovery failed: {}", e);
        }
        self.bus.emit(topics::BLUETOOTH_INIT)?;
        self.sync_control();
        Ok(())
    }

    /// One pass of the event loop.
    pub fn loop_once(&mut self) {
        let now = self.clock.now_ms();

        let outcome = self.bus.tick();
        for failure in &outcome.failures {
            debug!("orchestrator: {}", failure);
        }
        for command in outcome.commands {
            self.run(command);
        }

        if self.park_requested.swap(false, Ordering::AcqRel) {
            info!("orchestrator: firmware update started, parking");
            log_failure("ota park", self.activate_standby());
            self.sync_control();
        }

        if self.screen_ready && !self.initialized {
            log_failure("connect", self.connect());
        }
        if !self.initialized {
            return;
        }

        for event in self.link.poll(now) {
            log_failure("link event", self.handle_link_event(event));
        }
        if self.link.is_ready_for_connection() {
            log_failure("link connect", self.connect_controller(now));
        }

        if self.profile_changed.swap(false, Ordering::AcqRel) {
            log_failure("profile update", self.handle_profile_update());
        }

        if self.error.is_none() {
            log_failure("timers", self.run_timers(now));
        }

        self.auto_save_if_needed(now);
        self.sync_control();
    }

    fn run_timers(&mut self, now: u64) -> Result<()> {
        let interval = u64::from(self.settings.progress_interval_ms);
        if now.saturating_sub(self.last_progress_ms) >= interval {
            self.last_progress_ms = now;
            self.progress(now)?;
        }

        if self.grind_active_until.is_some_and(|until| now >= until) {
            warn!("orchestrator: grind window elapsed, stopping grinder");
            self.deactivate_grind()?;
        }

        if self.mode != Mode::Standby
            && !self.is_active()
            && now.saturating_sub(self.last_action_ms) > self.settings.standby_timeout_ms
        {
            info!("orchestrator: idle timeout, entering standby");
            self.activate_standby()?;
        }
        Ok(())
    }

    fn progress(&mut self, now: u64) -> Result<()> {
        if let Some(process) = self.current.as_mut() {
            process.progress(now);
            if !process.is_active() {
                self.deactivate()?;
            }
        }
        if let Some(last) = self.last.as_mut() {
            if !last.is_complete() {
                last.progress(now);
            }
        }
        self.learn_delay(now);
        Ok(())
    }

    /// Fold the last volumetric run's overshoot into the stored delay.
    fn learn_delay(&mut self, now: u64) {
        if self.process_completed {
            return;
        }
        let Some(last) = self.last.as_ref() else {
            return;
        };
        if !last.is_complete() {
            return;
        }
        self.process_completed = true;
        if !self.settings.delay_adjust {
            return;
        }
        let Some(delay) = last.new_delay_time() else {
            return;
        };
        match last.mode() {
            Mode::Brew => {
                info!(
                    "orchestrator: brew delay {:.0} -> {:.0} ms",
                    self.settings.brew_delay_ms, delay
                );
                self.settings.brew_delay_ms = delay;
            }
            Mode::Grind => {
                info!(
                    "orchestrator: grind delay {:.0} -> {:.0} ms",
                    self.settings.grind_delay_ms, delay
                );
                self.settings.grind_delay_ms = delay;
            }
            _ => return,
        }
        self.mark_settings_dirty(now);
    }

    /// Join the discovered board, read its capabilities and push the
    /// stored tuning on first connect.
    fn connect_controller(&mut self, now: u64) -> Result<()> {
        self.link.connect_to_server(now)?;
        self.system_info = match self.link.read_info() {
            Ok(info) => info,
            Err(e) => {
                warn!("orchestrator: info read failed ({}), assuming defaults", e);
                SystemInfo::fallback()
            }
        };
        info!(
            "orchestrator: controller {} {} (pressure: {})",
            self.system_info.hardware,
            self.system_info.version,
            self.system_info.capabilities.pressure
        );
        self.bus.emit(topics::BLUETOOTH_CONNECT)?;

        if !self.loaded {
            self.loaded = true;
            if self.settings.startup_mode == Mode::Standby {
                self.activate_standby()?;
            }
            if self.system_info.capabilities.pressure {
                if let Err(e) = self.link.set_pressure_scale(self.settings.pressure_scaling) {
                    warn!("orchestrator: pressure scale not sent: {}", e);
                }
            }
            if let Err(e) = self.link.send_pid_settings(&self.settings.pid) {
                warn!("orchestrator: PID settings not sent: {}", e);
            }
            self.bus.emit(topics::READY)?;
        }
        self.sync_control();
        Ok(())
    }

    // ── Process control ───────────────────────────────────────

    /// Not updating, no latched fault, not autotuning.
    pub fn is_ready(&self) -> bool {
        !self.updating.load(Ordering::Acquire) && self.error.is_none() && !self.autotuning
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(Process::is_active)
    }

    fn brew_target(&self) -> ProcessTarget {
        if self.settings.volumetric_target && self.volumetric_available {
            ProcessTarget::Volumetric
        } else {
            ProcessTarget::Time
        }
    }

    fn start_process(&mut self, mut process: Process) {
        let now = self.clock.now_ms();
        process.start(now);
        info!("orchestrator: {} started", process.mode());
        self.current = Some(process);
        self.process_completed = false;
        self.last_action_ms = now;
        self.sync_control();
    }

    /// Start the process for the current mode.
    pub fn activate(&mut self) -> Result<()> {
        if self.is_active() || !self.is_ready() {
            return Ok(());
        }
        let process = match self.mode {
            Mode::Brew => Process::Brew(BrewProcess::new(
                self.profiles.selected(),
                self.brew_target(),
                self.settings.target_duration_ms,
                f64::from(self.settings.target_volume),
                self.settings.brew_delay_ms,
            )),
            Mode::Steam => Process::Steam(SteamProcess::new(self.settings.steam_pump_percent)),
            Mode::Water => Process::Water(WaterProcess::new()),
            Mode::Grind => return self.activate_grind(),
            Mode::Standby => return Ok(()),
        };
        self.clear()?;
        self.start_process(process);
        if self.mode == Mode::Brew {
            self.bus.emit(topics::BREW_START)?;
        }
        Ok(())
    }

    /// Stop the current process and keep it as the last one.
    pub fn deactivate(&mut self) -> Result<()> {
        let Some(mut process) = self.current.take() else {
            return Ok(());
        };
        let now = self.clock.now_ms();
        process.stop(now);
        let mode = process.mode();
        info!("orchestrator: {} ended after {} ms", mode, process.elapsed_ms());
        self.last = Some(process);
        if mode == Mode::Grind {
            self.grind_active_until = None;
        }
        self.last_action_ms = now;
        self.sync_control();
        match mode {
            Mode::Brew => {
                self.bus.emit(topics::BREW_END)?;
            }
            Mode::Grind => {
                self.bus.emit(topics::GRIND_END)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Forget the last process.
    pub fn clear(&mut self) -> Result<()> {
        self.process_completed = true;
        if let Some(last) = self.last.take() {
            if last.mode() == Mode::Brew {
                self.bus.emit(topics::BREW_CLEAR)?;
            }
        }
        Ok(())
    }

    pub fn activate_grind(&mut self) -> Result<()> {
        if self.is_active() || !self.is_ready() {
            return Ok(());
        }
        self.clear()?;
        let process = Process::Grind(GrindProcess::new(
            self.brew_target(),
            self.settings.target_grind_duration_ms,
            f64::from(self.settings.target_grind_volume),
            self.settings.grind_delay_ms,
        ));
        self.start_process(process);
        self.grind_active_until = Some(self.clock.now_ms() + GRIND_ACTIVE_WINDOW_MS);
        self.bus.emit(topics::GRIND_START)?;
        Ok(())
    }

    pub fn deactivate_grind(&mut self) -> Result<()> {
        self.deactivate()?;
        self.clear()
    }

    pub fn activate_standby(&mut self) -> Result<()> {
        self.set_mode(Mode::Standby)?;
        self.deactivate()
    }

    pub fn deactivate_standby(&mut self) -> Result<()> {
        self.set_mode(self.resume_mode)
    }

    /// Request a mode change. Handlers on `controller:mode:change` may
    /// rewrite `value`; the rewritten mode is committed.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let event = self.bus.trigger_value(topics::MODE_CHANGE, mode.value())?;
        let value = event.get_int("value")?;
        let committed = Mode::from_value(value).unwrap_or_else(|| {
            warn!("orchestrator: mode value {} rejected", value);
            self.mode
        });
        if committed != mode {
            debug!("orchestrator: mode {} adjusted to {}", mode, committed);
        }
        self.mode = committed;
        if committed != Mode::Standby {
            self.resume_mode = committed;
        }
        self.last_action_ms = self.clock.now_ms();
        self.set_target_temp(self.target_temp())
    }

    pub fn autotune(&mut self, test_time: u32, samples: u32) -> Result<()> {
        if self.is_active() || !self.is_ready() {
            return Ok(());
        }
        if self.mode != Mode::Standby {
            self.activate_standby()?;
        }
        self.autotuning = true;
        self.sync_control();
        let request = AutotuneRequest { test_time, samples };
        if let Err(e) = self.link.send_autotune(&request) {
            self.autotuning = false;
            self.sync_control();
            return Err(e.into());
        }
        info!("orchestrator: autotune started ({} s, {} samples)", test_time, samples);
        self.bus.emit(topics::AUTOTUNE_START)?;
        Ok(())
    }

    // ── Targets ───────────────────────────────────────────────

    /// Boiler target for the current mode.
    pub fn target_temp(&self) -> i32 {
        if self.autotuning {
            return AUTOTUNE_TARGET_TEMP;
        }
        match self.mode {
            Mode::Brew | Mode::Grind => self.profiles.selected().temperature,
            Mode::Steam => self.settings.target_steam_temp,
            Mode::Water => self.settings.target_water_temp,
            Mode::Standby => 0,
        }
    }

    pub fn set_target_temp(&mut self, temperature: i32) -> Result<()> {
        let event = self
            .bus
            .trigger_value(topics::TARGET_TEMPERATURE_CHANGE, temperature)?;
        let value = clamp_i64(event.get_int("value")?, config::MIN_TEMP, config::MAX_TEMP);
        if !self.autotuning {
            let now = self.clock.now_ms();
            match self.mode {
                Mode::Brew | Mode::Grind => {
                    if self.profiles.selected().temperature != value {
                        self.profiles.set_selected_temperature(value);
                    }
                }
                Mode::Steam if self.settings.target_steam_temp != value => {
                    self.settings.target_steam_temp = value;
                    self.mark_settings_dirty(now);
                }
                Mode::Water if self.settings.target_water_temp != value => {
                    self.settings.target_water_temp = value;
                    self.mark_settings_dirty(now);
                }
                _ => {}
            }
        }
        self.sync_control();
        Ok(())
    }

    pub fn raise_temp(&mut self) -> Result<()> {
        let t = (self.target_temp() + 1).min(config::MAX_TEMP);
        self.set_target_temp(t)
    }

    pub fn lower_temp(&mut self) -> Result<()> {
        let t = (self.target_temp() - 1).max(config::MIN_TEMP);
        self.set_target_temp(t)
    }

    /// Raise `topic` with `value` and return the handlers' (clamped) answer.
    fn negotiate(&mut self, topic: &str, value: u32, min: u32, max: u32) -> Result<u32> {
        let event = self.bus.trigger_value(topic, value)?;
        let v = clamp_i64(event.get_int("value")?, min as i32, max as i32);
        Ok(v as u32)
    }

    pub fn set_target_duration(&mut self, ms: u32) -> Result<()> {
        let v = self.negotiate(
            topics::TARGET_DURATION_CHANGE,
            ms,
            config::BREW_MIN_DURATION_MS,
            config::BREW_MAX_DURATION_MS,
        )?;
        self.settings.target_duration_ms = v;
        self.mark_settings_dirty(self.clock.now_ms());
        Ok(())
    }

    pub fn set_target_volume(&mut self, volume: u32) -> Result<()> {
        let v = self.negotiate(
            topics::TARGET_VOLUME_CHANGE,
            volume,
            config::BREW_MIN_VOLUME,
            config::BREW_MAX_VOLUME,
        )?;
        self.settings.target_volume = v;
        self.mark_settings_dirty(self.clock.now_ms());
        Ok(())
    }

    pub fn set_target_grind_duration(&mut self, ms: u32) -> Result<()> {
        let v = self.negotiate(
            topics::GRIND_DURATION_CHANGE,
            ms,
            config::GRIND_MIN_DURATION_MS,
            config::GRIND_MAX_DURATION_MS,
        )?;
        self.settings.target_grind_duration_ms = v;
        self.mark_settings_dirty(self.clock.now_ms());
        Ok(())
    }

    pub fn set_target_grind_volume(&mut self, volume: u32) -> Result<()> {
        let v = self.negotiate(
            topics::GRIND_VOLUME_CHANGE,
            volume,
            config::GRIND_MIN_VOLUME,
            config::GRIND_MAX_VOLUME,
        )?;
        self.settings.target_grind_volume = v;
        self.mark_settings_dirty(self.clock.now_ms());
        Ok(())
    }

    pub fn raise_brew_target(&mut self) -> Result<()> {
        if self.brew_target() == ProcessTarget::Volumetric {
            self.set_target_volume(self.settings.target_volume.saturating_add(config::VOLUME_STEP))
        } else {
            self.set_target_duration(
                self.settings
                    .target_duration_ms
                    .saturating_add(config::DURATION_STEP_MS),
            )
        }
    }

    pub fn lower_brew_target(&mut self) -> Result<()> {
        if self.brew_target() == ProcessTarget::Volumetric {
            self.set_target_volume(self.settings.target_volume.saturating_sub(config::VOLUME_STEP))
        } else {
            self.set_target_duration(
                self.settings
                    .target_duration_ms
                    .saturating_sub(config::DURATION_STEP_MS),
            )
        }
    }

    pub fn raise_grind_target(&mut self) -> Result<()> {
        if self.brew_target() == ProcessTarget::Volumetric {
            self.set_target_grind_volume(
                self.settings
                    .target_grind_volume
                    .saturating_add(config::VOLUME_STEP),
            )
        } else {
            self.set_target_grind_duration(
                self.settings
                    .target_grind_duration_ms
                    .saturating_add(config::DURATION_STEP_MS),
            )
        }
    }

    pub fn lower_grind_target(&mut self) -> Result<()> {
        if self.brew_target() == ProcessTarget::Volumetric {
            self.set_target_grind_volume(
                self.settings
                    .target_grind_volume
                    .saturating_sub(config::VOLUME_STEP),
            )
        } else {
            self.set_target_grind_duration(
                self.settings
                    .target_grind_duration_ms
                    .saturating_sub(config::DURATION_STEP_MS),
            )
        }
    }

    // ── Inbound traffic ───────────────────────────────────────

    fn handle_link_event(&mut self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Sensor(reading) => {
                self.on_temp_read(reading.temperature)?;
                self.pressure = reading.pressure;
                self.bus
                    .trigger_value(topics::PRESSURE_CHANGE, reading.pressure)?;
                Ok(())
            }
            LinkEvent::BrewButton(pressed) => self.handle_brew_button(pressed),
            LinkEvent::SteamButton(pressed) => self.handle_steam_button(pressed),
            LinkEvent::RemoteError(code) => self.handle_remote_error(code),
            LinkEvent::SendFailed(e) => {
                debug!("orchestrator: link write failed ({}), retrying", e);
                Ok(())
            }
            LinkEvent::AutotuneResult(gains) => self.on_autotune_result(gains),
            LinkEvent::Disconnected => {
                self.bus.emit(topics::BLUETOOTH_DISCONNECT)?;
                Ok(())
            }
        }
    }

    fn on_temp_read(&mut self, temperature: f32) -> Result<()> {
        self.current_temp = temperature - self.settings.temperature_offset as f32;
        self.bus
            .trigger_value(topics::CURRENT_TEMPERATURE_CHANGE, self.current_temp)?;
        Ok(())
    }

    fn on_autotune_result(&mut self, gains: PidGains) -> Result<()> {
        info!(
            "orchestrator: autotune result {:.3}, {:.3}, {:.3}",
            gains.kp, gains.ki, gains.kd
        );
        self.settings.pid = gains.to_setting();
        self.mark_settings_dirty(self.clock.now_ms());
        self.autotuning = false;
        self.sync_control();
        self.bus.trigger(
            topics::AUTOTUNE_RESULT,
            [
                ("kp", Value::from(gains.kp)),
                ("ki", Value::from(gains.ki)),
                ("kd", Value::from(gains.kd)),
            ],
        )?;
        Ok(())
    }

    /// Classify a fault from the board (or the link itself).
    ///
    /// Transient codes are only logged. Anything else stops the machine,
    /// forces standby even over a mode veto, and stays latched until
    /// [`acknowledge_error`](Self::acknowledge_error).
    pub fn handle_remote_error(&mut self, code: ErrorCode) -> Result<()> {
        if code.is_transient() {
            warn!("orchestrator: transient controller fault {}", code);
            return Ok(());
        }
        if self.error == Some(code) {
            debug!("orchestrator: fault {} already latched", code);
            return Ok(());
        }
        error!("orchestrator: controller fault {}, entering standby", code);
        self.error = Some(code);

        let stopped = self.deactivate();
        let standby = self.set_mode(Mode::Standby);
        if self.mode != Mode::Standby {
            self.mode = Mode::Standby;
        }
        self.sync_control();
        let raised = self.bus.trigger_value(topics::ERROR, code.code()).map(drop);

        stopped.and(standby).and(raised.map_err(Into::into))
    }

    /// Clear a latched fault.
    pub fn acknowledge_error(&mut self) -> Result<()> {
        if let Some(code) = self.error.take() {
            info!("orchestrator: fault {} acknowledged", code);
            self.sync_control();
            self.bus.emit(topics::ERROR_CLEAR)?;
        }
        Ok(())
    }

    pub fn handle_brew_button(&mut self, pressed: bool) -> Result<()> {
        debug!("orchestrator: brew button {} in {}", pressed, self.mode);
        let steps = buttons::brew_button(self.mode, self.is_active(), self.button(pressed));
        self.run_steps(steps)
    }

    pub fn handle_steam_button(&mut self, pressed: bool) -> Result<()> {
        debug!("orchestrator: steam button {} in {}", pressed, self.mode);
        let steps = buttons::steam_button(self.mode, self.button(pressed));
        self.run_steps(steps)
    }

    fn button(&self, pressed: bool) -> ButtonInput {
        ButtonInput {
            pressed,
            momentary: self.settings.momentary_buttons,
        }
    }

    fn run_steps(&mut self, steps: &[ButtonStep]) -> Result<()> {
        for step in steps {
            match step {
                ButtonStep::ExitStandby => self.deactivate_standby()?,
                ButtonStep::Clear => self.clear()?,
                ButtonStep::Activate => self.activate()?,
                ButtonStep::Deactivate => self.deactivate()?,
                ButtonStep::EnterSteam => self.set_mode(Mode::Steam)?,
            }
        }
        Ok(())
    }

    /// Apply a scale reading to the running and the settling process.
    pub fn on_volumetric_measurement(&mut self, volume: f64) {
        let now = self.clock.now_ms();
        if let Some(p) = self.current.as_mut() {
            p.update_volume(volume, now);
        }
        if let Some(p) = self.last.as_mut() {
            p.update_volume(volume, now);
        }
    }

    pub fn set_volumetric_available(&mut self, available: bool) {
        if self.volumetric_available != available {
            info!("orchestrator: scale {}", if available { "connected" } else { "lost" });
        }
        self.volumetric_available = available;
    }

    pub fn set_volumetric_target(&mut self, enabled: bool) {
        self.settings.volumetric_target = enabled;
        self.mark_settings_dirty(self.clock.now_ms());
    }

    /// Park the machine before a firmware update. Processes stay blocked
    /// until `ota:update:end`.
    pub fn on_ota_update(&mut self) -> Result<()> {
        self.activate_standby()?;
        self.updating.store(true, Ordering::Release);
        self.sync_control();
        self.bus.emit(topics::OTA_UPDATE_START)?;
        self.park_requested.store(false, Ordering::Release);
        Ok(())
    }

    fn handle_profile_update(&mut self) -> Result<()> {
        let temperature = self.profiles.selected().temperature;
        self.bus
            .trigger_value(topics::TARGET_TEMPERATURE_CHANGE, temperature)?;
        self.sync_control();
        Ok(())
    }

    /// Validate and adopt new settings.
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.link.set_timings((&settings).into());
        self.settings = settings;
        self.mark_settings_dirty(self.clock.now_ms());
        self.sync_control();
        info!("orchestrator: settings updated");
        Ok(())
    }

    // ── Commands ──────────────────────────────────────────────

    /// Execute a command from a collaborator.
    pub fn handle_command(&mut self, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Activate => self.activate(),
            AppCommand::Deactivate => self.deactivate(),
            AppCommand::Clear => self.clear(),
            AppCommand::ActivateGrind => self.activate_grind(),
            AppCommand::DeactivateGrind => self.deactivate_grind(),
            AppCommand::ActivateStandby => self.activate_standby(),
            AppCommand::DeactivateStandby => self.deactivate_standby(),
            AppCommand::SetMode(mode) => self.set_mode(mode),
            AppCommand::SetTargetTemp(t) => self.set_target_temp(t),
            AppCommand::RaiseTemp => self.raise_temp(),
            AppCommand::LowerTemp => self.lower_temp(),
            AppCommand::SetTargetDuration(ms) => self.set_target_duration(ms),
            AppCommand::SetTargetVolume(v) => self.set_target_volume(v),
            AppCommand::SetTargetGrindDuration(ms) => self.set_target_grind_duration(ms),
            AppCommand::SetTargetGrindVolume(v) => self.set_target_grind_volume(v),
            AppCommand::RaiseBrewTarget => self.raise_brew_target(),
            AppCommand::LowerBrewTarget => self.lower_brew_target(),
            AppCommand::RaiseGrindTarget => self.raise_grind_target(),
            AppCommand::LowerGrindTarget => self.lower_grind_target(),
            AppCommand::Autotune { test_time, samples } => self.autotune(test_time, samples),
            AppCommand::VolumetricMeasurement(v) => {
                self.on_volumetric_measurement(v);
                Ok(())
            }
            AppCommand::SetVolumetricAvailable(on) => {
                self.set_volumetric_available(on);
                Ok(())
            }
            AppCommand::SetVolumetricTarget(on) => {
                self.set_volumetric_target(on);
                Ok(())
            }
            AppCommand::AcknowledgeError => self.acknowledge_error(),
            AppCommand::StartOtaUpdate => self.on_ota_update(),
            AppCommand::UpdateSettings(settings) => self.update_settings(*settings),
            AppCommand::SaveSettings => {
                self.save_settings();
                Ok(())
            }
            AppCommand::ScreenReady => {
                self.on_screen_ready();
                Ok(())
            }
            AppCommand::WifiConnected { ap_mode } => {
                self.bus
                    .trigger(topics::WIFI_CONNECT, [("AP", Value::from(ap_mode))])?;
                Ok(())
            }
            AppCommand::WifiDisconnected => {
                self.bus.emit(topics::WIFI_DISCONNECT)?;
                Ok(())
            }
        }
    }

    fn run(&mut self, command: AppCommand) {
        debug!("orchestrator: command {:?}", command);
        log_failure("command", self.handle_command(command));
    }

    // ── Settings persistence ──────────────────────────────────

    fn mark_settings_dirty(&mut self, now: u64) {
        if self.settings_dirty_since.is_none() {
            self.settings_dirty_since = Some(now);
        }
    }

    /// Write settings once they have been stable for the debounce period.
    /// Returns `true` when a save happened.
    pub fn auto_save_if_needed(&mut self, now: u64) -> bool {
        match self.settings_dirty_since {
            Some(since) if now.saturating_sub(since) >= SETTINGS_SAVE_DEBOUNCE_MS => {
                self.save_settings()
            }
            _ => false,
        }
    }

    /// Persist immediately if anything changed.
    pub fn save_settings(&mut self) -> bool {
        if self.settings_dirty_since.is_none() {
            return false;
        }
        match self.store.save(&self.settings) {
            Ok(()) => {
                self.settings_dirty_since = None;
                info!("orchestrator: settings saved");
                true
            }
            Err(e) => {
                warn!("orchestrator: settings save failed: {}", e);
                false
            }
        }
    }

    pub fn is_settings_dirty(&self) -> bool {
        self.settings_dirty_since.is_some()
    }

    // ── Control hand-off ──────────────────────────────────────

    fn sync_control(&self) {
        self.control.publish(ControlSnapshot {
            initialized: self.initialized,
            mode: self.mode,
            target_temp: self.target_temp(),
            temperature_offset: self.settings.temperature_offset,
            autotuning: self.autotuning,
            process: self.current.clone(),
            pressure_capable: self.system_info.capabilities.pressure,
        });
    }

    /// Handle for the control task.
    pub fn control_handle(&self) -> SharedControl {
        self.control.clone()
    }

    pub fn writer(&self) -> CommandWriter {
        self.link.writer()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn current(&self) -> Option<&Process> {
        self.current.as_ref()
    }

    pub fn last(&self) -> Option<&Process> {
        self.last.as_ref()
    }

    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    pub fn is_autotuning(&self) -> bool {
        self.autotuning
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn system_info(&self) -> &SystemInfo {
        &self.system_info
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Offset-corrected boiler temperature.
    pub fn current_temp(&self) -> f32 {
        self.current_temp
    }

    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn clamp_i64(value: i64, min: i32, max: i32) -> i32 {
    value.clamp(i64::from(min), i64::from(max)) as i32
}

fn log_failure(what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("orchestrator: {} failed: {}", what, e);
    }
}
