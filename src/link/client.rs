//! Controller board link client.
//!
//! ```text
//!  Disconnected ──scan──▶ Discovering ──server found──▶ (ready for connection)
//!       ▲                                                   │ connect_to_server
//!       │                                                   ▼
//!       └──── link lost / failure ──── Ready ◀── SubscribingNotifications ◀── Connecting
//! ```
//!
//! [`ControllerLink`] is owned by the event loop. It drains the
//! [`LinkInbox`], turns notifications into [`LinkEvent`]s, keeps the link
//! alive with pings, and reports silence as a transient `Timeout`.
//! [`CommandWriter`] is the cloneable outbound handle used by the control
//! task; it drops writes while the link is not ready.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use super::inbox::{LinkInbox, LinkSignal};
use super::protocol::{
    self, AdvancedOutputCommand, AutotuneRequest, OutputCommand, PidGains, SensorReading,
    SystemInfo,
};
use super::transport::{Endpoint, Transport};
use crate::error::{Error, ErrorCode, LinkError, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Discovering,
    Connecting,
    SubscribingNotifications,
    Ready,
}

/// Decoded inbound traffic, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Sensor(SensorReading),
    BrewButton(bool),
    SteamButton(bool),
    /// Fault reported by the board, or raised locally (timeout, bad payload).
    RemoteError(ErrorCode),
    /// A local write on the link failed. Retried by the next ping or tick.
    SendFailed(LinkError),
    AutotuneResult(PidGains),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
}

impl From<&crate::config::Settings> for LinkTimings {
    fn from(s: &crate::config::Settings) -> Self {
        Self {
            ping_interval_ms: u64::from(s.ping_interval_ms),
            ping_timeout_ms: u64::from(s.ping_timeout_ms),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound handle for the control task
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget command writer. Commands are level-driven: the next
/// control tick re-sends the desired state, so failed writes are only logged.
#[derive(Clone)]
pub struct CommandWriter {
    transport: Arc<dyn Transport>,
    ready: Arc<AtomicBool>,
}

impl CommandWriter {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn send(&self, endpoint: Endpoint, payload: &str) {
        if !self.is_ready() {
            return;
        }
        if let Err(e) = self.transport.write(endpoint, payload, false) {
            debug!("link: {:?} write failed: {}", endpoint, e);
        }
    }

    pub fn send_output(&self, cmd: &OutputCommand) {
        self.send(Endpoint::OutputControl, &cmd.encode());
    }

    pub fn send_advanced_output(&self, cmd: &AdvancedOutputCommand) {
        self.send(Endpoint::OutputControl, &cmd.encode());
    }

    pub fn send_alt_control(&self, on: bool) {
        self.send(Endpoint::AltControl, protocol::encode_flag(on));
    }

    pub fn send_temperature_control(&self, setpoint: f32) {
        self.send(
            Endpoint::TemperatureControl,
            &protocol::encode_setpoint(setpoint),
        );
    }
}

// ───────────────────────────────────────────────────────────────
// Link client
// ───────────────────────────────────────────────────────────────

pub struct ControllerLink {
    transport: Arc<dyn Transport>,
    inbox: Arc<LinkInbox>,
    timings: LinkTimings,
    state: LinkState,
    server_found: bool,
    ready: Arc<AtomicBool>,
    last_ping_ms: u64,
    last_rx_ms: u64,
}

impl ControllerLink {
    pub fn new(transport: Arc<dyn Transport>, inbox: Arc<LinkInbox>, timings: LinkTimings) -> Self {
        Self {
            transport,
            inbox,
            timings,
            state: LinkState::Disconnected,
            server_found: false,
            ready: Arc::new(AtomicBool::new(false)),
            last_ping_ms: 0,
            last_rx_ms: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn timings(&self) -> LinkTimings {
        self.timings
    }

    /// Adopt new keepalive timings. Takes effect on the next poll.
    pub fn set_timings(&mut self, timings: LinkTimings) {
        if self.timings != timings {
            info!(
                "link: ping every {} ms, timeout {} ms",
                timings.ping_interval_ms, timings.ping_timeout_ms
            );
            self.timings = timings;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    /// The board has been discovered but not joined yet.
    pub fn is_ready_for_connection(&self) -> bool {
        self.state == LinkState::Discovering && self.server_found
    }

    pub fn writer(&self) -> CommandWriter {
        CommandWriter {
            transport: self.transport.clone(),
            ready: self.ready.clone(),
        }
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!("link: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
        self.ready
            .store(state == LinkState::Ready, Ordering::Release);
    }

    fn lost(&mut self) {
        self.server_found = false;
        self.set_state(LinkState::Disconnected);
    }

    /// Start scanning for the board.
    pub fn start_discovery(&mut self) -> Result<(), LinkError> {
        self.server_found = false;
        self.set_state(LinkState::Discovering);
        if let Err(e) = self.transport.start_scan() {
            self.lost();
            return Err(e);
        }
        Ok(())
    }

    /// Connect and subscribe to every notify endpoint. On any failure the
    /// link falls back to `Disconnected` and scanning restarts on the next
    /// poll.
    pub fn connect_to_server(&mut self, now_ms: u64) -> Result<(), LinkError> {
        if !self.is_ready_for_connection() {
            return Err(LinkError::NotConnected);
        }
        self.set_state(LinkState::Connecting);
        if let Err(e) = self.transport.connect() {
            self.lost();
            return Err(e);
        }
        self.set_state(LinkState::SubscribingNotifications);
        for endpoint in Endpoint::NOTIFY {
            if let Err(e) = self.transport.subscribe(endpoint) {
                warn!("link: subscribe {:?} failed: {}", endpoint, e);
                self.lost();
                return Err(e);
            }
        }
        self.last_ping_ms = now_ms;
        self.last_rx_ms = now_ms;
        self.set_state(LinkState::Ready);
        info!("link: controller ready");
        Ok(())
    }

    /// One-shot capability read.
    pub fn read_info(&self) -> Result<SystemInfo, Error> {
        if !self.is_ready() {
            return Err(LinkError::NotConnected.into());
        }
        let raw = self.transport.read(Endpoint::Info)?;
        Ok(protocol::decode_info(&raw)?)
    }

    fn write_confirmed(&self, endpoint: Endpoint, payload: &str) -> Result<(), LinkError> {
        if !self.is_ready() {
            return Err(LinkError::NotConnected);
        }
        self.transport.write(endpoint, payload, true)
    }

    pub fn send_autotune(&self, request: &AutotuneRequest) -> Result<(), LinkError> {
        self.write_confirmed(Endpoint::Autotune, &request.encode())
    }

    /// Send PID gains in their stored `"Kp,Ki,Kd"` form.
    pub fn send_pid_settings(&self, pid: &str) -> Result<(), LinkError> {
        self.write_confirmed(Endpoint::PidControl, pid)
    }

    pub fn set_pressure_scale(&self, scale: f32) -> Result<(), LinkError> {
        self.write_confirmed(
            Endpoint::PressureScale,
            &protocol::encode_pressure_scale(scale),
        )
    }

    /// Drain the inbox, restart discovery after a loss, and run keepalive.
    pub fn poll(&mut self, now_ms: u64) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Some(signal) = self.inbox.try_recv() {
            self.handle_signal(signal, now_ms, &mut events);
        }

        match self.state {
            LinkState::Disconnected => {
                if let Err(e) = self.start_discovery() {
                    warn!("link: scan start failed: {}", e);
                }
            }
            LinkState::Ready => self.keepalive(now_ms, &mut events),
            _ => {}
        }
        events
    }

    fn keepalive(&mut self, now_ms: u64, events: &mut Vec<LinkEvent>) {
        if now_ms.saturating_sub(self.last_ping_ms) >= self.timings.ping_interval_ms {
            self.last_ping_ms = now_ms;
            if let Err(e) = self.transport.write(Endpoint::Ping, "", false) {
                warn!("link: ping failed: {}", e);
                events.push(LinkEvent::SendFailed(e));
            }
        }
        if now_ms.saturating_sub(self.last_rx_ms) > self.timings.ping_timeout_ms {
            warn!("link: no traffic for {} ms", now_ms - self.last_rx_ms);
            self.last_rx_ms = now_ms;
            events.push(LinkEvent::RemoteError(ErrorCode::Timeout));
        }
    }

    fn handle_signal(&mut self, signal: LinkSignal, now_ms: u64, events: &mut Vec<LinkEvent>) {
        match signal {
            LinkSignal::ServerFound => {
                if self.state == LinkState::Discovering && !self.server_found {
                    info!("link: controller found");
                    self.server_found = true;
                }
            }
            LinkSignal::Disconnected => {
                if self.state != LinkState::Disconnected {
                    warn!("link: controller disconnected");
                    self.lost();
                    events.push(LinkEvent::Disconnected);
                }
            }
            LinkSignal::Notify { endpoint, payload } => {
                self.last_rx_ms = now_ms;
                match decode_notification(endpoint, &payload) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => debug!("link: ignoring notify on {:?}", endpoint),
                    Err(e) => {
                        warn!("link: bad {:?} payload: {}", endpoint, e);
                        events.push(LinkEvent::RemoteError(ErrorCode::ProtocolError));
                    }
                }
            }
            LinkSignal::Oversized { endpoint } => {
                self.last_rx_ms = now_ms;
                warn!("link: oversized {:?} payload", endpoint);
                events.push(LinkEvent::RemoteError(ErrorCode::ProtocolError));
            }
        }
    }
}

/// Decode a notification payload for `endpoint`.
pub fn decode_notification(
    endpoint: Endpoint,
    payload: &[u8],
) -> Result<Option<LinkEvent>, ProtocolError> {
    let text = core::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidNumber { index: 0 })?;
    let event = match endpoint {
        Endpoint::TemperatureRead => LinkEvent::Sensor(SensorReading::decode(text)?),
        Endpoint::Error => LinkEvent::RemoteError(protocol::decode_error_code(text)?),
        Endpoint::AutotuneResult => LinkEvent::AutotuneResult(PidGains::decode(text)?),
        Endpoint::BrewButton => LinkEvent::BrewButton(protocol::decode_flag(text)?),
        Endpoint::SteamButton => LinkEvent::SteamButton(protocol::decode_flag(text)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        writes: Mutex<Vec<(Endpoint, String)>>,
        subscribed: Mutex<Vec<Endpoint>>,
        fail_subscribe: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl Transport for FakeTransport {
        fn start_scan(&self) -> Result<(), LinkError> {
            Ok(())
        }
        fn connect(&self) -> Result<(), LinkError> {
            Ok(())
        }
        fn subscribe(&self, endpoint: Endpoint) -> Result<(), LinkError> {
            if self.fail_subscribe.load(Ordering::Relaxed) {
                return Err(LinkError::SubscribeFailed);
            }
            self.subscribed.lock().unwrap().push(endpoint);
            Ok(())
        }
        fn write(&self, endpoint: Endpoint, payload: &str, _: bool) -> Result<(), LinkError> {
            if self.fail_writes.load(Ordering::Relaxed) {
                return Err(LinkError::WriteFailed);
            }
            self.writes.lock().unwrap().push((endpoint, payload.to_owned()));
            Ok(())
        }
        fn read(&self, _endpoint: Endpoint) -> Result<String, LinkError> {
            Ok(String::from("{garbage"))
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    const TIMINGS: LinkTimings = LinkTimings {
        ping_interval_ms: 1_000,
        ping_timeout_ms: 5_000,
    };

    fn link() -> (ControllerLink, Arc<FakeTransport>, Arc<LinkInbox>) {
        let transport = Arc::new(FakeTransport::default());
        let inbox = Arc::new(LinkInbox::new());
        let link = ControllerLink::new(transport.clone(), inbox.clone(), TIMINGS);
        (link, transport, inbox)
    }

    fn connected() -> (ControllerLink, Arc<FakeTransport>, Arc<LinkInbox>) {
        let (mut link, t, inbox) = link();
        link.poll(0);
        inbox.push(LinkSignal::ServerFound);
        link.poll(0);
        link.connect_to_server(0).unwrap();
        (link, t, inbox)
    }

    #[test]
    fn lifecycle_reaches_ready_after_subscriptions() {
        let (mut link, t, inbox) = link();
        assert_eq!(link.state(), LinkState::Disconnected);
        link.poll(0);
        assert_eq!(link.state(), LinkState::Discovering);
        assert!(!link.is_ready_for_connection());

        inbox.push(LinkSignal::ServerFound);
        link.poll(10);
        assert!(link.is_ready_for_connection());
        assert!(!link.writer().is_ready());

        link.connect_to_server(20).unwrap();
        assert_eq!(link.state(), LinkState::Ready);
        assert!(link.writer().is_ready());
        assert_eq!(*t.subscribed.lock().unwrap(), Endpoint::NOTIFY);
    }

    #[test]
    fn subscribe_failure_falls_back_to_disconnected() {
        let (mut link, t, inbox) = link();
        link.poll(0);
        inbox.push(LinkSignal::ServerFound);
        link.poll(0);
        t.fail_subscribe.store(true, Ordering::Relaxed);
        assert_eq!(link.connect_to_server(0), Err(LinkError::SubscribeFailed));
        assert_eq!(link.state(), LinkState::Disconnected);
        link.poll(5);
        assert_eq!(link.state(), LinkState::Discovering);
    }

    #[test]
    fn disconnect_restarts_discovery() {
        let (mut link, _t, inbox) = connected();
        inbox.push(LinkSignal::Disconnected);
        let events = link.poll(100);
        assert_eq!(events, [LinkEvent::Disconnected]);
        assert_eq!(link.state(), LinkState::Discovering);
        assert!(!link.writer().is_ready());
    }

    #[test]
    fn pings_at_interval() {
        let (mut link, t, _inbox) = connected();
        link.poll(999);
        link.poll(1_000);
        link.poll(1_500);
        link.poll(2_000);
        let pings = t
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, p)| *e == Endpoint::Ping && p.is_empty())
            .count();
        assert_eq!(pings, 2);
    }

    #[test]
    fn failed_ping_is_a_local_send_failure() {
        let (mut link, t, inbox) = connected();
        t.fail_writes.store(true, Ordering::Relaxed);
        inbox.notify(Endpoint::TemperatureRead, b"93,0");
        let events = link.poll(1_000);
        assert_eq!(
            events,
            [
                LinkEvent::Sensor(SensorReading {
                    temperature: 93.0,
                    pressure: 0.0
                }),
                LinkEvent::SendFailed(LinkError::WriteFailed)
            ]
        );
    }

    #[test]
    fn new_timings_apply_on_next_poll() {
        let (mut link, t, _inbox) = connected();
        link.set_timings(LinkTimings {
            ping_interval_ms: 200,
            ping_timeout_ms: 5_000,
        });
        link.poll(200);
        link.poll(400);
        let pings = t
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == Endpoint::Ping)
            .count();
        assert_eq!(pings, 2);
    }

    #[test]
    fn silence_raises_transient_timeout_once_per_window() {
        let (mut link, _t, inbox) = connected();
        assert!(link.poll(5_000).is_empty());
        assert_eq!(
            link.poll(5_001),
            [LinkEvent::RemoteError(ErrorCode::Timeout)]
        );
        assert!(link.poll(6_000).is_empty());

        inbox.notify(Endpoint::TemperatureRead, b"93,0");
        assert_eq!(link.poll(9_000).len(), 1);
        assert!(link.poll(13_000).is_empty());
    }

    #[test]
    fn notifications_decode_in_order() {
        let (mut link, _t, inbox) = connected();
        inbox.notify(Endpoint::TemperatureRead, b"92.5,8.25");
        inbox.notify(Endpoint::BrewButton, b"1");
        inbox.notify(Endpoint::Error, b"4");
        inbox.notify(Endpoint::AutotuneResult, b"3.5,0.25,12");
        let events = link.poll(10);
        assert_eq!(
            events,
            [
                LinkEvent::Sensor(SensorReading {
                    temperature: 92.5,
                    pressure: 8.25
                }),
                LinkEvent::BrewButton(true),
                LinkEvent::RemoteError(ErrorCode::Runaway),
                LinkEvent::AutotuneResult(PidGains {
                    kp: 3.5,
                    ki: 0.25,
                    kd: 12.0
                }),
            ]
        );
    }

    #[test]
    fn malformed_notification_is_protocol_error() {
        let (mut link, _t, inbox) = connected();
        inbox.notify(Endpoint::TemperatureRead, b"92.5");
        inbox.notify(Endpoint::SteamButton, &[0xff, 0xfe]);
        assert_eq!(
            link.poll(10),
            [
                LinkEvent::RemoteError(ErrorCode::ProtocolError),
                LinkEvent::RemoteError(ErrorCode::ProtocolError)
            ]
        );
    }

    #[test]
    fn writer_is_silent_until_ready() {
        let (link, t, _inbox) = link();
        link.writer().send_output(&OutputCommand::OFF);
        assert!(t.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn writer_encodes_output() {
        let (link, t, _inbox) = connected();
        let w = link.writer();
        w.send_output(&OutputCommand {
            relay: true,
            pump: 100.0,
            temperature: 93.0,
        });
        w.send_alt_control(false);
        let writes = t.writes.lock().unwrap();
        assert_eq!(writes[0], (Endpoint::OutputControl, String::from("1,100,93")));
        assert_eq!(writes[1], (Endpoint::AltControl, String::from("0")));
    }

    #[test]
    fn bad_info_is_a_protocol_error() {
        let (link, _t, _inbox) = connected();
        assert_eq!(
            link.read_info(),
            Err(Error::Protocol(ProtocolError::InvalidInfo))
        );
    }
}
