//! Wire codec for the controller board link.
//!
//! Every characteristic carries short comma-separated text with a fixed
//! number of positional fields:
//!
//! | Endpoint            | Direction | Payload                          |
//! |---------------------|-----------|----------------------------------|
//! | temperature-read    | notify    | `temp,pressure`                  |
//! | temperature-control | write     | `setpoint`                       |
//! | output-control      | write     | `relay,pump,temp`                |
//! |                     |           | `relay,pump,temp,pressure,1`     |
//! | alt-control         | write     | `0` / `1`                        |
//! | ping                | write     | empty                            |
//! | error               | notify    | `code`                           |
//! | autotune            | write     | `testTime,samples`               |
//! | autotune-result     | notify    | `Kp,Ki,Kd`                       |
//! | pid-control         | write     | `Kp,Ki,Kd`                       |
//! | brew/steam button   | notify    | `0` / `1`                        |
//! | pressure-scale      | write     | `scale`                          |
//! | info                | read      | `{"hw":…,"v":…,"cp":{"dm","ps"}}`|
//!
//! Floats are written with `Display`, which emits the shortest string that
//! parses back to the same value, so decode(encode(x)) == x exactly.
//! Decoders never panic: a wrong field count or non-numeric field is a
//! [`ProtocolError`].

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ProtocolError};

pub const SEPARATOR: char = ',';

// ───────────────────────────────────────────────────────────────
// Field helpers
// ───────────────────────────────────────────────────────────────

fn fields<const N: usize>(payload: &str) -> Result<[&str; N], ProtocolError> {
    let mut out = [""; N];
    let mut found = 0;
    for (i, field) in payload.split(SEPARATOR).enumerate() {
        if i < N {
            out[i] = field.trim();
        }
        found += 1;
    }
    if found == N {
        Ok(out)
    } else {
        Err(ProtocolError::FieldCount { expected: N, found })
    }
}

fn number(field: &str, index: usize) -> Result<f32, ProtocolError> {
    field
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(ProtocolError::InvalidNumber { index })
}

fn integer(field: &str, index: usize) -> Result<u32, ProtocolError> {
    field
        .parse::<u32>()
        .map_err(|_| ProtocolError::InvalidNumber { index })
}

fn flag(field: &str) -> Result<bool, ProtocolError> {
    match field {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ProtocolError::InvalidFlag),
    }
}

pub const fn encode_flag(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

/// Single `0`/`1` payload (buttons, alt-control).
pub fn decode_flag(payload: &str) -> Result<bool, ProtocolError> {
    let [f] = fields::<1>(payload)?;
    flag(f)
}

// ───────────────────────────────────────────────────────────────
// Output control
// ───────────────────────────────────────────────────────────────

/// Basic output command: valve relay, pump power (%), boiler setpoint (°C).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputCommand {
    pub relay: bool,
    pub pump: f32,
    pub temperature: f32,
}

impl OutputCommand {
    pub const OFF: Self = Self {
        relay: false,
        pump: 0.0,
        temperature: 0.0,
    };

    pub fn encode(&self) -> String {
        format!(
            "{},{},{}",
            encode_flag(self.relay),
            self.pump,
            self.temperature
        )
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let [relay, pump, temp] = fields::<3>(payload)?;
        Ok(Self {
            relay: flag(relay)?,
            pump: number(pump, 1)?,
            temperature: number(temp, 2)?,
        })
    }
}

/// Pressure-profiled output command. The trailing `1` marks the advanced form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedOutputCommand {
    pub relay: bool,
    pub pump: f32,
    pub temperature: f32,
    /// Target pressure in bar
    pub pressure: f32,
}

impl AdvancedOutputCommand {
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{},1",
            encode_flag(self.relay),
            self.pump,
            self.temperature,
            self.pressure
        )
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let [relay, pump, temp, pressure, marker] = fields::<5>(payload)?;
        if !flag(marker)? {
            return Err(ProtocolError::InvalidFlag);
        }
        Ok(Self {
            relay: flag(relay)?,
            pump: number(pump, 1)?,
            temperature: number(temp, 2)?,
            pressure: number(pressure, 3)?,
        })
    }
}

/// Heater setpoint (°C).
pub fn encode_setpoint(temperature: f32) -> String {
    format!("{temperature}")
}

pub fn decode_setpoint(payload: &str) -> Result<f32, ProtocolError> {
    let [t] = fields::<1>(payload)?;
    number(t, 0)
}

/// Pressure transducer full-scale value (bar).
pub fn encode_pressure_scale(scale: f32) -> String {
    format!("{scale}")
}

// ───────────────────────────────────────────────────────────────
// Telemetry / faults
// ───────────────────────────────────────────────────────────────

/// Boiler telemetry notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature: f32,
    pub pressure: f32,
}

impl SensorReading {
    pub fn encode(&self) -> String {
        format!("{},{}", self.temperature, self.pressure)
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let [temp, pressure] = fields::<2>(payload)?;
        Ok(Self {
            temperature: number(temp, 0)?,
            pressure: number(pressure, 1)?,
        })
    }
}

pub fn decode_error_code(payload: &str) -> Result<ErrorCode, ProtocolError> {
    let [code] = fields::<1>(payload)?;
    code.parse::<i32>()
        .map(ErrorCode::from_code)
        .map_err(|_| ProtocolError::InvalidNumber { index: 0 })
}

pub fn encode_error_code(code: ErrorCode) -> String {
    format!("{}", code.code())
}

// ───────────────────────────────────────────────────────────────
// PID / autotune
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub fn encode(&self) -> String {
        format!("{},{},{}", self.kp, self.ki, self.kd)
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let [kp, ki, kd] = fields::<3>(payload)?;
        Ok(Self {
            kp: number(kp, 0)?,
            ki: number(ki, 1)?,
            kd: number(kd, 2)?,
        })
    }

    /// Fixed three-decimal form stored in settings.
    pub fn to_setting(&self) -> String {
        format!("{:.3},{:.3},{:.3}", self.kp, self.ki, self.kd)
    }

    pub fn parse_setting(setting: &str) -> Result<Self, ProtocolError> {
        Self::decode(setting)
    }
}

/// Relay-feedback autotune request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutotuneRequest {
    /// Test duration in seconds
    pub test_time: u32,
    pub samples: u32,
}

impl AutotuneRequest {
    pub fn encode(&self) -> String {
        format!("{},{}", self.test_time, self.samples)
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let [time, samples] = fields::<2>(payload)?;
        Ok(Self {
            test_time: integer(time, 0)?,
            samples: integer(samples, 1)?,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Capability negotiation
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub dimming: bool,
    pub pressure: bool,
}

/// What the controller board reports about itself once after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub hardware: String,
    pub version: String,
    pub capabilities: Capabilities,
}

impl SystemInfo {
    /// Assumed when the board's info payload cannot be decoded.
    pub fn fallback() -> Self {
        Self {
            hardware: String::from("Standard 1.x"),
            version: String::from("v1.0.0"),
            capabilities: Capabilities::default(),
        }
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::fallback()
    }
}

#[derive(Serialize, Deserialize)]
struct InfoWire {
    hw: String,
    v: String,
    #[serde(default)]
    cp: CapsWire,
}

#[derive(Serialize, Deserialize, Default)]
struct CapsWire {
    #[serde(default)]
    dm: bool,
    #[serde(default)]
    ps: bool,
}

pub fn decode_info(payload: &str) -> Result<SystemInfo, ProtocolError> {
    let wire: InfoWire = serde_json::from_str(payload).map_err(|_| ProtocolError::InvalidInfo)?;
    Ok(SystemInfo {
        hardware: wire.hw,
        version: wire.v,
        capabilities: Capabilities {
            dimming: wire.cp.dm,
            pressure: wire.cp.ps,
        },
    })
}

pub fn encode_info(info: &SystemInfo) -> Result<String, ProtocolError> {
    let wire = InfoWire {
        hw: info.hardware.clone(),
        v: info.version.clone(),
        cp: CapsWire {
            dm: info.capabilities.dimming,
            ps: info.capabilities.pressure,
        },
    };
    serde_json::to_string(&wire).map_err(|_| ProtocolError::InvalidInfo)
}
