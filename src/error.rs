//! Unified error types for the BrewDeck display firmware.
//!
//! A single [`Error`] enum that every subsystem converts into, so the
//! orchestrator loop handles failures uniformly. Remote fault codes reported
//! by the controller board are modelled separately as [`ErrorCode`] because
//! they are data flowing through the system, not failures of this firmware.

use core::fmt;

use crate::bus::{BusError, EventError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible orchestrator operation funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An event handler aborted a trigger chain.
    Bus(BusError),
    /// An event payload did not carry the expected value.
    Event(EventError),
    /// The remote link failed to carry a request.
    Link(LinkError),
    /// A payload could not be decoded.
    Protocol(ProtocolError),
    /// Configuration is invalid or could not be persisted.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Event(e) => write!(f, "event: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<EventError> for Error {
    fn from(e: EventError) -> Self {
        Self::Event(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors (local transport failures)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Scanning for the controller board could not be started.
    ScanFailed,
    /// The GATT connection attempt failed.
    ConnectFailed,
    /// Subscribing to a notify endpoint failed.
    SubscribeFailed,
    /// A characteristic write was rejected or timed out.
    WriteFailed,
    /// A characteristic read was rejected or timed out.
    ReadFailed,
    /// The operation requires a connected link.
    NotConnected,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed => write!(f, "scan start failed"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SubscribeFailed => write!(f, "notify subscription failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors (payload decoding)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload split into the wrong number of positional fields.
    FieldCount { expected: usize, found: usize },
    /// Field at `index` is not a valid number.
    InvalidNumber { index: usize },
    /// A flag payload was neither `0` nor `1`.
    InvalidFlag,
    /// The capability JSON document could not be decoded.
    InvalidInfo,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            Self::InvalidNumber { index } => write!(f, "field {index} is not a number"),
            Self::InvalidFlag => write!(f, "flag must be 0 or 1"),
            Self::InvalidInfo => write!(f, "malformed system info"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Remote fault codes
// ---------------------------------------------------------------------------

/// Fault codes carried on the controller board's error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CommSend,
    CommReceive,
    ProtocolError,
    Runaway,
    Timeout,
    /// A code this firmware does not know. Treated as fatal.
    Other(i32),
}

impl ErrorCode {
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::CommSend,
            2 => Self::CommReceive,
            3 => Self::ProtocolError,
            4 => Self::Runaway,
            5 => Self::Timeout,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Self::CommSend => 1,
            Self::CommReceive => 2,
            Self::ProtocolError => 3,
            Self::Runaway => 4,
            Self::Timeout => 5,
            Self::Other(code) => code,
        }
    }

    /// Only a keepalive timeout is retried without latching. Every other
    /// code the board reports stops the machine.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommSend => write!(f, "send failure (1)"),
            Self::CommReceive => write!(f, "receive failure (2)"),
            Self::ProtocolError => write!(f, "protocol error (3)"),
            Self::Runaway => write!(f, "thermal runaway (4)"),
            Self::Timeout => write!(f, "link timeout (5)"),
            Self::Other(code) => write!(f, "unknown fault ({code})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

impl std::error::Error for Error {}
impl std::error::Error for LinkError {}
impl std::error::Error for ProtocolError {}
