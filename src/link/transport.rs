//! Transport abstraction for the controller board link.
//!
//! The link client is written against [`Transport`], so the Bluedroid GATT
//! client, the host simulation and test doubles are interchangeable.
//! Inbound traffic (discovery, disconnects, notifications) does not go
//! through this trait: implementations push it into the
//! [`LinkInbox`](super::inbox::LinkInbox) from their own callback context.

use crate::error::LinkError;

/// GATT service exposed by the controller board.
pub const SERVICE_UUID: u128 = 0xe75bc5b6_ff6e_4337_9d31_0c128f2e6e68;

/// One characteristic on the controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    TemperatureControl,
    OutputControl,
    AltControl,
    TemperatureRead,
    Ping,
    Error,
    Autotune,
    AutotuneResult,
    PidControl,
    BrewButton,
    SteamButton,
    Info,
    PressureScale,
}

impl Endpoint {
    /// Endpoints the board pushes data on. All must be subscribed before
    /// the link counts as ready.
    pub const NOTIFY: [Self; 5] = [
        Self::TemperatureRead,
        Self::Error,
        Self::AutotuneResult,
        Self::BrewButton,
        Self::SteamButton,
    ];

    pub const ALL: [Self; 13] = [
        Self::TemperatureControl,
        Self::OutputControl,
        Self::AltControl,
        Self::TemperatureRead,
        Self::Ping,
        Self::Error,
        Self::Autotune,
        Self::AutotuneResult,
        Self::PidControl,
        Self::BrewButton,
        Self::SteamButton,
        Self::Info,
        Self::PressureScale,
    ];

    pub const fn uuid(self) -> u128 {
        match self {
            Self::TemperatureControl => 0xfd668d9a_15d1_4968_aa29_deda8bb0e73a,
            Self::OutputControl => 0x1f0739ac_9638_4c4b_9665_5d7684d30249,
            Self::AltControl => 0xcca5a577_ec67_4499_8ccb_654f1312db1d,
            Self::TemperatureRead => 0x56887a3f_23fe_4181_afa5_8dad4d92721b,
            Self::Ping => 0x9731755e_29ce_41a8_91d9_7a244f49859b,
            Self::Error => 0xd6676ec7_820c_41de_820d_95620749003b,
            Self::Autotune => 0xd54df381_69b6_4531_b1cc_dde7766bbaf4,
            Self::AutotuneResult => 0x7f61607a_2817_4354_9b94_d49c057fc879,
            Self::PidControl => 0xd448c469_3e1d_4105_b5b8_75bf7d492fad,
            Self::BrewButton => 0xa29eb137_b33e_45a4_b1fc_15eb04e8ab39,
            Self::SteamButton => 0x53750675_4839_421e_971e_cc6823507d8e,
            Self::Info => 0xf8d7203b_e00c_48e2_83ba_37ff49cdba74,
            Self::PressureScale => 0xc7e6f5ca_ebfc_4ed8_96ae_c4afd13c4a11,
        }
    }

    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.uuid() == uuid)
    }
}

/// Outbound half of the link. Shared between the event loop and the
/// control task, hence `&self` methods and `Send + Sync`.
pub trait Transport: Send + Sync {
    /// Begin scanning for the controller board's service.
    fn start_scan(&self) -> Result<(), LinkError>;

    /// Open a GATT connection to the discovered board.
    fn connect(&self) -> Result<(), LinkError>;

    /// Enable notifications on `endpoint`.
    fn subscribe(&self, endpoint: Endpoint) -> Result<(), LinkError>;

    /// Write `payload` to `endpoint`. `with_response` requests a GATT
    /// write-with-response; commands use write-without-response.
    fn write(&self, endpoint: Endpoint, payload: &str, with_response: bool)
    -> Result<(), LinkError>;

    /// Blocking read of `endpoint`.
    fn read(&self, endpoint: Endpoint) -> Result<String, LinkError>;

    fn is_connected(&self) -> bool;
}

/// A transport that never finds a board. Useful as a default when the
/// radio is disabled.
pub struct NullTransport;

impl Transport for NullTransport {
    fn start_scan(&self) -> Result<(), LinkError> {
        Ok(())
    }

    fn connect(&self) -> Result<(), LinkError> {
        Err(LinkError::ConnectFailed)
    }

    fn subscribe(&self, _endpoint: Endpoint) -> Result<(), LinkError> {
        Err(LinkError::NotConnected)
    }

    fn write(&self, _endpoint: Endpoint, _payload: &str, _with_response: bool) -> Result<(), LinkError> {
        Err(LinkError::NotConnected)
    }

    fn read(&self, _endpoint: Endpoint) -> Result<String, LinkError> {
        Err(LinkError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}
