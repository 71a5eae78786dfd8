//! BLE GATT client transport to the controller board.
//!
//! Implements [`Transport`] on top of the Bluedroid GATT client.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GAP scanner + GATTC via `esp_idf_svc::sys`.
//! - **all other targets**: simulation that finds a board immediately and
//!   answers the info read with a default payload.
//!
//! Bluedroid callbacks are C function pointers that cannot capture Rust
//! closures, so connection state lives in static atomics and inbound
//! traffic is pushed straight into the [`LinkInbox`]. Blocking calls
//! (`connect`, `read`) wait on those statics from the event-loop task.

use std::sync::Arc;

use log::info;

use crate::error::LinkError;
use crate::link::transport::{Endpoint, SERVICE_UUID};
use crate::link::{LinkInbox, LinkSignal, Transport};

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

#[cfg(target_os = "espidf")]
use log::{error, warn};

/// How long blocking GATT operations wait for their completion event.
#[cfg(target_os = "espidf")]
const GATT_TIMEOUT_MS: u32 = 5_000;
#[cfg(target_os = "espidf")]
const SCAN_DURATION_S: u32 = 30;

// ── ESP-IDF static state ──────────────────────────────────────

#[cfg(target_os = "espidf")]
static INBOX: std::sync::OnceLock<Arc<LinkInbox>> = std::sync::OnceLock::new();
#[cfg(target_os = "espidf")]
static GATTC_IF: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static CONN_ID: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static SEARCH_DONE: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static SVC_START: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static SVC_END: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static SERVER_ADDR: std::sync::Mutex<Option<[u8; 6]>> = std::sync::Mutex::new(None);
#[cfg(target_os = "espidf")]
static READ_RESULT: std::sync::Mutex<Option<Result<Vec<u8>, LinkError>>> =
    std::sync::Mutex::new(None);

#[cfg(target_os = "espidf")]
#[allow(clippy::declare_interior_mutable_const)]
const NO_HANDLE: AtomicU16 = AtomicU16::new(0);
/// Attribute handle per endpoint, indexed like [`Endpoint::ALL`].
#[cfg(target_os = "espidf")]
static HANDLES: [AtomicU16; Endpoint::ALL.len()] = [NO_HANDLE; Endpoint::ALL.len()];

#[cfg(target_os = "espidf")]
fn endpoint_index(endpoint: Endpoint) -> usize {
    Endpoint::ALL
        .iter()
        .position(|e| *e == endpoint)
        .unwrap_or_default()
}

#[cfg(target_os = "espidf")]
fn handle_of(endpoint: Endpoint) -> Option<u16> {
    match HANDLES[endpoint_index(endpoint)].load(Ordering::Acquire) {
        0 => None,
        h => Some(h),
    }
}

#[cfg(target_os = "espidf")]
fn endpoint_for_handle(handle: u16) -> Option<Endpoint> {
    Endpoint::ALL
        .into_iter()
        .find(|e| handle_of(*e) == Some(handle))
}

#[cfg(target_os = "espidf")]
fn push(signal: LinkSignal) {
    if let Some(inbox) = INBOX.get() {
        inbox.push(signal);
    }
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

/// Poll `done` every 10 ms until it returns true or the GATT timeout expires.
#[cfg(target_os = "espidf")]
fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..GATT_TIMEOUT_MS / 10 {
        if done() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    done()
}

/// Whether an advertisement lists the controller board's service.
#[cfg(target_os = "espidf")]
unsafe fn advertises_service(adv: *mut u8) -> bool {
    use esp_idf_svc::sys::*;
    let mut len: u8 = 0;
    let data = esp_ble_resolve_adv_data(adv, esp_ble_adv_data_type_ESP_BLE_AD_TYPE_128SRV_CMPL as u8, &mut len);
    if data.is_null() || len != 16 {
        return false;
    }
    let bytes = core::slice::from_raw_parts(data, 16);
    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(bytes);
    u128::from_le_bytes(uuid) == SERVICE_UUID
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
            esp_ble_gap_start_scanning(SCAN_DURATION_S);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
            let r = &mut (*param).scan_rst;
            if r.search_evt != esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT {
                return;
            }
            if !advertises_service(r.ble_adv.as_mut_ptr()) {
                return;
            }
            if let Ok(mut addr) = SERVER_ADDR.lock() {
                if addr.is_some() {
                    return;
                }
                *addr = Some(r.bda);
            }
            log::info!("BLE GAP: controller found");
            esp_ble_gap_stop_scanning();
            push(LinkSignal::ServerFound);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_STOP_COMPLETE_EVT => {
            log::debug!("BLE GAP: scan stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gattc_event_handler(
    event: esp_idf_svc::sys::esp_gattc_cb_event_t,
    gattc_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gattc_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gattc_cb_event_t_ESP_GATTC_REG_EVT => {
            GATTC_IF.store(u16::from(gattc_if), Ordering::Release);
            log::info!("BLE GATTC: app registered (if={})", gattc_if);
        }
        esp_gattc_cb_event_t_ESP_GATTC_OPEN_EVT => {
            let p = &(*param).open;
            if p.status == esp_gatt_status_t_ESP_GATT_OK {
                CONN_ID.store(p.conn_id, Ordering::Release);
                CONNECTED.store(true, Ordering::Release);
                esp_ble_gattc_search_service(gattc_if, p.conn_id, core::ptr::null_mut());
            } else {
                log::warn!("BLE GATTC: open failed (status={})", p.status);
            }
        }
        esp_gattc_cb_event_t_ESP_GATTC_SEARCH_RES_EVT => {
            let p = &(*param).search_res;
            if p.srvc_id.uuid.len == 16 && u128::from_le_bytes(p.srvc_id.uuid.uuid.uuid128) == SERVICE_UUID {
                SVC_START.store(p.start_handle, Ordering::Release);
                SVC_END.store(p.end_handle, Ordering::Release);
            }
        }
        esp_gattc_cb_event_t_ESP_GATTC_SEARCH_CMPL_EVT => {
            SEARCH_DONE.store(true, Ordering::Release);
        }
        esp_gattc_cb_event_t_ESP_GATTC_NOTIFY_EVT => {
            let p = &(*param).notify;
            let data = core::slice::from_raw_parts(p.value, usize::from(p.value_len));
            match endpoint_for_handle(p.handle) {
                Some(endpoint) => {
                    if let Some(inbox) = INBOX.get() {
                        inbox.notify(endpoint, data);
                    }
                }
                None => log::debug!("BLE GATTC: notify on unknown handle {}", p.handle),
            }
        }
        esp_gattc_cb_event_t_ESP_GATTC_READ_CHAR_EVT => {
            let p = &(*param).read;
            let result = if p.status == esp_gatt_status_t_ESP_GATT_OK {
                Ok(core::slice::from_raw_parts(p.value, usize::from(p.value_len)).to_vec())
            } else {
                Err(LinkError::ReadFailed)
            };
            if let Ok(mut slot) = READ_RESULT.lock() {
                *slot = Some(result);
            }
        }
        esp_gattc_cb_event_t_ESP_GATTC_DISCONNECT_EVT => {
            CONNECTED.store(false, Ordering::Release);
            SEARCH_DONE.store(false, Ordering::Release);
            if let Ok(mut addr) = SERVER_ADDR.lock() {
                *addr = None;
            }
            for h in &HANDLES {
                h.store(0, Ordering::Release);
            }
            log::warn!("BLE GATTC: disconnected");
            push(LinkSignal::Disconnected);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

pub struct BleClientTransport {
    #[cfg(not(target_os = "espidf"))]
    inbox: Arc<LinkInbox>,
    #[cfg(not(target_os = "espidf"))]
    connected: std::sync::atomic::AtomicBool,
    #[cfg(not(target_os = "espidf"))]
    writes: std::sync::Mutex<Vec<(Endpoint, String)>>,
}

impl BleClientTransport {
    /// Bring up the Bluetooth stack in central mode. Inbound traffic is
    /// delivered to `inbox`.
    pub fn new(inbox: Arc<LinkInbox>) -> Result<Self, LinkError> {
        #[cfg(target_os = "espidf")]
        {
            if INBOX.set(inbox).is_err() {
                warn!("BLE: client transport already initialised");
            }
            platform_init()?;
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("BLE(sim): client transport ready (service {:032x})", SERVICE_UUID);
            Ok(Self {
                inbox,
                connected: std::sync::atomic::AtomicBool::new(false),
                writes: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    /// Simulation: deliver a notification as if the board had sent it.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_notify(&self, endpoint: Endpoint, payload: &str) -> bool {
        self.inbox.notify(endpoint, payload.as_bytes())
    }

    /// Simulation: drop the connection.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_disconnect(&self) {
        use std::sync::atomic::Ordering;
        self.connected.store(false, Ordering::Release);
        self.inbox.push(LinkSignal::Disconnected);
    }

    /// Simulation: everything written so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_writes(&self) -> Vec<(Endpoint, String)> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

#[cfg(target_os = "espidf")]
fn platform_init() -> Result<(), LinkError> {
    use esp_idf_svc::sys::*;
    unsafe {
        // Release classic BT memory (BLE-only mode saves ~30 KB).
        esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

        let mut bt_cfg = esp_bt_controller_config_t::default();
        let ret = esp_bt_controller_init(&mut bt_cfg);
        if ret != ESP_OK as i32 {
            error!("BLE: bt_controller_init failed ({})", ret);
            return Err(LinkError::ScanFailed);
        }
        let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
        if ret != ESP_OK as i32 {
            error!("BLE: bt_controller_enable failed ({})", ret);
            return Err(LinkError::ScanFailed);
        }
        let ret = esp_bluedroid_init();
        if ret != ESP_OK as i32 {
            error!("BLE: bluedroid_init failed ({})", ret);
            return Err(LinkError::ScanFailed);
        }
        let ret = esp_bluedroid_enable();
        if ret != ESP_OK as i32 {
            error!("BLE: bluedroid_enable failed ({})", ret);
            return Err(LinkError::ScanFailed);
        }

        esp_ble_gap_register_callback(Some(gap_event_handler));
        esp_ble_gattc_register_callback(Some(gattc_event_handler));
        esp_ble_gattc_app_register(0);
        esp_ble_gatt_set_local_mtu(128);
    }
    info!("BLE(espidf): Bluedroid central initialised");
    Ok(())
}

#[cfg(target_os = "espidf")]
impl Transport for BleClientTransport {
    fn start_scan(&self) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;
        if let Ok(mut addr) = SERVER_ADDR.lock() {
            *addr = None;
        }
        let mut params = esp_ble_scan_params_t {
            scan_type: esp_ble_scan_type_t_BLE_SCAN_TYPE_ACTIVE,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: 0x50,
            scan_window: 0x30,
            scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
        };
        // Scanning starts from the SCAN_PARAM_SET_COMPLETE callback.
        let ret = unsafe { esp_ble_gap_set_scan_params(&mut params) };
        if ret != ESP_OK as i32 {
            return Err(LinkError::ScanFailed);
        }
        Ok(())
    }

    fn connect(&self) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;
        let Some(mut bda) = SERVER_ADDR.lock().ok().and_then(|a| *a) else {
            return Err(LinkError::ConnectFailed);
        };
        SEARCH_DONE.store(false, Ordering::Release);
        let gattc_if = GATTC_IF.load(Ordering::Acquire) as esp_gatt_if_t;
        let ret = unsafe {
            esp_ble_gattc_open(
                gattc_if,
                bda.as_mut_ptr(),
                esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                true,
            )
        };
        if ret != ESP_OK as i32 || !wait_for(|| SEARCH_DONE.load(Ordering::Acquire)) {
            return Err(LinkError::ConnectFailed);
        }

        let conn_id = CONN_ID.load(Ordering::Acquire);
        let start = SVC_START.load(Ordering::Acquire);
        let end = SVC_END.load(Ordering::Acquire);
        for endpoint in Endpoint::ALL {
            let mut elem: esp_gattc_char_elem_t = unsafe { core::mem::zeroed() };
            let mut count: u16 = 1;
            let status = unsafe {
                esp_ble_gattc_get_char_by_uuid(
                    gattc_if,
                    conn_id,
                    start,
                    end,
                    uuid128_to_esp(endpoint.uuid()),
                    &mut elem,
                    &mut count,
                )
            };
            if status != esp_gatt_status_t_ESP_GATT_OK || count == 0 {
                warn!("BLE GATTC: characteristic {:?} missing", endpoint);
                continue;
            }
            HANDLES[endpoint_index(endpoint)].store(elem.char_handle, Ordering::Release);
        }
        info!("BLE GATTC: connected (conn_id={})", conn_id);
        Ok(())
    }

    fn subscribe(&self, endpoint: Endpoint) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;
        let handle = handle_of(endpoint).ok_or(LinkError::SubscribeFailed)?;
        let Some(mut bda) = SERVER_ADDR.lock().ok().and_then(|a| *a) else {
            return Err(LinkError::NotConnected);
        };
        let gattc_if = GATTC_IF.load(Ordering::Acquire) as esp_gatt_if_t;
        let mut enable = [0x01u8, 0x00];
        let ret = unsafe {
            let r = esp_ble_gattc_register_for_notify(gattc_if, bda.as_mut_ptr(), handle);
            if r != ESP_OK as i32 {
                r
            } else {
                // CCCD sits directly after the characteristic value.
                esp_ble_gattc_write_char_descr(
                    gattc_if,
                    CONN_ID.load(Ordering::Acquire),
                    handle + 1,
                    enable.len() as u16,
                    enable.as_mut_ptr(),
                    esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_RSP,
                    esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
                )
            }
        };
        if ret != ESP_OK as i32 {
            return Err(LinkError::SubscribeFailed);
        }
        Ok(())
    }

    fn write(&self, endpoint: Endpoint, payload: &str, with_response: bool) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;
        if !CONNECTED.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }
        let handle = handle_of(endpoint).ok_or(LinkError::WriteFailed)?;
        let mut data = payload.as_bytes().to_vec();
        let write_type = if with_response {
            esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_RSP
        } else {
            esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_NO_RSP
        };
        let ret = unsafe {
            esp_ble_gattc_write_char(
                GATTC_IF.load(Ordering::Acquire) as esp_gatt_if_t,
                CONN_ID.load(Ordering::Acquire),
                handle,
                data.len() as u16,
                data.as_mut_ptr(),
                write_type,
                esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
            )
        };
        if ret != ESP_OK as i32 {
            return Err(LinkError::WriteFailed);
        }
        Ok(())
    }

    fn read(&self, endpoint: Endpoint) -> Result<String, LinkError> {
        use esp_idf_svc::sys::*;
        if !CONNECTED.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }
        let handle = handle_of(endpoint).ok_or(LinkError::ReadFailed)?;
        if let Ok(mut slot) = READ_RESULT.lock() {
            *slot = None;
        }
        let ret = unsafe {
            esp_ble_gattc_read_char(
                GATTC_IF.load(Ordering::Acquire) as esp_gatt_if_t,
                CONN_ID.load(Ordering::Acquire),
                handle,
                esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
            )
        };
        if ret != ESP_OK as i32 {
            return Err(LinkError::ReadFailed);
        }
        let mut result = None;
        wait_for(|| {
            result = READ_RESULT.lock().ok().and_then(|mut slot| slot.take());
            result.is_some()
        });
        let bytes = result.ok_or(LinkError::ReadFailed)??;
        String::from_utf8(bytes).map_err(|_| LinkError::ReadFailed)
    }

    fn is_connected(&self) -> bool {
        CONNECTED.load(Ordering::Acquire)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Transport for BleClientTransport {
    fn start_scan(&self) -> Result<(), LinkError> {
        info!("BLE(sim): scanning, controller found");
        self.inbox.push(LinkSignal::ServerFound);
        Ok(())
    }

    fn connect(&self) -> Result<(), LinkError> {
        use std::sync::atomic::Ordering;
        self.connected.store(true, Ordering::Release);
        info!("BLE(sim): connected");
        Ok(())
    }

    fn subscribe(&self, _endpoint: Endpoint) -> Result<(), LinkError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    fn write(&self, endpoint: Endpoint, payload: &str, _with_response: bool) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        log::debug!("BLE(sim): {:?} <- {}", endpoint, payload);
        if let Ok(mut w) = self.writes.lock() {
            w.push((endpoint, payload.to_owned()));
        }
        Ok(())
    }

    fn read(&self, endpoint: Endpoint) -> Result<String, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        match endpoint {
            Endpoint::Info => {
                crate::link::protocol::encode_info(&crate::link::protocol::SystemInfo::fallback())
                    .map_err(|_| LinkError::ReadFailed)
            }
            _ => Err(LinkError::ReadFailed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Acquire)
    }
}
