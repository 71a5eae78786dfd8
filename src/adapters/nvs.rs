//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`SettingsPort`]: the [`Settings`] struct is stored as a single
//! postcard blob under `brewdeck::settings`.
//!
//! - Validation: every field is range-checked before it is persisted.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - On the host the blob lives in an in-memory map.

use crate::app::ports::{ConfigError, SettingsPort};
use crate::config::Settings;
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const SETTINGS_NAMESPACE: &str = "brewdeck";
const SETTINGS_KEY: &str = "settings";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is erased
    /// and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Load settings, falling back to defaults on first boot or a corrupted
    /// blob. Used at startup where a missing config must not stop the machine.
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(ConfigError::NotFound) => {
                info!("NvsAdapter: no stored settings, using defaults");
                Settings::default()
            }
            Err(e) => {
                log::warn!("NvsAdapter: {}, using defaults", e);
                Settings::default()
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key() -> String {
        format!("{}::{}", SETTINGS_NAMESPACE, SETTINGS_KEY)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf() -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = SETTINGS_KEY.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }
}

fn decode(bytes: &[u8]) -> Result<Settings, ConfigError> {
    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)
}

impl SettingsPort for NvsAdapter {
    fn load(&self) -> Result<Settings, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.borrow();
            let bytes = store
                .get(&Self::composite_key())
                .ok_or(ConfigError::NotFound)?;
            let settings = decode(bytes)?;
            info!("NvsAdapter: loaded settings from store");
            Ok(settings)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(SETTINGS_NAMESPACE, false, |handle| {
                let key = Self::key_buf();
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let settings = decode(&bytes)?;
                    info!("NvsAdapter: loaded settings from NVS ({} bytes)", bytes.len());
                    Ok(settings)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(ConfigError::NotFound),
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let bytes = postcard::to_allocvec(settings).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let len = bytes.len();
            self.store.borrow_mut().insert(Self::composite_key(), bytes);
            info!("NvsAdapter: settings saved ({} bytes, simulation)", len);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(SETTINGS_NAMESPACE, true, |handle| {
                let key = Self::key_buf();
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: settings saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[test]
    fn first_boot_is_not_found() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load(), Err(ConfigError::NotFound));
        assert_eq!(nvs.load_or_default(), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let nvs = NvsAdapter::new().unwrap();
        let settings = Settings {
            startup_mode: Mode::Brew,
            brew_delay_ms: -1_250.5,
            pid: String::from("3.100,0.250,12.000"),
            ..Settings::default()
        };
        nvs.save(&settings).unwrap();
        assert_eq!(nvs.load(), Ok(settings));
    }

    #[test]
    fn invalid_settings_are_not_persisted() {
        let nvs = NvsAdapter::new().unwrap();
        let bad = Settings {
            target_water_temp: 200,
            ..Settings::default()
        };
        assert!(matches!(
            nvs.save(&bad),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert_eq!(nvs.load(), Err(ConfigError::NotFound));
    }

    #[test]
    fn corrupted_blob_is_reported() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.store
            .borrow_mut()
            .insert(NvsAdapter::composite_key(), vec![0xff; 3]);
        assert_eq!(nvs.load(), Err(ConfigError::Corrupted));
        assert_eq!(nvs.load_or_default(), Settings::default());
    }
}
