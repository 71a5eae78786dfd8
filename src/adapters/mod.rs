//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter      | Implements     | Connects to                  |
//! |--------------|----------------|------------------------------|
//! | `ble_client` | Transport      | Bluedroid GATT client        |
//! | `log_plugin` | Plugin         | Serial log output            |
//! | `nvs`        | SettingsPort   | NVS / in-memory store        |
//! | `time`       | ClockPort      | ESP32 system timer           |

pub mod ble_client;
pub mod log_plugin;
pub mod nvs;
pub mod time;
