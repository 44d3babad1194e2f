//! ESP-IDF implementations of the platform traits.
//!
//! - [`EspEventBus`] - the default system event loop
//! - [`EspLink`] - station netif, WiFi driver and SmartConfig decoder

mod bus;
mod link;

pub use bus::{EspEventBus, EspSubscription};
pub use link::EspLink;

use crate::platform::{Operation, PlatformError};
use esp_idf_sys::{esp_err_t, EspError};

/// Map an `esp_err_t` to a [`PlatformError`] for `operation`.
fn check(operation: Operation, code: esp_err_t) -> Result<(), PlatformError> {
    EspError::convert(code).map_err(|e| PlatformError::new(operation, e.code()))
}
