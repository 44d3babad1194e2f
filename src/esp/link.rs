//! WiFi station and SmartConfig decoder control on ESP-IDF.

use super::check;
use crate::config::{
    ProtocolVariant, ReservedData, SessionConfig, StationConfig, RESERVED_DATA_LEN,
    V2_CRYPT_KEY_LEN,
};
use crate::platform::{LinkControl, Operation, PlatformError, ProtocolControl};
use core::ffi::c_char;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::WifiDriver;
use esp_idf_sys::{
    esp_netif_create_default_wifi_sta, esp_netif_init, esp_smartconfig_get_rvd_data,
    esp_smartconfig_set_type, esp_smartconfig_start, esp_smartconfig_stop, esp_wifi_connect,
    esp_wifi_disconnect, esp_wifi_set_config, esp_wifi_set_mode, esp_wifi_start,
    smartconfig_start_config_t, wifi_config_t, wifi_interface_t_WIFI_IF_STA,
    wifi_mode_t_WIFI_MODE_STA, ESP_ERR_INVALID_STATE, ESP_FAIL,
};
use log::debug;
use std::mem;
use std::ptr;
use zeroize::Zeroize;

/// [`LinkControl`] and [`ProtocolControl`] over the ESP-IDF WiFi driver.
///
/// The driver is created by [`LinkControl::init`] and is never torn down:
/// the station stays associated after the session that configured it is
/// dropped.
pub struct EspLink {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
    driver: Option<WifiDriver<'static>>,
    // NUL-terminated; the decoder reads it while listening.
    v2_key: Option<[u8; V2_CRYPT_KEY_LEN + 1]>,
}

impl EspLink {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            nvs,
            driver: None,
            v2_key: None,
        }
    }
}

impl Drop for EspLink {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            mem::forget(driver);
        }
        if let Some(key) = self.v2_key.as_mut() {
            key.zeroize();
        }
    }
}

impl LinkControl for EspLink {
    fn create_default_sta_netif(&mut self) -> Result<(), PlatformError> {
        check(Operation::CreateNetif, unsafe { esp_netif_init() })?;
        let netif = unsafe { esp_netif_create_default_wifi_sta() };
        if netif.is_null() {
            return Err(PlatformError::new(Operation::CreateNetif, ESP_FAIL));
        }
        Ok(())
    }

    fn init(&mut self) -> Result<(), PlatformError> {
        let modem = self
            .modem
            .take()
            .ok_or(PlatformError::new(Operation::Init, ESP_ERR_INVALID_STATE as i32))?;
        let driver = WifiDriver::new(modem, self.sysloop.clone(), self.nvs.take())
            .map_err(|e| PlatformError::new(Operation::Init, e.code()))?;
        self.driver = Some(driver);
        Ok(())
    }

    fn set_station_mode(&mut self) -> Result<(), PlatformError> {
        check(Operation::SetMode, unsafe {
            esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA)
        })
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        check(Operation::Start, unsafe { esp_wifi_start() })
    }

    fn connect(&mut self) -> Result<(), PlatformError> {
        check(Operation::Connect, unsafe { esp_wifi_connect() })
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        check(Operation::Disconnect, unsafe { esp_wifi_disconnect() })
    }

    fn set_station_config(&mut self, config: &StationConfig) -> Result<(), PlatformError> {
        let mut raw: wifi_config_t = unsafe { mem::zeroed() };
        let code = unsafe {
            let sta = &mut raw.sta;
            sta.ssid[..config.ssid.len()].copy_from_slice(config.ssid.as_bytes());
            sta.password[..config.password.len()].copy_from_slice(config.password.as_bytes());
            if let Some(bssid) = config.bssid {
                sta.bssid_set = true;
                sta.bssid = *bssid.as_bytes();
            }
            let code = esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut raw);
            sta.password.zeroize();
            code
        };
        check(Operation::SetConfig, code)
    }
}

impl ProtocolControl for EspLink {
    fn set_variant(&mut self, variant: ProtocolVariant) -> Result<(), PlatformError> {
        check(Operation::SetProtocolVariant, unsafe {
            esp_smartconfig_set_type(variant.as_raw())
        })
    }

    fn start_protocol(&mut self, config: &SessionConfig) -> Result<(), PlatformError> {
        self.v2_key = config.v2_crypt_key.map(|key| {
            let mut buf = [0u8; V2_CRYPT_KEY_LEN + 1];
            buf[..V2_CRYPT_KEY_LEN].copy_from_slice(&key);
            buf
        });

        let start = smartconfig_start_config_t {
            enable_log: config.verbose,
            esp_touch_v2_enable_crypt: self.v2_key.is_some(),
            esp_touch_v2_key: self
                .v2_key
                .as_mut()
                .map_or(ptr::null_mut(), |key| key.as_mut_ptr() as *mut c_char),
        };
        debug!(
            "Starting SmartConfig decoder (variant={}, crypt={})",
            config.variant, start.esp_touch_v2_enable_crypt
        );
        check(Operation::StartProtocol, unsafe {
            esp_smartconfig_start(&start)
        })
    }

    fn stop_protocol(&mut self) -> Result<(), PlatformError> {
        check(Operation::StopProtocol, unsafe { esp_smartconfig_stop() })?;
        if let Some(mut key) = self.v2_key.take() {
            key.zeroize();
        }
        Ok(())
    }

    fn reserved_data(&mut self) -> Result<ReservedData, PlatformError> {
        let mut buf = [0u8; RESERVED_DATA_LEN];
        check(Operation::GetReservedData, unsafe {
            esp_smartconfig_get_rvd_data(buf.as_mut_ptr(), RESERVED_DATA_LEN as u8)
        })?;
        Ok(ReservedData::new(buf))
    }
}
