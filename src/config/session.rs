//! Provisioning session settings.

use super::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Length of the AES key used by encrypted ESP-TOUCH v2 sessions.
pub const V2_CRYPT_KEY_LEN: usize = 16;

/// SmartConfig sub-protocol the device listens for.
///
/// Discriminants match ESP-IDF's `smartconfig_type_t`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// ESP-TOUCH (the default).
    #[default]
    EspTouch = 0,
    /// WeChat AirKiss.
    AirKiss = 1,
    /// ESP-TOUCH and AirKiss at the same time.
    EspTouchAirKiss = 2,
    /// ESP-TOUCH v2, which may carry reserved data.
    EspTouchV2 = 3,
}

impl ProtocolVariant {
    /// Map a raw `smartconfig_type_t` value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::EspTouch),
            1 => Some(Self::AirKiss),
            2 => Some(Self::EspTouchAirKiss),
            3 => Some(Self::EspTouchV2),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Whether a handshake of this variant carries reserved data.
    pub fn carries_reserved_data(self) -> bool {
        self == Self::EspTouchV2
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EspTouch => "esptouch",
            Self::AirKiss => "airkiss",
            Self::EspTouchAirKiss => "esptouch-airkiss",
            Self::EspTouchV2 => "esptouch-v2",
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "esptouch" => Ok(Self::EspTouch),
            "airkiss" => Ok(Self::AirKiss),
            "esptouch-airkiss" => Ok(Self::EspTouchAirKiss),
            "esptouch-v2" => Ok(Self::EspTouchV2),
            _ => Err(ConfigError::UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings a [`Session`](crate::session::Session) is created with.
///
/// # Example
///
/// ```
/// use smartconfig_rs_esp32::config::{ProtocolVariant, SessionConfig};
///
/// let config = SessionConfig::default()
///     .with_verbose(true)
///     .with_variant(ProtocolVariant::EspTouchV2)
///     .with_v2_crypt_key(*b"0123456789abcdef");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Log diagnostics for every handled event. Never changes control flow.
    pub verbose: bool,
    /// Sub-protocol to listen for.
    pub variant: ProtocolVariant,
    /// Decrypt ESP-TOUCH v2 payloads with this key.
    pub v2_crypt_key: Option<[u8; V2_CRYPT_KEY_LEN]>,
}

impl SessionConfig {
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_v2_crypt_key(mut self, key: [u8; V2_CRYPT_KEY_LEN]) -> Self {
        self.v2_crypt_key = Some(key);
        self
    }

    /// Parse a crypt key given as text (e.g. from the build environment).
    pub fn parse_v2_crypt_key(key: &str) -> Result<[u8; V2_CRYPT_KEY_LEN], ConfigError> {
        key.as_bytes()
            .try_into()
            .map_err(|_| ConfigError::InvalidLength {
                field: "ESP-TOUCH v2 key",
                len: key.len(),
                expected: V2_CRYPT_KEY_LEN,
            })
    }

    /// Apply textual overrides, e.g. from the build environment.
    ///
    /// `verbose` is on for any value but `"0"`, `"false"` and `"off"`.
    pub fn with_overrides(
        mut self,
        verbose: Option<&str>,
        variant: Option<&str>,
        v2_crypt_key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(verbose) = verbose {
            self.verbose = !matches!(verbose.trim(), "0" | "false" | "off" | "");
        }
        if let Some(variant) = variant {
            self.variant = variant.parse()?;
        }
        if let Some(key) = v2_crypt_key {
            self.v2_crypt_key = Some(Self::parse_v2_crypt_key(key)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.v2_crypt_key.is_some() && self.variant != ProtocolVariant::EspTouchV2 {
            return Err(ConfigError::CryptKeyRequiresV2 {
                variant: self.variant,
            });
        }
        Ok(())
    }
}
