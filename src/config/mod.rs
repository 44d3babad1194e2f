//! Provisioning configuration.
//!
//! # Components
//!
//! - `credentials` - bounded credential types and the per-handshake builder
//! - `session` - settings a provisioning session starts with
//!
//! Everything here is platform-independent and tested on the host.

mod credentials;
mod session;

use std::fmt;

pub use credentials::{
    Bssid, CredentialBuilder, Credentials, Passphrase, ReservedData, Ssid, StationConfig,
    BSSID_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN, RESERVED_DATA_LEN,
};
pub use session::{ProtocolVariant, SessionConfig, V2_CRYPT_KEY_LEN};

/// Errors that can occur while building configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// A fixed-size field has the wrong length.
    InvalidLength {
        field: &'static str,
        len: usize,
        expected: usize,
    },
    /// Reserved data was offered before any credentials were captured.
    NotCaptured,
    /// A crypt key was set for a variant other than ESP-TOUCH v2.
    CryptKeyRequiresV2 { variant: ProtocolVariant },
    /// Unknown protocol variant name.
    UnknownVariant(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidLength {
                field,
                len,
                expected,
            } => write!(f, "{} must be {} bytes, got {}", field, expected, len),
            Self::NotCaptured => write!(f, "no credentials captured"),
            Self::CryptKeyRequiresV2 { variant } => {
                write!(f, "crypt key is only valid for esptouch-v2, not {}", variant)
            }
            Self::UnknownVariant(name) => write!(f, "unknown protocol variant: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}
