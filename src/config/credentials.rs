//! Captured WiFi credentials.
//!
//! This module contains platform-independent types for the credentials a
//! SmartConfig handshake delivers. They can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use smartconfig_rs_esp32::config::{Bssid, CredentialBuilder, Passphrase, Ssid};
//!
//! let mut builder = CredentialBuilder::new();
//! assert!(builder.credentials().is_none());
//!
//! builder.capture(
//!     Ssid::new(b"MyNetwork").unwrap(),
//!     Passphrase::new(b"MyPassword").unwrap(),
//!     Some(Bssid::new([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01])),
//! );
//!
//! let creds = builder.take().unwrap();
//! assert_eq!(creds.ssid().as_bytes(), b"MyNetwork");
//! assert!(builder.take().is_none());
//! ```

use super::ConfigError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Length of an access point hardware address.
pub const BSSID_LEN: usize = 6;

/// Length of the vendor-reserved payload carried by ESP-TOUCH v2.
pub const RESERVED_DATA_LEN: usize = 33;

/// Cut a NUL-padded protocol buffer at its first NUL.
fn trim_padding(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(end) => &buf[..end],
        None => buf,
    }
}

/// Network name, at most [`MAX_SSID_LEN`] bytes.
///
/// SSIDs are byte strings, not text. Non-UTF-8 bytes are kept as received.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
pub struct Ssid(Vec<u8>);

impl Ssid {
    /// Create an SSID from raw bytes.
    pub fn new(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: bytes.len(),
                max: MAX_SSID_LEN,
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Create an SSID from a fixed, NUL-padded buffer.
    pub fn from_padded(buf: &[u8]) -> Result<Self, ConfigError> {
        Self::new(trim_padding(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssid({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Network passphrase, at most [`MAX_PASSWORD_LEN`] bytes.
///
/// The contents are wiped on drop and never shown by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    /// Create a passphrase from raw bytes.
    ///
    /// Empty is accepted for open networks.
    pub fn new(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: bytes.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Create a passphrase from a fixed, NUL-padded buffer.
    pub fn from_padded(buf: &[u8]) -> Result<Self, ConfigError> {
        Self::new(trim_padding(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if this is an open network (no passphrase).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passphrase(<{} bytes>)", self.0.len())
    }
}

/// Access point hardware address.
///
/// All-zero is a valid address; presence is expressed with `Option<Bssid>`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Zeroize)]
pub struct Bssid([u8; BSSID_LEN]);

impl Bssid {
    pub const fn new(bytes: [u8; BSSID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BSSID_LEN] {
        &self.0
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bssid({})", self)
    }
}

/// Vendor-reserved payload sent by the ESP-TOUCH v2 app.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ReservedData([u8; RESERVED_DATA_LEN]);

impl ReservedData {
    pub const fn new(bytes: [u8; RESERVED_DATA_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice that must be exactly [`RESERVED_DATA_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let array: [u8; RESERVED_DATA_LEN] =
            bytes.try_into().map_err(|_| ConfigError::InvalidLength {
                field: "reserved data",
                len: bytes.len(),
                expected: RESERVED_DATA_LEN,
            })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; RESERVED_DATA_LEN] {
        &self.0
    }

    /// Space separated hex dump, used for diagnostics.
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for ReservedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReservedData([{}])", self.to_hex())
    }
}

/// Credentials captured during one SmartConfig handshake.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    ssid: Ssid,
    password: Passphrase,
    bssid: Option<Bssid>,
    reserved_data: Option<ReservedData>,
}

impl Credentials {
    pub fn new(
        ssid: Ssid,
        password: Passphrase,
        bssid: Option<Bssid>,
        reserved_data: Option<ReservedData>,
    ) -> Self {
        Self {
            ssid,
            password,
            bssid,
            reserved_data,
        }
    }

    pub fn ssid(&self) -> &Ssid {
        &self.ssid
    }

    pub fn password(&self) -> &Passphrase {
        &self.password
    }

    /// Access point address, if the app pinned one.
    pub fn bssid(&self) -> Option<&Bssid> {
        self.bssid.as_ref()
    }

    /// ESP-TOUCH v2 reserved data, if the handshake carried it.
    pub fn reserved_data(&self) -> Option<&ReservedData> {
        self.reserved_data.as_ref()
    }

    /// The part of the credentials the station interface is configured with.
    pub fn station_config(&self) -> StationConfig {
        StationConfig {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            bssid: self.bssid,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &self.password)
            .field("bssid", &self.bssid)
            .field("reserved_data", &self.reserved_data)
            .finish()
    }
}

/// Station-mode configuration applied to the link layer.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StationConfig {
    /// Network SSID.
    pub ssid: Ssid,
    /// Network passphrase (empty for open networks).
    pub password: Passphrase,
    /// Restrict association to this access point.
    pub bssid: Option<Bssid>,
}

/// Accumulates the credential record across one handshake.
///
/// The record is reset whenever a new capture starts and handed out exactly
/// once with [`CredentialBuilder::take`], so nothing from an earlier handshake
/// can leak into the next one.
#[derive(Debug, Default)]
pub struct CredentialBuilder {
    record: Option<Credentials>,
}

impl CredentialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop whatever was captured so far.
    pub fn reset(&mut self) {
        self.record = None;
    }

    /// Start a new record from the SSID/passphrase/BSSID of a handshake.
    ///
    /// Any earlier record, including its reserved data, is discarded first.
    pub fn capture(
        &mut self,
        ssid: Ssid,
        password: Passphrase,
        bssid: Option<Bssid>,
    ) -> &Credentials {
        self.reset();
        self.record
            .insert(Credentials::new(ssid, password, bssid, None))
    }

    /// Attach ESP-TOUCH v2 reserved data to the current record.
    pub fn attach_reserved_data(&mut self, data: ReservedData) -> Result<(), ConfigError> {
        let record = self.record.as_mut().ok_or(ConfigError::NotCaptured)?;
        record.reserved_data = Some(data);
        Ok(())
    }

    /// The record captured so far, `None` before the first capture.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.record.as_ref()
    }

    pub fn is_captured(&self) -> bool {
        self.record.is_some()
    }

    /// Hand the record out, leaving the builder empty.
    pub fn take(&mut self) -> Option<Credentials> {
        self.record.take()
    }
}
