//! Events the provisioning session reacts to.
//!
//! Three independent sources feed the session: the WiFi driver, the IP stack
//! and the SmartConfig protocol decoder. Raw ids follow ESP-IDF's
//! `wifi_event_t`, `ip_event_t` and `smartconfig_event_t` so the ESP32
//! bindings can classify events without a lookup table.

use crate::config::{
    Bssid, ConfigError, Passphrase, ProtocolVariant, Ssid, BSSID_LEN, MAX_PASSWORD_LEN,
    MAX_SSID_LEN,
};
use crate::notification::Notification;
use std::fmt;
use std::net::Ipv4Addr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// `WIFI_EVENT_STA_START`
pub const WIFI_EVENT_STA_START: i32 = 2;
/// `WIFI_EVENT_STA_DISCONNECTED`
pub const WIFI_EVENT_STA_DISCONNECTED: i32 = 5;

/// `IP_EVENT_STA_GOT_IP`
pub const IP_EVENT_STA_GOT_IP: i32 = 0;

/// `SC_EVENT_SCAN_DONE`
pub const SC_EVENT_SCAN_DONE: i32 = 0;
/// `SC_EVENT_FOUND_CHANNEL`
pub const SC_EVENT_FOUND_CHANNEL: i32 = 1;
/// `SC_EVENT_GOT_SSID_PSWD`
pub const SC_EVENT_GOT_SSID_PSWD: i32 = 2;
/// `SC_EVENT_SEND_ACK_DONE`
pub const SC_EVENT_SEND_ACK_DONE: i32 = 3;

/// Dispatcher channel an event arrives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// Link-layer WiFi driver events.
    Wifi,
    /// IP stack events.
    Ip,
    /// SmartConfig protocol events, plus the session's own notifications.
    SmartConfig,
}

impl EventSource {
    pub const ALL: [EventSource; 3] = [Self::Wifi, Self::Ip, Self::SmartConfig];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wifi => "WIFI_EVENT",
            Self::Ip => "IP_EVENT",
            Self::SmartConfig => "SC_EVENT",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// WiFi driver events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiEvent {
    StaStart,
    StaDisconnected,
    /// Any id the session has no use for.
    Other(i32),
}

impl WifiEvent {
    pub fn from_id(id: i32) -> Self {
        match id {
            WIFI_EVENT_STA_START => Self::StaStart,
            WIFI_EVENT_STA_DISCONNECTED => Self::StaDisconnected,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::StaStart => WIFI_EVENT_STA_START,
            Self::StaDisconnected => WIFI_EVENT_STA_DISCONNECTED,
            Self::Other(id) => *id,
        }
    }
}

/// IP stack events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpEvent {
    /// DHCP handed the station an address.
    StaGotIp(Ipv4Addr),
    Other(i32),
}

impl IpEvent {
    pub fn id(&self) -> i32 {
        match self {
            Self::StaGotIp(_) => IP_EVENT_STA_GOT_IP,
            Self::Other(id) => *id,
        }
    }
}

/// Decoded `SC_EVENT_GOT_SSID_PSWD` payload.
///
/// Mirrors `smartconfig_event_got_ssid_pswd_t`: fixed NUL-padded buffers and
/// a separate `bssid_set` flag, since an all-zero BSSID is a real address.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GotCredentials {
    pub ssid: [u8; MAX_SSID_LEN],
    pub password: [u8; MAX_PASSWORD_LEN],
    pub bssid_set: bool,
    pub bssid: [u8; BSSID_LEN],
    #[zeroize(skip)]
    pub variant: ProtocolVariant,
    /// Token the phone app uses to match the device's acknowledgment.
    pub token: u8,
    /// Address of the phone that sent the credentials.
    pub cellphone_ip: [u8; 4],
}

impl GotCredentials {
    /// Build a payload from unpadded SSID/passphrase bytes.
    ///
    /// The result has no BSSID and uses [`ProtocolVariant::EspTouch`].
    pub fn new(ssid: &[u8], password: &[u8]) -> Result<Self, ConfigError> {
        // Validate lengths with the credential types before padding.
        Ssid::new(ssid)?;
        Passphrase::new(password)?;

        let mut got = Self {
            ssid: [0; MAX_SSID_LEN],
            password: [0; MAX_PASSWORD_LEN],
            bssid_set: false,
            bssid: [0; BSSID_LEN],
            variant: ProtocolVariant::EspTouch,
            token: 0,
            cellphone_ip: [0; 4],
        };
        got.ssid[..ssid.len()].copy_from_slice(ssid);
        got.password[..password.len()].copy_from_slice(password);
        Ok(got)
    }

    pub fn with_bssid(mut self, bssid: Bssid) -> Self {
        self.bssid_set = true;
        self.bssid = *bssid.as_bytes();
        self
    }

    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn ssid(&self) -> Result<Ssid, ConfigError> {
        Ssid::from_padded(&self.ssid)
    }

    pub fn password(&self) -> Result<Passphrase, ConfigError> {
        Passphrase::from_padded(&self.password)
    }

    /// The BSSID, only when `bssid_set` says it is meaningful.
    pub fn bssid(&self) -> Option<Bssid> {
        self.bssid_set.then(|| Bssid::new(self.bssid))
    }

    pub fn cellphone_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.cellphone_ip)
    }
}

impl fmt::Debug for GotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GotCredentials")
            .field("ssid", &String::from_utf8_lossy(&self.ssid).trim_end_matches('\0'))
            .field("bssid", &self.bssid())
            .field("variant", &self.variant)
            .field("token", &self.token)
            .field("cellphone_ip", &self.cellphone_ip())
            .finish_non_exhaustive()
    }
}

/// SmartConfig protocol events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartConfigEvent {
    /// The decoder finished its access point scan.
    ScanDone,
    /// The decoder locked onto the channel the phone broadcasts on.
    FoundChannel,
    /// SSID/passphrase decoded.
    GotCredentials(GotCredentials),
    /// The acknowledgment was sent back to the phone.
    SendAckDone,
    Other(i32),
}

impl SmartConfigEvent {
    /// Classify a protocol event id.
    ///
    /// `payload` is only consulted for `SC_EVENT_GOT_SSID_PSWD`; an event with
    /// that id but no payload cannot be acted on and is classified as
    /// [`SmartConfigEvent::Other`].
    pub fn from_id<F>(id: i32, payload: F) -> Self
    where
        F: FnOnce() -> Option<GotCredentials>,
    {
        match id {
            SC_EVENT_SCAN_DONE => Self::ScanDone,
            SC_EVENT_FOUND_CHANNEL => Self::FoundChannel,
            SC_EVENT_GOT_SSID_PSWD => match payload() {
                Some(got) => Self::GotCredentials(got),
                None => Self::Other(id),
            },
            SC_EVENT_SEND_ACK_DONE => Self::SendAckDone,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::ScanDone => SC_EVENT_SCAN_DONE,
            Self::FoundChannel => SC_EVENT_FOUND_CHANNEL,
            Self::GotCredentials(_) => SC_EVENT_GOT_SSID_PSWD,
            Self::SendAckDone => SC_EVENT_SEND_ACK_DONE,
            Self::Other(id) => *id,
        }
    }
}

/// Anything the dispatcher can deliver to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Wifi(WifiEvent),
    Ip(IpEvent),
    SmartConfig(SmartConfigEvent),
    /// A session notification, delivered on the SmartConfig source.
    Notification(Notification),
}

impl Event {
    pub fn source(&self) -> EventSource {
        match self {
            Self::Wifi(_) => EventSource::Wifi,
            Self::Ip(_) => EventSource::Ip,
            Self::SmartConfig(_) | Self::Notification(_) => EventSource::SmartConfig,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::Wifi(e) => e.id(),
            Self::Ip(e) => e.id(),
            Self::SmartConfig(e) => e.id(),
            Self::Notification(n) => n.id(),
        }
    }
}

impl From<WifiEvent> for Event {
    fn from(e: WifiEvent) -> Self {
        Self::Wifi(e)
    }
}

impl From<IpEvent> for Event {
    fn from(e: IpEvent) -> Self {
        Self::Ip(e)
    }
}

impl From<SmartConfigEvent> for Event {
    fn from(e: SmartConfigEvent) -> Self {
        Self::SmartConfig(e)
    }
}

impl From<Notification> for Event {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}
