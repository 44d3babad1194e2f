//! Notifications the provisioning session publishes.
//!
//! Both are posted on the SmartConfig event source with ids above the range
//! ESP-IDF uses for `smartconfig_event_t`, so subscribers to that source can
//! tell them apart from protocol events.
//!
//! - `SessionStarted` (`0x80`) - listening began, no payload.
//! - `SessionEnded` (`0x81`) - the handshake completed, carries the captured
//!   [`Credentials`].
//!
//! On ESP-IDF the `SessionEnded` payload is posted as a [`SessionEndedPayload`],
//! a plain `#[repr(C)]` value that the event loop copies. Subscribers never see
//! a pointer into session memory.

use crate::config::{
    Bssid, ConfigError, Credentials, Passphrase, ReservedData, Ssid, BSSID_LEN,
    MAX_PASSWORD_LEN, MAX_SSID_LEN, RESERVED_DATA_LEN,
};
use zeroize::Zeroize;

/// Id of the session-started notification.
pub const SESSION_STARTED_ID: i32 = 0x80;

/// Id of the session-ended notification.
pub const SESSION_ENDED_ID: i32 = 0x81;

/// Whether a SmartConfig-source id belongs to a session notification.
pub fn is_notification_id(id: i32) -> bool {
    id & SESSION_STARTED_ID != 0
}

/// Session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Listening for the provisioning broadcast began.
    SessionStarted,
    /// A handshake completed; the credentials are an owned copy.
    SessionEnded(Credentials),
}

impl Notification {
    pub fn id(&self) -> i32 {
        match self {
            Self::SessionStarted => SESSION_STARTED_ID,
            Self::SessionEnded(_) => SESSION_ENDED_ID,
        }
    }
}

/// Wire form of [`Notification::SessionEnded`].
///
/// Presence of the BSSID and reserved data is carried in explicit flags.
#[repr(C)]
#[derive(Clone, Copy, Zeroize)]
pub struct SessionEndedPayload {
    pub ssid: [u8; MAX_SSID_LEN],
    pub ssid_len: u8,
    pub password: [u8; MAX_PASSWORD_LEN],
    pub password_len: u8,
    pub bssid_set: bool,
    pub bssid: [u8; BSSID_LEN],
    pub reserved_data_set: bool,
    pub reserved_data: [u8; RESERVED_DATA_LEN],
}

impl From<&Credentials> for SessionEndedPayload {
    fn from(creds: &Credentials) -> Self {
        let mut payload = Self {
            ssid: [0; MAX_SSID_LEN],
            ssid_len: creds.ssid().len() as u8,
            password: [0; MAX_PASSWORD_LEN],
            password_len: creds.password().len() as u8,
            bssid_set: creds.bssid().is_some(),
            bssid: creds.bssid().map(|b| *b.as_bytes()).unwrap_or_default(),
            reserved_data_set: creds.reserved_data().is_some(),
            reserved_data: [0; RESERVED_DATA_LEN],
        };
        payload.ssid[..creds.ssid().len()].copy_from_slice(creds.ssid().as_bytes());
        payload.password[..creds.password().len()].copy_from_slice(creds.password().as_bytes());
        if let Some(data) = creds.reserved_data() {
            payload.reserved_data = *data.as_bytes();
        }
        payload
    }
}

impl SessionEndedPayload {
    /// Rebuild the credentials a subscriber received.
    pub fn to_credentials(&self) -> Result<Credentials, ConfigError> {
        let ssid = self
            .ssid
            .get(..self.ssid_len as usize)
            .ok_or(ConfigError::SsidTooLong {
                len: self.ssid_len as usize,
                max: MAX_SSID_LEN,
            })?;
        let password = self
            .password
            .get(..self.password_len as usize)
            .ok_or(ConfigError::PasswordTooLong {
                len: self.password_len as usize,
                max: MAX_PASSWORD_LEN,
            })?;

        Ok(Credentials::new(
            Ssid::new(ssid)?,
            Passphrase::new(password)?,
            self.bssid_set.then(|| Bssid::new(self.bssid)),
            self.reserved_data_set
                .then(|| ReservedData::new(self.reserved_data)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_credentials() -> Credentials {
        Credentials::new(
            Ssid::new(b"Net1").unwrap(),
            Passphrase::new(b"pass1234").unwrap(),
            None,
            None,
        )
    }

    #[test]
    fn test_notification_ids() {
        assert_eq!(Notification::SessionStarted.id(), 0x80);
        assert_eq!(Notification::SessionEnded(basic_credentials()).id(), 0x81);
        assert!(is_notification_id(SESSION_STARTED_ID));
        assert!(is_notification_id(SESSION_ENDED_ID));
        assert!(!is_notification_id(crate::event::SC_EVENT_SEND_ACK_DONE));
    }

    #[test]
    fn test_payload_keeps_absent_fields_absent() {
        let payload = SessionEndedPayload::from(&basic_credentials());
        assert!(!payload.bssid_set);
        assert!(!payload.reserved_data_set);

        let creds = payload.to_credentials().unwrap();
        assert_eq!(creds, basic_credentials());
        assert!(creds.bssid().is_none());
        assert!(creds.reserved_data().is_none());
    }

    #[test]
    fn test_payload_keeps_zero_bssid() {
        let creds = Credentials::new(
            Ssid::new(b"Net2").unwrap(),
            Passphrase::new(b"").unwrap(),
            Some(Bssid::new([0; BSSID_LEN])),
            Some(ReservedData::new([0xaa; RESERVED_DATA_LEN])),
        );
        let restored = SessionEndedPayload::from(&creds).to_credentials().unwrap();
        assert_eq!(restored.bssid(), Some(&Bssid::new([0; BSSID_LEN])));
        assert_eq!(
            restored.reserved_data().map(|d| *d.as_bytes()),
            Some([0xaa; RESERVED_DATA_LEN])
        );
    }

    #[test]
    fn test_payload_rejects_bad_length() {
        let mut payload = SessionEndedPayload::from(&basic_credentials());
        payload.ssid_len = 40;
        assert!(matches!(
            payload.to_credentials(),
            Err(ConfigError::SsidTooLong { len: 40, .. })
        ));
    }
}
