//! SmartConfig WiFi provisioning for headless ESP32 devices.
//!
//! A [`Session`] brings up the WiFi station, listens for an ESP-TOUCH (or
//! AirKiss) broadcast from a phone app, joins the advertised network and
//! announces the captured [`Credentials`] to the rest of the firmware.
//!
//! Everything except `esp` is platform-independent and tested on the host
//! against the doubles in `testing`.

pub mod config;
#[cfg(feature = "esp32")]
pub mod esp;
pub mod event;
pub mod notification;
pub mod platform;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items
pub use config::{ConfigError, Credentials, ProtocolVariant, SessionConfig};
pub use event::{Event, EventSource};
pub use notification::Notification;
pub use platform::{EventBus, LinkControl, PlatformError, ProtocolControl};
pub use session::{LinkStatus, Session, SessionError, SessionState};
