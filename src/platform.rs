//! Platform primitives the provisioning session drives.
//!
//! The session never talks to ESP-IDF directly. It composes three traits:
//!
//! - [`EventBus`] - subscribe to event sources and publish notifications
//! - [`LinkControl`] - WiFi station control (netif, driver, connect)
//! - [`ProtocolControl`] - the SmartConfig decoder
//!
//! The ESP32 implementations live in `crate::esp` (feature `esp32`);
//! recording doubles for host tests live in `testing`.

use crate::config::{ProtocolVariant, ReservedData, SessionConfig, StationConfig};
use crate::event::{Event, EventSource};
use crate::notification::Notification;
use std::fmt;

/// Handler the dispatcher invokes for every event of a subscribed source.
pub type EventHandler = Box<dyn FnMut(&Event) + Send + 'static>;

/// Event dispatch primitive.
///
/// Implementations must deliver events synchronously and never re-enter a
/// handler while it is running. `unsubscribe` must not return while the
/// handler of that subscription is still executing.
pub trait EventBus {
    /// Handle identifying one subscription.
    type Subscription;

    /// Register `handler` for every event of `source`.
    fn subscribe(
        &self,
        source: EventSource,
        handler: EventHandler,
    ) -> Result<Self::Subscription, PlatformError>;

    /// Release a subscription. The handler is dropped.
    fn unsubscribe(&self, subscription: Self::Subscription) -> Result<(), PlatformError>;

    /// Post a notification on the SmartConfig source.
    fn publish(&self, notification: &Notification) -> Result<(), PlatformError>;
}

/// WiFi station control.
pub trait LinkControl {
    /// Create the default station network interface.
    fn create_default_sta_netif(&mut self) -> Result<(), PlatformError>;

    /// Initialise the WiFi driver with default tuning.
    fn init(&mut self) -> Result<(), PlatformError>;

    fn set_station_mode(&mut self) -> Result<(), PlatformError>;

    fn start(&mut self) -> Result<(), PlatformError>;

    fn connect(&mut self) -> Result<(), PlatformError>;

    fn disconnect(&mut self) -> Result<(), PlatformError>;

    fn set_station_config(&mut self, config: &StationConfig) -> Result<(), PlatformError>;
}

/// SmartConfig decoder control.
pub trait ProtocolControl {
    fn set_variant(&mut self, variant: ProtocolVariant) -> Result<(), PlatformError>;

    /// Begin listening for the provisioning broadcast.
    fn start_protocol(&mut self, config: &SessionConfig) -> Result<(), PlatformError>;

    fn stop_protocol(&mut self) -> Result<(), PlatformError>;

    /// Fetch the ESP-TOUCH v2 reserved data of the last handshake.
    fn reserved_data(&mut self) -> Result<ReservedData, PlatformError>;
}

/// Platform primitive that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateNetif,
    Init,
    Subscribe(EventSource),
    Unsubscribe(EventSource),
    Publish,
    SetMode,
    Start,
    Connect,
    Disconnect,
    SetConfig,
    SetProtocolVariant,
    StartProtocol,
    StopProtocol,
    GetReservedData,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateNetif => write!(f, "create station netif"),
            Self::Init => write!(f, "WiFi init"),
            Self::Subscribe(source) => write!(f, "subscribe to {}", source),
            Self::Unsubscribe(source) => write!(f, "unsubscribe from {}", source),
            Self::Publish => write!(f, "publish notification"),
            Self::SetMode => write!(f, "set station mode"),
            Self::Start => write!(f, "WiFi start"),
            Self::Connect => write!(f, "WiFi connect"),
            Self::Disconnect => write!(f, "WiFi disconnect"),
            Self::SetConfig => write!(f, "set station config"),
            Self::SetProtocolVariant => write!(f, "set SmartConfig type"),
            Self::StartProtocol => write!(f, "SmartConfig start"),
            Self::StopProtocol => write!(f, "SmartConfig stop"),
            Self::GetReservedData => write!(f, "get reserved data"),
        }
    }
}

/// Failure reported by a platform primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError {
    /// The primitive that failed.
    pub operation: Operation,
    /// Platform error code (`esp_err_t` on ESP-IDF).
    pub code: i32,
}

impl PlatformError {
    pub fn new(operation: Operation, code: i32) -> Self {
        Self { operation, code }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed (error 0x{:x})", self.operation, self.code)
    }
}

impl std::error::Error for PlatformError {}
