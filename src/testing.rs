//! Recording doubles for the platform traits.
//!
//! [`MockBus`] and [`MockLink`] stand in for the ESP-IDF event loop and WiFi
//! driver so the session can be exercised on the host. Both are cheap to
//! clone; clones share state, so a test keeps one handle for inspection and
//! hands the other to the session.
//!
//! **Note:** This module is only compiled for unit tests or with the
//! `testing` feature.
//!
//! # Usage
//!
//! ```ignore
//! let bus = MockBus::new();
//! let link = MockLink::new();
//! let session = Session::new(SessionConfig::default(), link.clone(), bus.clone());
//!
//! bus.dispatch(WifiEvent::StaStart);
//! assert_eq!(bus.published(), vec![Notification::SessionStarted]);
//! ```

use crate::config::{
    ProtocolVariant, ReservedData, SessionConfig, StationConfig, RESERVED_DATA_LEN,
};
use crate::event::{Event, EventSource};
use crate::notification::Notification;
use crate::platform::{
    EventBus, EventHandler, LinkControl, Operation, PlatformError, ProtocolControl,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error code reported for injected failures (`ESP_FAIL`).
pub const INJECTED_ERROR_CODE: i32 = -1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscription handle issued by [`MockBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockSubscription {
    pub id: usize,
    pub source: EventSource,
}

#[derive(Default)]
struct BusState {
    next_id: usize,
    handlers: Vec<(MockSubscription, EventHandler)>,
    unsubscribed: Vec<MockSubscription>,
}

/// Synchronous in-process event bus that records what it is asked to do.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
    // Kept apart from `state`: handlers publish while `dispatch` holds it.
    published: Arc<Mutex<Vec<Notification>>>,
    failures: Arc<Mutex<HashSet<Operation>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        lock(&self.failures).insert(operation);
    }

    /// Deliver an event to every handler subscribed to its source, in
    /// subscription order.
    pub fn dispatch(&self, event: impl Into<Event>) {
        let event = event.into();
        let mut state = lock(&self.state);
        for (subscription, handler) in state.handlers.iter_mut() {
            if subscription.source == event.source() {
                handler(&event);
            }
        }
    }

    /// Subscriptions currently registered.
    pub fn active_subscriptions(&self) -> Vec<MockSubscription> {
        lock(&self.state).handlers.iter().map(|(s, _)| *s).collect()
    }

    /// Subscriptions released so far.
    pub fn unsubscribed(&self) -> Vec<MockSubscription> {
        lock(&self.state).unsubscribed.clone()
    }

    /// Notifications published so far.
    pub fn published(&self) -> Vec<Notification> {
        lock(&self.published).clone()
    }

    fn check(&self, operation: Operation) -> Result<(), PlatformError> {
        if lock(&self.failures).contains(&operation) {
            return Err(PlatformError::new(operation, INJECTED_ERROR_CODE));
        }
        Ok(())
    }
}

impl EventBus for MockBus {
    type Subscription = MockSubscription;

    fn subscribe(
        &self,
        source: EventSource,
        handler: EventHandler,
    ) -> Result<MockSubscription, PlatformError> {
        self.check(Operation::Subscribe(source))?;
        let mut state = lock(&self.state);
        let subscription = MockSubscription {
            id: state.next_id,
            source,
        };
        state.next_id += 1;
        state.handlers.push((subscription, handler));
        Ok(subscription)
    }

    fn unsubscribe(&self, subscription: MockSubscription) -> Result<(), PlatformError> {
        self.check(Operation::Unsubscribe(subscription.source))?;
        let mut state = lock(&self.state);
        state.handlers.retain(|(s, _)| *s != subscription);
        state.unsubscribed.push(subscription);
        Ok(())
    }

    fn publish(&self, notification: &Notification) -> Result<(), PlatformError> {
        self.check(Operation::Publish)?;
        lock(&self.published).push(notification.clone());
        Ok(())
    }
}

/// A call made on [`MockLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    CreateNetif,
    Init,
    SetMode,
    Start,
    Connect,
    Disconnect,
    SetConfig(StationConfig),
    SetVariant(ProtocolVariant),
    StartProtocol,
    StopProtocol,
    GetReservedData,
}

#[derive(Default)]
struct LinkState {
    calls: Vec<LinkCall>,
    failures: HashSet<Operation>,
    reserved_data: Option<[u8; RESERVED_DATA_LEN]>,
    listening: bool,
    last_protocol_config: Option<SessionConfig>,
}

/// WiFi driver and SmartConfig decoder double.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserved data returned by [`ProtocolControl::reserved_data`].
    pub fn set_reserved_data(&self, data: [u8; RESERVED_DATA_LEN]) {
        lock(&self.state).reserved_data = Some(data);
    }

    pub fn fail_on(&self, operation: Operation) {
        lock(&self.state).failures.insert(operation);
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &LinkCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    /// Whether the SmartConfig decoder is currently listening.
    pub fn is_listening(&self) -> bool {
        lock(&self.state).listening
    }

    /// Config the decoder was last started with.
    pub fn protocol_config(&self) -> Option<SessionConfig> {
        lock(&self.state).last_protocol_config.clone()
    }

    fn record(&self, operation: Operation, call: LinkCall) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if state.failures.contains(&operation) {
            return Err(PlatformError::new(operation, INJECTED_ERROR_CODE));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl LinkControl for MockLink {
    fn create_default_sta_netif(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::CreateNetif, LinkCall::CreateNetif)
    }

    fn init(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::Init, LinkCall::Init)
    }

    fn set_station_mode(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::SetMode, LinkCall::SetMode)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::Start, LinkCall::Start)
    }

    fn connect(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::Connect, LinkCall::Connect)
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::Disconnect, LinkCall::Disconnect)
    }

    fn set_station_config(&mut self, config: &StationConfig) -> Result<(), PlatformError> {
        self.record(Operation::SetConfig, LinkCall::SetConfig(config.clone()))
    }
}

impl ProtocolControl for MockLink {
    fn set_variant(&mut self, variant: ProtocolVariant) -> Result<(), PlatformError> {
        self.record(Operation::SetProtocolVariant, LinkCall::SetVariant(variant))
    }

    fn start_protocol(&mut self, config: &SessionConfig) -> Result<(), PlatformError> {
        self.record(Operation::StartProtocol, LinkCall::StartProtocol)?;
        let mut state = lock(&self.state);
        state.listening = true;
        state.last_protocol_config = Some(config.clone());
        Ok(())
    }

    fn stop_protocol(&mut self) -> Result<(), PlatformError> {
        self.record(Operation::StopProtocol, LinkCall::StopProtocol)?;
        lock(&self.state).listening = false;
        Ok(())
    }

    fn reserved_data(&mut self) -> Result<ReservedData, PlatformError> {
        self.record(Operation::GetReservedData, LinkCall::GetReservedData)?;
        let data = lock(&self.state).reserved_data.unwrap_or([0; RESERVED_DATA_LEN]);
        Ok(ReservedData::new(data))
    }
}
