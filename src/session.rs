//! SmartConfig provisioning session.
//!
//! A [`Session`] takes a headless device from "unconfigured" to "connected":
//! it starts the WiFi station, listens for the SmartConfig broadcast from the
//! phone app, applies the received credentials and reconnects, then hands the
//! credentials to whoever listens for [`Notification::SessionEnded`].
//!
//! # State machine
//!
//! ```text
//! Idle --sta-start--> Scanning --got-ssid-pswd--> CredentialsCaptured
//!                                                        |
//!      Connected <--send-ack-done-- Applying <-----------+
//! ```
//!
//! Link status (`Down`, `Up`, `Reconnecting`) is tracked beside the state:
//! a station disconnect triggers one reconnect request and never sends the
//! session back to `Scanning`.
//!
//! # Errors
//!
//! A failing platform call during construction, destruction or an event
//! reaction leaves the device without a usable network stack, so it is fatal
//! at those boundaries (see [`fatal`]). The reaction logic itself returns
//! [`SessionError`].

use crate::config::{ConfigError, CredentialBuilder, Credentials, SessionConfig};
use crate::event::{Event, EventSource, GotCredentials, IpEvent, SmartConfigEvent, WifiEvent};
use crate::notification::Notification;
use crate::platform::{EventBus, EventHandler, LinkControl, PlatformError, ProtocolControl};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Provisioning progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, waiting for the station to start.
    Idle,
    /// Listening for the SmartConfig broadcast.
    Scanning,
    /// Credentials copied, not yet applied.
    CredentialsCaptured,
    /// Station reconfigured, waiting for the phone's acknowledgment.
    Applying,
    /// Handshake acknowledged and credentials handed out.
    Connected,
}

/// Station connectivity, orthogonal to [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    /// The IP stack reported an address.
    Up(Ipv4Addr),
    /// Disconnected, reconnect requested.
    Reconnecting,
}

/// Errors that can occur while running a session.
#[derive(Debug)]
pub enum SessionError {
    /// A platform primitive failed.
    Platform(PlatformError),
    /// Invalid configuration or credential data.
    Config(ConfigError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform(e) => write!(f, "platform error: {}", e),
            Self::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<PlatformError> for SessionError {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Abort on an unrecoverable platform error.
///
/// Logs the error, then panics. ESP-IDF builds abort on panic, matching
/// `ESP_ERROR_CHECK`.
pub fn fatal(context: &str, err: &dyn fmt::Display) -> ! {
    error!("{}: {}", context, err);
    panic!("{}: {}", context, err)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The session's state machine.
///
/// Owns the credential record and the link it drives. Only [`Session`]
/// creates one; subscription handlers reach it through a shared mutex.
pub struct Reactor<L, B> {
    config: SessionConfig,
    state: SessionState,
    link_status: LinkStatus,
    builder: CredentialBuilder,
    link: L,
    bus: B,
}

impl<L, B> Reactor<L, B>
where
    L: LinkControl + ProtocolControl,
    B: EventBus,
{
    fn new(config: SessionConfig, link: L, bus: B) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            link_status: LinkStatus::Down,
            builder: CredentialBuilder::new(),
            link,
            bus,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link_status
    }

    /// The record captured in the current handshake.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.builder.credentials()
    }

    /// React to one event.
    ///
    /// Events that make no sense in the current state are ignored.
    pub fn react(&mut self, event: &Event) -> Result<(), SessionError> {
        match event {
            Event::Wifi(WifiEvent::StaStart) => self.on_station_start(),
            Event::Wifi(WifiEvent::StaDisconnected) => self.on_disconnected(),
            Event::Ip(IpEvent::StaGotIp(ip)) => {
                self.on_got_ip(*ip);
                Ok(())
            }
            Event::SmartConfig(SmartConfigEvent::ScanDone) => {
                if self.config.verbose {
                    info!("AP scan done");
                }
                Ok(())
            }
            Event::SmartConfig(SmartConfigEvent::FoundChannel) => {
                if self.config.verbose {
                    info!("Found target AP channel");
                }
                Ok(())
            }
            Event::SmartConfig(SmartConfigEvent::GotCredentials(got)) => {
                self.on_credentials(got)
            }
            Event::SmartConfig(SmartConfigEvent::SendAckDone) => self.on_ack_sent(),
            _ => {
                debug!("Ignoring {} event {:#x}", event.source(), event.id());
                Ok(())
            }
        }
    }

    fn on_station_start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            debug!("Station start in state {:?}, ignored", self.state);
            return Ok(());
        }
        if self.config.verbose {
            info!("Starting SmartConfig session ({})", self.config.variant);
        }

        self.bus.publish(&Notification::SessionStarted)?;
        self.link.set_variant(self.config.variant)?;
        self.link.start_protocol(&self.config)?;
        self.state = SessionState::Scanning;
        Ok(())
    }

    fn on_disconnected(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Idle {
            debug!("Disconnect before station start, ignored");
            return Ok(());
        }
        if self.config.verbose {
            info!("Disconnected from AP, reconnecting");
        }

        self.link_status = LinkStatus::Reconnecting;
        self.link.connect()?;
        Ok(())
    }

    fn on_got_ip(&mut self, ip: Ipv4Addr) {
        if self.config.verbose {
            info!("Connected to AP, got IP {}", ip);
        }
        self.link_status = LinkStatus::Up(ip);
    }

    fn on_credentials(&mut self, got: &GotCredentials) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Scanning | SessionState::Applying) {
            debug!("Credentials in state {:?}, ignored", self.state);
            return Ok(());
        }

        self.builder.reset();
        let creds = self.builder.capture(got.ssid()?, got.password()?, got.bssid());
        self.state = SessionState::CredentialsCaptured;

        if self.config.verbose {
            info!("Got SSID and password ({})", got.variant);
            info!("    SSID: {}", creds.ssid());
            info!("PASSWORD: <{} bytes>", creds.password().len());
            if let Some(bssid) = creds.bssid() {
                info!("   BSSID: {}", bssid);
            }
            debug!("Sent by {} (token {})", got.cellphone_ip(), got.token);
        }

        if got.variant.carries_reserved_data() {
            let data = self.link.reserved_data()?;
            if self.config.verbose {
                info!("RVD_DATA: {}", data.to_hex());
            }
            self.builder.attach_reserved_data(data)?;
        }

        let station = self
            .builder
            .credentials()
            .map(Credentials::station_config)
            .ok_or(ConfigError::NotCaptured)?;

        self.link.disconnect()?;
        self.link_status = LinkStatus::Down;
        self.link.set_station_config(&station)?;
        self.link.connect()?;
        self.state = SessionState::Applying;
        Ok(())
    }

    fn on_ack_sent(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::CredentialsCaptured | SessionState::Applying
        ) {
            debug!("Ack in state {:?}, ignored", self.state);
            return Ok(());
        }
        let Some(creds) = self.builder.take() else {
            warn!("Ack without captured credentials, ignored");
            return Ok(());
        };
        if self.config.verbose {
            info!("Ending SmartConfig session");
        }

        self.bus.publish(&Notification::SessionEnded(creds))?;
        self.link.stop_protocol()?;
        self.state = SessionState::Connected;
        Ok(())
    }
}

/// Subscriptions held by a session, released on drop.
///
/// Filled one at a time during construction, so a failure part way through
/// still releases the handles acquired so far.
struct Subscriptions<B: EventBus> {
    bus: B,
    handles: Vec<(EventSource, B::Subscription)>,
}

impl<B: EventBus> Subscriptions<B> {
    fn new(bus: B) -> Self {
        Self {
            bus,
            handles: Vec::with_capacity(EventSource::ALL.len()),
        }
    }

    fn add(&mut self, source: EventSource, handler: EventHandler) -> Result<(), PlatformError> {
        let handle = self.bus.subscribe(source, handler)?;
        self.handles.push((source, handle));
        Ok(())
    }
}

impl<B: EventBus> Drop for Subscriptions<B> {
    fn drop(&mut self) {
        let mut first_error = None;
        for (source, handle) in self.handles.drain(..) {
            if let Err(e) = self.bus.unsubscribe(handle) {
                error!("Failed to unsubscribe from {}: {}", source, e);
                first_error.get_or_insert(e);
            }
        }

        // A leaked subscription keeps reacting after the session is gone.
        if let Some(e) = first_error {
            if !std::thread::panicking() {
                fatal("SmartConfig session teardown", &e);
            }
        }
    }
}

/// A running provisioning session.
///
/// Dropping the session releases its three subscriptions. It does not
/// disconnect the station.
pub struct Session<L, B: EventBus> {
    // Declared first so handlers are gone before the reactor is released.
    subscriptions: Subscriptions<B>,
    reactor: Arc<Mutex<Reactor<L, B>>>,
}

impl<L, B> Session<L, B>
where
    L: LinkControl + ProtocolControl + Send + 'static,
    B: EventBus + Clone + Send + 'static,
{
    /// Start provisioning, aborting on any platform failure.
    pub fn new(config: SessionConfig, link: L, bus: B) -> Self {
        Self::try_new(config, link, bus)
            .unwrap_or_else(|e| fatal("SmartConfig session start", &e))
    }

    /// Start provisioning.
    ///
    /// Creates the station interface, initialises the driver, subscribes to
    /// WiFi, IP and SmartConfig events, then starts the station. Scanning
    /// begins once the driver reports the station started.
    pub fn try_new(config: SessionConfig, mut link: L, bus: B) -> Result<Self, SessionError> {
        config.validate()?;

        link.create_default_sta_netif()?;
        link.init()?;

        let reactor = Arc::new(Mutex::new(Reactor::new(config, link, bus.clone())));
        let mut subscriptions = Subscriptions::new(bus);
        for source in EventSource::ALL {
            let reactor = Arc::clone(&reactor);
            subscriptions.add(source, Box::new(move |event: &Event| dispatch(&reactor, event)))?;
        }

        {
            let mut reactor = lock(&reactor);
            reactor.link.set_station_mode()?;
            reactor.link.start()?;
        }

        Ok(Self {
            subscriptions,
            reactor,
        })
    }

    /// Feed one event to the session, as the dispatcher does.
    pub fn handle(&self, event: &Event) {
        dispatch(&self.reactor, event);
    }
}

impl<L, B> Session<L, B>
where
    L: LinkControl + ProtocolControl,
    B: EventBus,
{
    pub fn state(&self) -> SessionState {
        lock(&self.reactor).state()
    }

    pub fn link_status(&self) -> LinkStatus {
        lock(&self.reactor).link_status()
    }

    /// Copy of the credentials captured in the current handshake.
    ///
    /// `None` before the first capture and after they were handed out with
    /// `SessionEnded`.
    pub fn credentials(&self) -> Option<Credentials> {
        lock(&self.reactor).credentials().cloned()
    }

    pub fn config(&self) -> SessionConfig {
        lock(&self.reactor).config.clone()
    }

    /// Number of subscriptions currently held.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.handles.len()
    }
}

/// Run one reaction; errors are fatal here.
fn dispatch<L, B>(reactor: &Mutex<Reactor<L, B>>, event: &Event)
where
    L: LinkControl + ProtocolControl,
    B: EventBus,
{
    let mut reactor = lock(reactor);
    if let Err(e) = reactor.react(event) {
        fatal("SmartConfig event handler", &e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bssid, ProtocolVariant, StationConfig, RESERVED_DATA_LEN};
    use crate::event::SC_EVENT_SEND_ACK_DONE;
    use crate::platform::Operation;
    use crate::testing::{LinkCall, MockBus, MockLink};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn start(config: SessionConfig) -> (Session<MockLink, MockBus>, MockLink, MockBus) {
        init_logger();
        let link = MockLink::new();
        let bus = MockBus::new();
        let session = Session::new(config, link.clone(), bus.clone());
        (session, link, bus)
    }

    fn scanning(config: SessionConfig) -> (Session<MockLink, MockBus>, MockLink, MockBus) {
        let (session, link, bus) = start(config);
        bus.dispatch(WifiEvent::StaStart);
        link.clear_calls();
        (session, link, bus)
    }

    fn got(ssid: &[u8], password: &[u8]) -> SmartConfigEvent {
        SmartConfigEvent::GotCredentials(GotCredentials::new(ssid, password).unwrap())
    }

    fn got_v2(ssid: &[u8], password: &[u8]) -> SmartConfigEvent {
        SmartConfigEvent::GotCredentials(
            GotCredentials::new(ssid, password)
                .unwrap()
                .with_variant(ProtocolVariant::EspTouchV2),
        )
    }

    fn ended(bus: &MockBus) -> Vec<Credentials> {
        bus.published()
            .into_iter()
            .filter_map(|n| match n {
                Notification::SessionEnded(creds) => Some(creds),
                Notification::SessionStarted => None,
            })
            .collect()
    }

    // ==================== Construction / Destruction ====================

    #[test]
    fn test_construction_order() {
        let (session, link, bus) = start(SessionConfig::default());
        assert_eq!(
            link.calls(),
            vec![
                LinkCall::CreateNetif,
                LinkCall::Init,
                LinkCall::SetMode,
                LinkCall::Start
            ]
        );
        let sources: Vec<_> = bus.active_subscriptions().iter().map(|s| s.source).collect();
        assert_eq!(sources, EventSource::ALL.to_vec());
        assert_eq!(session.subscription_count(), 3);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(bus.published().is_empty());
    }

    #[test]
    fn test_drop_releases_exactly_three_subscriptions() {
        let (session, link, bus) = start(SessionConfig::default());
        drop(session);
        assert_eq!(bus.unsubscribed().len(), 3);
        assert!(bus.active_subscriptions().is_empty());
        // Teardown never touches the network.
        assert_eq!(link.count(&LinkCall::Disconnect), 0);
    }

    #[test]
    fn test_failed_subscribe_releases_acquired_handles() {
        init_logger();
        let link = MockLink::new();
        let bus = MockBus::new();
        bus.fail_on(Operation::Subscribe(EventSource::SmartConfig));

        let result = Session::try_new(SessionConfig::default(), link.clone(), bus.clone());
        assert!(matches!(
            result,
            Err(SessionError::Platform(PlatformError {
                operation: Operation::Subscribe(EventSource::SmartConfig),
                ..
            }))
        ));
        assert_eq!(bus.unsubscribed().len(), 2);
        assert!(bus.active_subscriptions().is_empty());
        assert_eq!(link.count(&LinkCall::Start), 0);
    }

    #[test]
    fn test_failed_start_releases_subscriptions() {
        init_logger();
        let link = MockLink::new();
        let bus = MockBus::new();
        link.fail_on(Operation::Start);

        let result = Session::try_new(SessionConfig::default(), link, bus.clone());
        assert!(result.is_err());
        assert_eq!(bus.unsubscribed().len(), 3);
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        init_logger();
        let link = MockLink::new();
        let bus = MockBus::new();
        let config = SessionConfig::default().with_v2_crypt_key([1; 16]);

        let result = Session::try_new(config, link.clone(), bus.clone());
        assert!(matches!(result, Err(SessionError::Config(_))));
        assert!(link.calls().is_empty());
        assert!(bus.active_subscriptions().is_empty());
    }

    #[test]
    #[should_panic(expected = "SmartConfig session start")]
    fn test_new_is_fatal_on_init_failure() {
        init_logger();
        let link = MockLink::new();
        link.fail_on(Operation::Init);
        let _session = Session::new(SessionConfig::default(), link, MockBus::new());
    }

    #[test]
    #[should_panic(expected = "SmartConfig session teardown")]
    fn test_unsubscribe_failure_is_fatal() {
        let (session, _link, bus) = start(SessionConfig::default());
        bus.fail_on(Operation::Unsubscribe(EventSource::Ip));
        drop(session);
    }

    // ==================== Idle ====================

    #[test]
    fn test_idle_ignores_everything_but_station_start() {
        let (session, link, bus) = start(SessionConfig::default().with_verbose(true));
        link.clear_calls();

        let events: Vec<Event> = vec![
            WifiEvent::StaDisconnected.into(),
            WifiEvent::Other(4).into(),
            IpEvent::StaGotIp(Ipv4Addr::new(10, 0, 0, 2)).into(),
            SmartConfigEvent::ScanDone.into(),
            SmartConfigEvent::FoundChannel.into(),
            got(b"Net1", b"pass1234").into(),
            SmartConfigEvent::SendAckDone.into(),
            SmartConfigEvent::Other(9).into(),
        ];
        for event in events {
            bus.dispatch(event);
            assert_eq!(session.state(), SessionState::Idle);
        }
        assert!(link.calls().is_empty());
        assert!(bus.published().is_empty());
        assert!(session.credentials().is_none());
    }

    // ==================== Scenario A: station start ====================

    #[test]
    fn test_station_start_begins_scanning() {
        let (session, link, bus) = start(SessionConfig::default());
        link.clear_calls();

        bus.dispatch(WifiEvent::StaStart);

        assert_eq!(bus.published(), vec![Notification::SessionStarted]);
        assert_eq!(
            link.calls(),
            vec![
                LinkCall::SetVariant(ProtocolVariant::EspTouch),
                LinkCall::StartProtocol
            ]
        );
        assert!(link.is_listening());
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_protocol_started_with_session_config() {
        let config = SessionConfig::default()
            .with_variant(ProtocolVariant::EspTouchV2)
            .with_v2_crypt_key(*b"0123456789abcdef");
        let (_session, link, _bus) = scanning(config.clone());
        assert_eq!(link.protocol_config(), Some(config));
    }

    #[test]
    fn test_second_station_start_is_ignored() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(WifiEvent::StaStart);
        assert_eq!(bus.published().len(), 1);
        assert!(link.calls().is_empty());
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_scan_diagnostics_do_not_change_state() {
        let (session, link, _bus) = scanning(SessionConfig::default().with_verbose(true));
        session.handle(&SmartConfigEvent::ScanDone.into());
        session.handle(&SmartConfigEvent::FoundChannel.into());
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(link.calls().is_empty());
    }

    // ==================== Scenario B: credentials received ====================

    #[test]
    fn test_credentials_applied_to_station() {
        let (session, link, bus) = scanning(SessionConfig::default());

        bus.dispatch(got(b"Net1", b"pass1234"));

        let expected = StationConfig {
            ssid: crate::config::Ssid::new(b"Net1").unwrap(),
            password: crate::config::Passphrase::new(b"pass1234").unwrap(),
            bssid: None,
        };
        assert_eq!(
            link.calls(),
            vec![
                LinkCall::Disconnect,
                LinkCall::SetConfig(expected),
                LinkCall::Connect
            ]
        );
        assert_eq!(session.state(), SessionState::Applying);

        let creds = session.credentials().unwrap();
        assert_eq!(creds.ssid().as_bytes(), b"Net1");
        assert_eq!(creds.password().as_bytes(), b"pass1234");
        assert!(creds.bssid().is_none());
        assert!(creds.reserved_data().is_none());
    }

    #[test]
    fn test_bssid_copied_only_when_flagged() {
        let (session, link, bus) = scanning(SessionConfig::default());
        let bssid = Bssid::new([0, 0, 0, 0, 0, 0]);
        let payload = GotCredentials::new(b"Net1", b"pass1234")
            .unwrap()
            .with_bssid(bssid);

        bus.dispatch(SmartConfigEvent::GotCredentials(payload));
        assert_eq!(session.credentials().unwrap().bssid(), Some(&bssid));

        let mut unflagged = GotCredentials::new(b"Net1", b"pass1234").unwrap();
        unflagged.bssid = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
        bus.dispatch(SmartConfigEvent::GotCredentials(unflagged));

        assert!(session.credentials().unwrap().bssid().is_none());
        match link.calls().last() {
            Some(LinkCall::Connect) => {}
            other => panic!("expected connect last, got {:?}", other),
        }
        let configs: Vec<_> = link
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                LinkCall::SetConfig(config) => Some(config.bssid),
                _ => None,
            })
            .collect();
        assert_eq!(configs, vec![Some(bssid), None]);
    }

    // ==================== Scenario C: reserved data ====================

    #[test]
    fn test_v2_reserved_data_captured() {
        let (session, link, bus) = scanning(SessionConfig::default());
        link.set_reserved_data([0xaa; RESERVED_DATA_LEN]);

        bus.dispatch(got_v2(b"Net1", b"pass1234"));

        let creds = session.credentials().unwrap();
        let data = creds.reserved_data().expect("reserved data present");
        assert_eq!(data.as_bytes(), &[0xaa; RESERVED_DATA_LEN]);
        assert_eq!(link.count(&LinkCall::GetReservedData), 1);
    }

    #[test]
    fn test_basic_variant_never_fetches_reserved_data() {
        let (session, link, bus) = scanning(SessionConfig::default());
        link.set_reserved_data([0xaa; RESERVED_DATA_LEN]);

        bus.dispatch(got(b"Net1", b"pass1234"));

        assert_eq!(link.count(&LinkCall::GetReservedData), 0);
        assert!(session.credentials().unwrap().reserved_data().is_none());
    }

    #[test]
    fn test_no_reserved_data_leak_across_handshakes() {
        let (session, link, bus) = scanning(SessionConfig::default());
        link.set_reserved_data([0xaa; RESERVED_DATA_LEN]);

        bus.dispatch(got_v2(b"Net1", b"pass1234"));
        assert!(session.credentials().unwrap().reserved_data().is_some());

        // The phone resends before acknowledging, this time without v2 data.
        bus.dispatch(got(b"Net2", b"otherpass"));
        let creds = session.credentials().unwrap();
        assert_eq!(creds.ssid().as_bytes(), b"Net2");
        assert!(creds.reserved_data().is_none());

        bus.dispatch(SmartConfigEvent::SendAckDone);
        let delivered = ended(&bus);
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].reserved_data().is_none());
    }

    // ==================== Scenario D: ack sent ====================

    #[test]
    fn test_ack_publishes_session_ended() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        link.clear_calls();

        bus.dispatch(SmartConfigEvent::SendAckDone);

        let delivered = ended(&bus);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].ssid().as_bytes(), b"Net1");
        assert_eq!(delivered[0].password().as_bytes(), b"pass1234");
        assert!(delivered[0].bssid().is_none());
        assert!(delivered[0].reserved_data().is_none());

        assert_eq!(link.calls(), vec![LinkCall::StopProtocol]);
        assert!(!link.is_listening());
        assert_eq!(session.state(), SessionState::Connected);
        // The record was moved into the notification.
        assert!(session.credentials().is_none());
    }

    #[test]
    fn test_ack_before_got_ip_carries_record() {
        let (session, _link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        bus.dispatch(SmartConfigEvent::SendAckDone);
        bus.dispatch(IpEvent::StaGotIp(Ipv4Addr::new(192, 168, 4, 7)));

        assert_eq!(ended(&bus).len(), 1);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(
            session.link_status(),
            LinkStatus::Up(Ipv4Addr::new(192, 168, 4, 7))
        );
    }

    #[test]
    fn test_got_ip_is_informational() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        link.clear_calls();

        bus.dispatch(IpEvent::StaGotIp(Ipv4Addr::new(10, 1, 1, 5)));

        assert_eq!(session.state(), SessionState::Applying);
        assert_eq!(session.link_status(), LinkStatus::Up(Ipv4Addr::new(10, 1, 1, 5)));
        assert!(link.calls().is_empty());
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn test_ack_without_credentials_is_ignored() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(SmartConfigEvent::SendAckDone);
        assert!(ended(&bus).is_empty());
        assert!(link.calls().is_empty());
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_second_ack_is_ignored() {
        let (_session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        bus.dispatch(SmartConfigEvent::SendAckDone);
        bus.dispatch(SmartConfigEvent::SendAckDone);
        assert_eq!(ended(&bus).len(), 1);
        assert_eq!(link.count(&LinkCall::StopProtocol), 1);
    }

    #[test]
    fn test_credentials_after_ack_are_ignored() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        bus.dispatch(SmartConfigEvent::SendAckDone);
        link.clear_calls();

        bus.dispatch(got(b"Late", b"latepass"));
        assert!(link.calls().is_empty());
        assert!(session.credentials().is_none());
    }

    #[test]
    fn test_ended_matches_captured_bytes() {
        let (_session, _link, bus) = scanning(SessionConfig::default());
        let ssid = [0xe2, 0x98, 0x83, b' ', 0xff, b'x'];
        let password = [b'p'; 64];
        bus.dispatch(got(&ssid, &password));
        bus.dispatch(SmartConfigEvent::SendAckDone);

        let delivered = ended(&bus);
        assert_eq!(delivered[0].ssid().as_bytes(), &ssid);
        assert_eq!(delivered[0].password().as_bytes(), &password[..]);
    }

    // ==================== Scenario E: disconnect ====================

    #[test]
    fn test_disconnect_requests_one_reconnect() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        let before = session.credentials();
        link.clear_calls();

        bus.dispatch(WifiEvent::StaDisconnected);

        assert_eq!(link.calls(), vec![LinkCall::Connect]);
        assert_eq!(session.credentials(), before);
        assert_eq!(session.state(), SessionState::Applying);
        assert_eq!(session.link_status(), LinkStatus::Reconnecting);
    }

    #[test]
    fn test_disconnect_while_scanning_keeps_scanning() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(WifiEvent::StaDisconnected);
        assert_eq!(link.calls(), vec![LinkCall::Connect]);
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(session.credentials().is_none());
    }

    #[test]
    fn test_disconnect_after_completion_reconnects() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(got(b"Net1", b"pass1234"));
        bus.dispatch(SmartConfigEvent::SendAckDone);
        link.clear_calls();

        bus.dispatch(WifiEvent::StaDisconnected);
        assert_eq!(link.calls(), vec![LinkCall::Connect]);
        assert_eq!(session.state(), SessionState::Connected);
    }

    // ==================== Ignored events / fatal reactions ====================

    #[test]
    fn test_own_notifications_are_ignored() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(Notification::SessionStarted);
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(link.calls().is_empty());
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let (session, link, bus) = scanning(SessionConfig::default());
        bus.dispatch(SmartConfigEvent::Other(SC_EVENT_SEND_ACK_DONE + 10));
        bus.dispatch(IpEvent::Other(3));
        bus.dispatch(WifiEvent::Other(0));
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(link.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "SmartConfig event handler")]
    fn test_set_config_failure_is_fatal() {
        let (_session, link, bus) = scanning(SessionConfig::default());
        link.fail_on(Operation::SetConfig);
        bus.dispatch(got(b"Net1", b"pass1234"));
    }

    #[test]
    #[should_panic(expected = "SmartConfig event handler")]
    fn test_publish_failure_is_fatal() {
        let (_session, _link, bus) = start(SessionConfig::default());
        bus.fail_on(Operation::Publish);
        bus.dispatch(WifiEvent::StaStart);
    }
}
