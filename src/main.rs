//! SmartConfig provisioning firmware binary.
//!
//! Build-time settings (read with `option_env!`):
//!
//! - `SMARTCONFIG_VARIANT` - `esptouch`, `airkiss`, `esptouch-airkiss` or
//!   `esptouch-v2`
//! - `SMARTCONFIG_V2_KEY` - 16-character ESP-TOUCH v2 key
//! - `SMARTCONFIG_VERBOSE` - log every handled event

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::info;
    use smartconfig_rs_esp32::esp::{EspEventBus, EspLink};
    use smartconfig_rs_esp32::session::fatal;
    use smartconfig_rs_esp32::{Event, EventBus, EventSource, Notification, Session, SessionConfig};
    use std::sync::mpsc;
    use std::time::Duration;

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== SmartConfig provisioning starting ===");

    let config = SessionConfig::default()
        .with_overrides(
            option_env!("SMARTCONFIG_VERBOSE"),
            option_env!("SMARTCONFIG_VARIANT"),
            option_env!("SMARTCONFIG_V2_KEY"),
        )
        .unwrap_or_else(|e| fatal("build configuration", &e));
    info!("Listening for {} broadcasts", config.variant);

    let peripherals = Peripherals::take().unwrap_or_else(|e| fatal("peripherals", &e));
    let sysloop = EspSystemEventLoop::take().unwrap_or_else(|e| fatal("event loop", &e));
    let nvs = EspDefaultNvsPartition::take().unwrap_or_else(|e| fatal("NVS partition", &e));

    let bus = EspEventBus::new(sysloop.clone());

    // Forward session notifications to this task
    let (tx, rx) = mpsc::channel();
    let watcher = bus
        .subscribe(
            EventSource::SmartConfig,
            Box::new(move |event: &Event| {
                if let Event::Notification(notification) = event {
                    let _ = tx.send(notification.clone());
                }
            }),
        )
        .unwrap_or_else(|e| fatal("notification subscription", &e));

    let link = EspLink::new(peripherals.modem, sysloop, Some(nvs));
    let session = Session::new(config, link, bus.clone());

    for notification in rx.iter() {
        match notification {
            Notification::SessionStarted => info!("Waiting for the phone app..."),
            Notification::SessionEnded(creds) => {
                info!(
                    "Provisioned: ssid={}, bssid={}",
                    creds.ssid(),
                    creds
                        .bssid()
                        .map_or_else(|| "any".to_string(), |b| b.to_string())
                );
                if let Some(data) = creds.reserved_data() {
                    info!("Reserved data: {}", data.to_hex());
                }
                break;
            }
        }
    }

    if let Err(e) = bus.unsubscribe(watcher) {
        fatal("notification unsubscribe", &e);
    }

    info!("Entering main loop...");
    loop {
        std::thread::sleep(Duration::from_secs(10));
        info!(
            "Session {:?}, link {:?}",
            session.state(),
            session.link_status()
        );
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::init();
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo test' for host testing.");
}
