//! Event bus over the ESP-IDF default event loop.

use super::check;
use crate::config::ProtocolVariant;
use crate::event::{
    Event, EventSource, GotCredentials, IpEvent, SmartConfigEvent, WifiEvent, IP_EVENT_STA_GOT_IP,
};
use crate::notification::{
    is_notification_id, Notification, SessionEndedPayload, SESSION_ENDED_ID, SESSION_STARTED_ID,
};
use crate::platform::{EventBus, EventHandler, Operation, PlatformError};
use core::ffi::c_void;
use esp_idf_hal::delay::BLOCK;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_sys::{
    esp_event_base_t, esp_event_handler_instance_register, esp_event_handler_instance_t,
    esp_event_handler_instance_unregister, esp_event_post, ip_event_got_ip_t,
    smartconfig_event_got_ssid_pswd_t, ESP_EVENT_ANY_ID, IP_EVENT, SC_EVENT, WIFI_EVENT,
};
use log::warn;
use std::mem;
use std::net::Ipv4Addr;
use std::ptr;
use zeroize::Zeroize;

/// Handler context owned by the event loop registration.
struct Registration {
    source: EventSource,
    handler: EventHandler,
}

/// Registration on the default event loop.
///
/// Must be returned to [`EventBus::unsubscribe`]; dropping it leaks the
/// handler.
pub struct EspSubscription {
    source: EventSource,
    instance: esp_event_handler_instance_t,
    registration: *mut Registration,
}

/// [`EventBus`] backed by the default system event loop.
///
/// Holding the [`EspSystemEventLoop`] keeps the loop alive while any
/// session uses it.
#[derive(Clone)]
pub struct EspEventBus {
    _sysloop: EspSystemEventLoop,
}

impl EspEventBus {
    pub fn new(sysloop: EspSystemEventLoop) -> Self {
        Self { _sysloop: sysloop }
    }
}

fn event_base(source: EventSource) -> esp_event_base_t {
    unsafe {
        match source {
            EventSource::Wifi => WIFI_EVENT,
            EventSource::Ip => IP_EVENT,
            EventSource::SmartConfig => SC_EVENT,
        }
    }
}

impl EventBus for EspEventBus {
    type Subscription = EspSubscription;

    fn subscribe(
        &self,
        source: EventSource,
        handler: EventHandler,
    ) -> Result<EspSubscription, PlatformError> {
        let registration = Box::into_raw(Box::new(Registration { source, handler }));
        let mut instance: esp_event_handler_instance_t = ptr::null_mut();

        let result = check(Operation::Subscribe(source), unsafe {
            esp_event_handler_instance_register(
                event_base(source),
                ESP_EVENT_ANY_ID,
                Some(on_event),
                registration as *mut c_void,
                &mut instance,
            )
        });
        if let Err(e) = result {
            drop(unsafe { Box::from_raw(registration) });
            return Err(e);
        }

        Ok(EspSubscription {
            source,
            instance,
            registration,
        })
    }

    fn unsubscribe(&self, subscription: EspSubscription) -> Result<(), PlatformError> {
        check(Operation::Unsubscribe(subscription.source), unsafe {
            esp_event_handler_instance_unregister(
                event_base(subscription.source),
                ESP_EVENT_ANY_ID,
                subscription.instance,
            )
        })?;
        // The loop holds its mutex while a handler runs, so the context is
        // no longer in use once unregister returns.
        drop(unsafe { Box::from_raw(subscription.registration) });
        Ok(())
    }

    fn publish(&self, notification: &Notification) -> Result<(), PlatformError> {
        let code = match notification {
            Notification::SessionStarted => unsafe {
                esp_event_post(SC_EVENT, SESSION_STARTED_ID, ptr::null(), 0, BLOCK)
            },
            Notification::SessionEnded(creds) => {
                let mut payload = SessionEndedPayload::from(creds);
                // The loop copies the payload before `esp_event_post` returns.
                let code = unsafe {
                    esp_event_post(
                        SC_EVENT,
                        SESSION_ENDED_ID,
                        &payload as *const SessionEndedPayload as *const c_void,
                        mem::size_of::<SessionEndedPayload>() as _,
                        BLOCK,
                    )
                };
                payload.zeroize();
                code
            }
        };
        check(Operation::Publish, code)
    }
}

unsafe extern "C" fn on_event(
    arg: *mut c_void,
    _base: esp_event_base_t,
    id: i32,
    data: *mut c_void,
) {
    let registration = &mut *(arg as *mut Registration);
    let event = decode(registration.source, id, data);
    (registration.handler)(&event);
}

/// Decode a raw event of `source`.
///
/// # Safety
///
/// `data` must be null or point to the payload ESP-IDF posts for `id`.
unsafe fn decode(source: EventSource, id: i32, data: *const c_void) -> Event {
    match source {
        EventSource::Wifi => WifiEvent::from_id(id).into(),
        EventSource::Ip if id == IP_EVENT_STA_GOT_IP && !data.is_null() => {
            let got = &*(data as *const ip_event_got_ip_t);
            IpEvent::StaGotIp(Ipv4Addr::from(got.ip_info.ip.addr.to_le_bytes())).into()
        }
        EventSource::Ip => IpEvent::Other(id).into(),
        EventSource::SmartConfig if is_notification_id(id) => decode_notification(id, data),
        EventSource::SmartConfig => SmartConfigEvent::from_id(id, || {
            if data.is_null() {
                return None;
            }
            let raw = &*(data as *const smartconfig_event_got_ssid_pswd_t);
            Some(GotCredentials {
                ssid: raw.ssid,
                password: raw.password,
                bssid_set: raw.bssid_set,
                bssid: raw.bssid,
                variant: ProtocolVariant::from_raw(raw.type_).unwrap_or_default(),
                token: raw.token,
                cellphone_ip: raw.cellphone_ip,
            })
        })
        .into(),
    }
}

unsafe fn decode_notification(id: i32, data: *const c_void) -> Event {
    match id {
        SESSION_STARTED_ID => Notification::SessionStarted.into(),
        SESSION_ENDED_ID if !data.is_null() => {
            let payload = &*(data as *const SessionEndedPayload);
            match payload.to_credentials() {
                Ok(creds) => Notification::SessionEnded(creds).into(),
                Err(e) => {
                    warn!("Malformed session-ended payload: {}", e);
                    SmartConfigEvent::Other(id).into()
                }
            }
        }
        other => SmartConfigEvent::Other(other).into(),
    }
}
