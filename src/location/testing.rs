//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::geocode::{DeviceGeocoder, GeocoderError, PostalQuery};
use super::sensor::{
    AuthorizationObserver, LocationSensor, SensorEvent, SensorSink, SensorSubscription,
};
use super::types::{AuthorizationState, Placemark};
use crate::transport::{HttpTransport, ServiceRequest, ServiceResponse, TransportError};

/// Ordered record of what the sensor did, shared with its subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Trace {
    Notified(AuthorizationState),
    StartUpdating,
}

#[derive(Default)]
struct Counters {
    subscribe: AtomicUsize,
    start_updating: AtomicUsize,
    live: AtomicUsize,
    when_in_use: AtomicUsize,
    always: AtomicUsize,
    trace: Mutex<Vec<Trace>>,
}

impl Counters {
    fn record(&self, entry: Trace) {
        self.trace.lock().unwrap().push(entry);
    }
}

/// Scripted sensor. Authorization only changes when a test says so.
pub(crate) struct FakeSensor {
    authorization: Mutex<AuthorizationState>,
    services_enabled: AtomicBool,
    sink: Mutex<Option<SensorSink>>,
    observer: Mutex<Option<AuthorizationObserver>>,
    counters: Arc<Counters>,
}

impl FakeSensor {
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            authorization: Mutex::new(authorization),
            services_enabled: AtomicBool::new(true),
            sink: Mutex::new(None),
            observer: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn set_authorization(&self, state: AuthorizationState) {
        *self.authorization.lock().unwrap() = state;
    }

    pub fn set_services_enabled(&self, enabled: bool) {
        self.services_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Deliver an event through the most recent subscription's sink.
    /// Authorization changes reach the observer first.
    pub fn emit(&self, event: SensorEvent) {
        let sink = self.current_sink().expect("no subscription was ever made");
        if let SensorEvent::AuthorizationChanged(state) = event {
            self.notify(state);
        }
        sink.deliver(event);
    }

    /// Change permission the way the platform would, with or without a
    /// live subscription.
    pub fn change_authorization(&self, state: AuthorizationState) {
        self.set_authorization(state);
        self.notify(state);
        if let Some(sink) = self.current_sink() {
            sink.deliver(SensorEvent::AuthorizationChanged(state));
        }
    }

    fn notify(&self, state: AuthorizationState) {
        self.counters.record(Trace::Notified(state));
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer.notify(state);
        }
    }

    pub fn trace(&self) -> Vec<Trace> {
        self.counters.trace.lock().unwrap().clone()
    }

    pub fn current_sink(&self) -> Option<SensorSink> {
        self.sink.lock().unwrap().clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.counters.subscribe.load(Ordering::SeqCst)
    }

    pub fn start_updating_calls(&self) -> usize {
        self.counters.start_updating.load(Ordering::SeqCst)
    }

    pub fn live_subscriptions(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn when_in_use_requests(&self) -> usize {
        self.counters.when_in_use.load(Ordering::SeqCst)
    }

    pub fn always_requests(&self) -> usize {
        self.counters.always.load(Ordering::SeqCst)
    }
}

impl LocationSensor for FakeSensor {
    fn authorization_status(&self) -> AuthorizationState {
        *self.authorization.lock().unwrap()
    }

    fn request_when_in_use(&self) {
        self.counters.when_in_use.fetch_add(1, Ordering::SeqCst);
    }

    fn request_always(&self) {
        self.counters.always.fetch_add(1, Ordering::SeqCst);
    }

    fn services_enabled(&self) -> bool {
        self.services_enabled.load(Ordering::SeqCst)
    }

    fn observe_authorization(&self, observer: AuthorizationObserver) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    fn subscribe(&self, sink: SensorSink) -> Box<dyn SensorSubscription> {
        self.counters.subscribe.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Box::new(FakeSubscription {
            counters: self.counters.clone(),
        })
    }
}

struct FakeSubscription {
    counters: Arc<Counters>,
}

impl SensorSubscription for FakeSubscription {
    fn start_updating(&mut self) {
        self.counters.start_updating.fetch_add(1, Ordering::SeqCst);
        self.counters.record(Trace::StartUpdating);
    }

    fn stop_updating(&mut self) {}
}

impl Drop for FakeSubscription {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport that replays queued responses and records every request.
#[derive(Default)]
pub(crate) struct FakeTransport {
    responses: Mutex<VecDeque<Result<ServiceResponse, TransportError>>>,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_json(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(Ok(ServiceResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn fail(&self, reason: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Request {
                url: "fake://".into(),
                reason: reason.into(),
            }));
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for FakeTransport {
    fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Request {
                    url: request.url.clone(),
                    reason: "no scripted response".into(),
                })
            })
    }
}

/// Geocoder returning fixed results and recording queries.
#[derive(Default)]
pub(crate) struct FakeGeocoder {
    results: Mutex<Option<Result<Vec<Placemark>, String>>>,
    addresses: Mutex<Vec<String>>,
    postal_queries: Mutex<Vec<PostalQuery>>,
}

impl FakeGeocoder {
    pub fn returning(placemarks: Vec<Placemark>) -> Self {
        let geocoder = Self::default();
        *geocoder.results.lock().unwrap() = Some(Ok(placemarks));
        geocoder
    }

    pub fn failing(reason: &str) -> Self {
        let geocoder = Self::default();
        *geocoder.results.lock().unwrap() = Some(Err(reason.to_string()));
        geocoder
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }

    pub fn postal_queries(&self) -> Vec<PostalQuery> {
        self.postal_queries.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<Vec<Placemark>, GeocoderError> {
        match self.results.lock().unwrap().clone() {
            Some(Ok(placemarks)) => Ok(placemarks),
            Some(Err(reason)) => Err(GeocoderError::Status(500, reason)),
            None => Ok(Vec::new()),
        }
    }
}

impl DeviceGeocoder for FakeGeocoder {
    fn geocode_address(&self, address: &str) -> Result<Vec<Placemark>, GeocoderError> {
        self.addresses.lock().unwrap().push(address.to_string());
        self.outcome()
    }

    fn geocode_postal(&self, query: &PostalQuery) -> Result<Vec<Placemark>, GeocoderError> {
        self.postal_queries.lock().unwrap().push(query.clone());
        self.outcome()
    }
}
