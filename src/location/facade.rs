//! Public entry point composing permission, sensing, geocoding and distance.

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use super::authorization::AuthorizationGate;
use super::distance::DistanceResolver;
use super::geocode::{DeviceGeocoder, GeocodeProviderChain};
use super::providers::{IpLocationSensor, NominatimGeocoder};
use super::sensor::LocationSensor;
use super::session::LocationSensorSession;
use super::types::{
    AuthorizationState, Coordinate, LocationError, LocationFix, Placemark, TravelDistance,
};
use crate::config::{EndpointSource, Settings, IP_GEOLOCATION, NOMINATIM_SEARCH};
use crate::transport::{HttpTransport, UreqTransport};

#[derive(Clone)]
pub struct LocationFacade {
    gate: AuthorizationGate,
    session: LocationSensorSession,
    geocoding: Arc<GeocodeProviderChain>,
    distances: Arc<DistanceResolver>,
    default_country: Option<String>,
}

impl LocationFacade {
    /// Wire the facade from its collaborators. Spawns the session task, so
    /// it must be called from within a Tokio runtime.
    pub fn new(
        sensor: Arc<dyn LocationSensor>,
        geocoder: Arc<dyn DeviceGeocoder>,
        transport: Arc<dyn HttpTransport>,
        endpoints: Arc<dyn EndpointSource>,
    ) -> Self {
        let gate = AuthorizationGate::new(Arc::clone(&sensor));
        let session = LocationSensorSession::spawn(sensor, gate.clone());
        let geocoding =
            GeocodeProviderChain::new(geocoder, Arc::clone(&transport), Arc::clone(&endpoints));
        let distances = DistanceResolver::new(transport, endpoints, session.fixes());

        Self {
            gate,
            session,
            geocoding: Arc::new(geocoding),
            distances: Arc::new(distances),
            default_country: None,
        }
    }

    /// Build the shipped stack: ureq transport, IP geolocation sensor and
    /// Nominatim device geocoder.
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(UreqTransport::new(settings.request_timeout()));
        let ip_url = settings.url_for(IP_GEOLOCATION).unwrap_or_default();
        let search_url = settings.url_for(NOMINATIM_SEARCH).unwrap_or_default();

        let sensor = Arc::new(IpLocationSensor::new(
            Arc::clone(&transport),
            ip_url,
            settings.grant_location,
        ));
        let geocoder = Arc::new(NominatimGeocoder::new(Arc::clone(&transport), search_url));
        let default_country = settings.default_country.clone();

        let mut facade = Self::new(sensor, geocoder, transport, settings);
        facade.default_country = Some(default_country);
        facade
    }

    // ─── Current location ───────────────────────────────────────

    /// Request the current location. The callback runs exactly once unless a
    /// later request replaces this one, in which case it never runs.
    pub fn get_current_location<F>(&self, on_result: F)
    where
        F: FnOnce(Result<LocationFix, LocationError>) + Send + 'static,
    {
        self.session.start(on_result);
    }

    /// Awaitable form of [`get_current_location`](Self::get_current_location).
    /// Resolves to [`LocationError::Superseded`] if a later request replaces
    /// this one.
    pub async fn current_location(&self) -> Result<LocationFix, LocationError> {
        let (tx, rx) = oneshot::channel();
        self.session.start(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or_else(|_| {
            debug!("location request superseded");
            Err(LocationError::Superseded)
        })
    }

    pub fn enable(&self) {
        self.session.enable();
    }

    pub fn disable(&self) {
        self.session.disable();
    }

    pub fn last_fix(&self) -> Option<LocationFix> {
        self.session.last_fix()
    }

    // ─── Authorization ──────────────────────────────────────────

    pub fn authorization_changes(&self) -> broadcast::Receiver<AuthorizationState> {
        self.gate.subscribe()
    }

    pub fn authorization_status(&self) -> AuthorizationState {
        self.gate.check_authorization()
    }

    pub fn is_location_enabled(&self) -> bool {
        self.gate.is_location_enabled()
    }

    pub fn request_always_authorization(&self) {
        self.gate.request_always_authorization();
    }

    // ─── Geocoding ──────────────────────────────────────────────

    pub async fn geocode_address(&self, address: &str) -> Result<Placemark, LocationError> {
        self.geocoding.geocode_address(address).await
    }

    /// Geocode a postal code. Without an explicit country the configured
    /// default applies, then "US".
    pub async fn geocode_zip(
        &self,
        zip: &str,
        country: Option<&str>,
    ) -> Result<Placemark, LocationError> {
        let country = country.or(self.default_country.as_deref());
        self.geocoding.geocode_zip(zip, country).await
    }

    pub async fn geocode_address_remote(&self, address: &str) -> Result<Placemark, LocationError> {
        self.geocoding.geocode_address_remote(address).await
    }

    // ─── Distance ───────────────────────────────────────────────

    pub fn distance_from_current(&self, point: Coordinate) -> Option<f64> {
        self.distances.distance_from_current(point)
    }

    pub async fn travel_distance_from_current(&self, point: Coordinate) -> TravelDistance {
        self.distances.travel_distance_from_current(point).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GOOGLE_GEOCODE;
    use crate::location::sensor::SensorEvent;
    use crate::location::testing::{FakeGeocoder, FakeSensor, FakeTransport};
    use approx::assert_abs_diff_eq;
    use std::collections::HashMap;

    struct Harness {
        facade: LocationFacade,
        sensor: Arc<FakeSensor>,
        geocoder: Arc<FakeGeocoder>,
        transport: Arc<FakeTransport>,
    }

    fn harness(state: AuthorizationState, geocoder: FakeGeocoder) -> Harness {
        let sensor = Arc::new(FakeSensor::new(state));
        let geocoder = Arc::new(geocoder);
        let transport = Arc::new(FakeTransport::new());
        let mut endpoints = HashMap::new();
        endpoints.insert(
            GOOGLE_GEOCODE.to_string(),
            "https://geo.example/json?address=".to_string(),
        );
        let facade = LocationFacade::new(
            sensor.clone(),
            geocoder.clone(),
            transport.clone(),
            Arc::new(endpoints),
        );
        Harness {
            facade,
            sensor,
            geocoder,
            transport,
        }
    }

    fn fix(lat: f64, lon: f64) -> LocationFix {
        LocationFix::now(Coordinate::new(lat, lon))
    }

    async fn wait_until_sensing(h: &Harness) {
        for _ in 0..100 {
            if h.sensor.start_updating_calls() > 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("sensor never started");
    }

    #[tokio::test]
    async fn test_current_location_resolves_with_fix() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        let facade = h.facade.clone();
        let pending = tokio::spawn(async move { facade.current_location().await });

        wait_until_sensing(&h).await;
        h.sensor.emit(SensorEvent::Fix(fix(48.85, 2.35)));

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome.coordinate, Coordinate::new(48.85, 2.35));
        assert_eq!(h.facade.last_fix().map(|f| f.coordinate), Some(Coordinate::new(48.85, 2.35)));
    }

    #[tokio::test]
    async fn test_current_location_superseded() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        let facade = h.facade.clone();
        let first = tokio::spawn(async move { facade.current_location().await });
        wait_until_sensing(&h).await;

        let (tx, rx) = oneshot::channel();
        h.facade.get_current_location(move |outcome| {
            let _ = tx.send(outcome);
        });

        assert_eq!(first.await.unwrap(), Err(LocationError::Superseded));

        h.sensor.emit(SensorEvent::Fix(fix(1.0, 2.0)));
        assert_eq!(rx.await.unwrap().unwrap().coordinate, Coordinate::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn test_current_location_denied() {
        let h = harness(AuthorizationState::Denied, FakeGeocoder::default());
        assert_eq!(h.facade.current_location().await, Err(LocationError::PermissionDenied));
        assert!(!h.facade.is_location_enabled());
    }

    #[tokio::test]
    async fn test_authorization_changes_are_observable() {
        let h = harness(AuthorizationState::Undetermined, FakeGeocoder::default());
        let mut changes = h.facade.authorization_changes();
        let facade = h.facade.clone();
        let pending = tokio::spawn(async move { facade.current_location().await });

        for _ in 0..100 {
            if h.sensor.when_in_use_requests() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(h.sensor.when_in_use_requests(), 1);

        h.sensor.set_authorization(AuthorizationState::GrantedAlways);
        h.sensor
            .emit(SensorEvent::AuthorizationChanged(AuthorizationState::GrantedAlways));
        assert_eq!(changes.recv().await.unwrap(), AuthorizationState::GrantedAlways);

        wait_until_sensing(&h).await;
        h.sensor.emit(SensorEvent::Fix(fix(10.0, 20.0)));
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(h.facade.authorization_status(), AuthorizationState::GrantedAlways);
        assert!(h.facade.is_location_enabled());
    }

    #[tokio::test]
    async fn test_request_always_from_when_in_use() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        h.facade.request_always_authorization();
        assert_eq!(h.sensor.always_requests(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_is_observable_without_pending_request() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        let mut changes = h.facade.authorization_changes();

        h.facade.request_always_authorization();
        h.sensor.change_authorization(AuthorizationState::GrantedAlways);

        assert_eq!(changes.try_recv().unwrap(), AuthorizationState::GrantedAlways);
        assert_eq!(h.facade.authorization_status(), AuthorizationState::GrantedAlways);
        assert_eq!(h.sensor.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_distance_requires_fix() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        let target = Coordinate::new(0.0, 1.0);
        assert_eq!(h.facade.distance_from_current(target), None);

        let facade = h.facade.clone();
        let pending = tokio::spawn(async move { facade.current_location().await });
        wait_until_sensing(&h).await;
        h.sensor.emit(SensorEvent::Fix(fix(0.0, 0.0)));
        pending.await.unwrap().unwrap();

        let miles = h.facade.distance_from_current(target).unwrap();
        assert_abs_diff_eq!(miles, 69.09, epsilon = 0.1);
    }

    #[tokio::test]
    async fn test_travel_distance_without_fix_is_sentinel() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        let result = h
            .facade
            .travel_distance_from_current(Coordinate::new(1.0, 1.0))
            .await;
        assert_eq!(result, TravelDistance::failed());
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_geocode_address_uses_device_geocoder() {
        let placemark = Placemark {
            locality: Some("Oslo".into()),
            ..Placemark::default()
        };
        let h = harness(
            AuthorizationState::GrantedWhenInUse,
            FakeGeocoder::returning(vec![placemark.clone()]),
        );
        assert_eq!(h.facade.geocode_address("Karl Johans gate").await, Ok(placemark));
        assert_eq!(h.geocoder.addresses(), vec!["Karl Johans gate".to_string()]);
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_geocode_zip_uses_default_country() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::returning(vec![]));
        let mut facade = h.facade.clone();
        facade.default_country = Some("SE".into());

        assert_eq!(
            facade.geocode_zip("11129", None).await,
            Err(LocationError::ReverseGeocodingFailed)
        );
        assert!(facade.geocode_zip("94016", Some("us")).await.is_err());

        let queries = h.geocoder.postal_queries();
        assert_eq!(queries[0].country, "SE");
        assert_eq!(queries[1].country, "US");
    }

    #[tokio::test]
    async fn test_remote_geocode_failure_does_not_touch_device() {
        let h = harness(AuthorizationState::GrantedWhenInUse, FakeGeocoder::default());
        h.transport
            .respond_json(200, r#"{"status":"ZERO_RESULTS","results":[]}"#);
        assert_eq!(
            h.facade.geocode_address_remote("nowhere").await,
            Err(LocationError::GeoCodingFailed)
        );
        assert!(h.geocoder.addresses().is_empty());
    }
}
