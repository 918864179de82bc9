//! Concrete collaborators: Nominatim as the device geocoder and IP
//! geolocation as the location sensor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::Deserialize;
use tracing::{debug, warn};

use super::geocode::{DeviceGeocoder, GeocoderError, PostalQuery};
use super::sensor::{
    AuthorizationObserver, LocationSensor, SensorEvent, SensorSink, SensorSubscription,
};
use super::types::{AuthorizationState, Coordinate, LocationError, LocationFix, Placemark};
use crate::transport::{HttpTransport, ServiceIdentifier, ServiceRequest};

const USER_AGENT: &str = "Locator/0.1 (location-library)";

// ─── Nominatim geocoder ─────────────────────────────────────────

const NOMINATIM_LIMIT: usize = 5;

#[derive(Deserialize, Debug)]
struct NominatimResult {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Deserialize, Debug, Default)]
struct NominatimAddress {
    #[serde(default)]
    postcode: Option<String>,
    #[serde(default)]
    suburb: Option<String>,
    #[serde(default)]
    neighbourhood: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

impl NominatimResult {
    fn into_placemark(self) -> Placemark {
        let coordinate = match (self.lat.parse::<f64>(), self.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Coordinate::try_new(lat, lon).ok(),
            _ => None,
        };
        let address = self.address.unwrap_or_default();

        Placemark {
            coordinate,
            postal_code: address.postcode,
            sub_locality: address.suburb.or(address.neighbourhood),
            locality: address.city.or(address.town).or(address.village),
            state: address.state,
            country: address.country_code.map(|cc| cc.to_uppercase()),
        }
    }
}

/// Device geocoder backed by OpenStreetMap Nominatim.
pub struct NominatimGeocoder {
    transport: Arc<dyn HttpTransport>,
    search_url: String,
}

impl NominatimGeocoder {
    pub fn new(transport: Arc<dyn HttpTransport>, search_url: impl Into<String>) -> Self {
        Self {
            transport,
            search_url: search_url.into(),
        }
    }

    fn search(&self, params: &str) -> Result<Vec<Placemark>, GeocoderError> {
        let url = format!(
            "{}?{}&format=json&addressdetails=1&limit={}",
            self.search_url, params, NOMINATIM_LIMIT
        );
        let request = ServiceRequest::get(ServiceIdentifier::DeviceGeocode, url)
            .with_header("User-Agent", USER_AGENT);

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(GeocoderError::Status(
                response.status,
                String::from_utf8_lossy(&response.body).into_owned(),
            ));
        }

        let results: Vec<NominatimResult> = serde_json::from_slice(&response.body)?;
        debug!(count = results.len(), "nominatim results");
        Ok(results.into_iter().map(NominatimResult::into_placemark).collect())
    }
}

impl DeviceGeocoder for NominatimGeocoder {
    fn geocode_address(&self, address: &str) -> Result<Vec<Placemark>, GeocoderError> {
        self.search(&format!("q={}", urlencode(address)))
    }

    fn geocode_postal(&self, query: &PostalQuery) -> Result<Vec<Placemark>, GeocoderError> {
        self.search(&format!(
            "postalcode={}&countrycodes={}",
            urlencode(&query.postal_code),
            urlencode(&query.country.to_lowercase()),
        ))
    }
}

// ─── IP-based location sensor ───────────────────────────────────

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Read the coordinate out of an IP geolocation response.
pub fn parse_ip_location(body: &[u8]) -> Result<Coordinate, LocationError> {
    let r: IpApiResult =
        serde_json::from_slice(body).map_err(|e| LocationError::ParseFailure(e.to_string()))?;
    let lat = r
        .latitude
        .ok_or_else(|| LocationError::ParseFailure("no latitude".into()))?;
    let lon = r
        .longitude
        .ok_or_else(|| LocationError::ParseFailure("no longitude".into()))?;
    Coordinate::try_new(lat, lon)
}

fn fetch_ip_fix(transport: &dyn HttpTransport, url: &str) -> Result<LocationFix, String> {
    let request = ServiceRequest::get(ServiceIdentifier::IpGeolocation, url)
        .with_header("User-Agent", USER_AGENT);
    let response = transport.send(&request).map_err(|e| e.to_string())?;
    if !response.is_success() {
        return Err(format!("geolocation service returned HTTP {}", response.status));
    }
    parse_ip_location(&response.body)
        .map(LocationFix::now)
        .map_err(|e| e.to_string())
}

struct SensorState {
    authorization: AuthorizationState,
    observer: Option<AuthorizationObserver>,
    sink: Option<SensorSink>,
}

/// Location sensor that derives its fix from IP geolocation.
///
/// There is no OS prompt behind it: a permission request is answered from
/// the configured consent. The answer goes to the authorization observer,
/// then to the current subscriber if there is one.
pub struct IpLocationSensor {
    transport: Arc<dyn HttpTransport>,
    url: String,
    grant_on_request: bool,
    state: Arc<Mutex<SensorState>>,
}

impl IpLocationSensor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        url: impl Into<String>,
        grant_on_request: bool,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            grant_on_request,
            state: Arc::new(Mutex::new(SensorState {
                authorization: AuthorizationState::Undetermined,
                observer: None,
                sink: None,
            })),
        }
    }

    /// Start from an already decided permission.
    #[must_use]
    pub fn with_authorization(self, authorization: AuthorizationState) -> Self {
        lock(&self.state).authorization = authorization;
        self
    }

    fn answer_prompt(&self, requested: AuthorizationState) {
        let mut state = lock(&self.state);
        let next = match (state.authorization, self.grant_on_request) {
            (AuthorizationState::Undetermined, true) => requested,
            (AuthorizationState::Undetermined, false) => AuthorizationState::Denied,
            (AuthorizationState::GrantedWhenInUse, true)
                if requested == AuthorizationState::GrantedAlways =>
            {
                requested
            }
            _ => return,
        };

        state.authorization = next;
        debug!(%next, "location permission decided");
        if let Some(observer) = &state.observer {
            observer.notify(next);
        }
        if let Some(sink) = &state.sink {
            sink.deliver(SensorEvent::AuthorizationChanged(next));
        }
    }
}

impl LocationSensor for IpLocationSensor {
    fn authorization_status(&self) -> AuthorizationState {
        lock(&self.state).authorization
    }

    fn request_when_in_use(&self) {
        self.answer_prompt(AuthorizationState::GrantedWhenInUse);
    }

    fn request_always(&self) {
        self.answer_prompt(AuthorizationState::GrantedAlways);
    }

    fn observe_authorization(&self, observer: AuthorizationObserver) {
        lock(&self.state).observer = Some(observer);
    }

    fn subscribe(&self, sink: SensorSink) -> Box<dyn SensorSubscription> {
        lock(&self.state).sink = Some(sink.clone());
        Box::new(IpSubscription {
            transport: Arc::clone(&self.transport),
            url: self.url.clone(),
            state: Arc::clone(&self.state),
            sink,
            active: Arc::new(AtomicBool::new(false)),
        })
    }
}

struct IpSubscription {
    transport: Arc<dyn HttpTransport>,
    url: String,
    state: Arc<Mutex<SensorState>>,
    sink: SensorSink,
    active: Arc<AtomicBool>,
}

impl SensorSubscription for IpSubscription {
    fn start_updating(&mut self) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let sink = self.sink.clone();
        let active = Arc::clone(&self.active);

        thread::spawn(move || {
            let event = match fetch_ip_fix(transport.as_ref(), &url) {
                Ok(fix) => SensorEvent::Fix(fix),
                Err(detail) => {
                    warn!(%detail, "IP geolocation failed");
                    SensorEvent::Failure(detail)
                }
            };
            if active.swap(false, Ordering::SeqCst) {
                sink.deliver(event);
            }
        });
    }

    fn stop_updating(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for IpSubscription {
    fn drop(&mut self) {
        self.stop_updating();
        let mut state = lock(&self.state);
        let ours = state
            .sink
            .as_ref()
            .is_some_and(|sink| sink.generation() == self.sink.generation());
        if ours {
            state.sink = None;
        }
    }
}

fn lock(state: &Mutex<SensorState>) -> MutexGuard<'_, SensorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── URL component encoding ─────────────────────────────────────

/// Percent-encode a single query parameter value.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b' ' => out.push_str("%20"),
            b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ if byte.is_ascii_alphanumeric() => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
