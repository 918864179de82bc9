//! Address and postal-code geocoding.
//!
//! Device flow:  address | postal query → device geocoder → first placemark
//! Remote flow:  address → remote geocoding endpoint → normalized placemark
//!
//! The two flows are independent: a device failure does not fall back to
//! the remote provider.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{Coordinate, LocationError, Placemark};
use crate::config::{EndpointSource, GOOGLE_GEOCODE};
use crate::transport::{
    encode_query_url, run_blocking, HttpTransport, ServiceIdentifier, ServiceRequest,
    TransportError,
};

/// Structured postal-code lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalQuery {
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

impl PostalQuery {
    pub fn new(postal_code: impl Into<String>, country: Option<&str>) -> Self {
        Self {
            postal_code: postal_code.into(),
            country: country.unwrap_or(DEFAULT_COUNTRY).to_uppercase(),
        }
    }
}

pub const DEFAULT_COUNTRY: &str = "US";

#[derive(Debug, Error)]
pub enum GeocoderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("geocoder returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("malformed geocoder response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Platform geocoder.
pub trait DeviceGeocoder: Send + Sync {
    fn geocode_address(&self, address: &str) -> Result<Vec<Placemark>, GeocoderError>;
    fn geocode_postal(&self, query: &PostalQuery) -> Result<Vec<Placemark>, GeocoderError>;
}

pub struct GeocodeProviderChain {
    device: Arc<dyn DeviceGeocoder>,
    transport: Arc<dyn HttpTransport>,
    endpoints: Arc<dyn EndpointSource>,
}

impl GeocodeProviderChain {
    pub fn new(
        device: Arc<dyn DeviceGeocoder>,
        transport: Arc<dyn HttpTransport>,
        endpoints: Arc<dyn EndpointSource>,
    ) -> Self {
        Self {
            device,
            transport,
            endpoints,
        }
    }

    /// Forward-geocode an address with the device geocoder.
    pub async fn geocode_address(&self, address: &str) -> Result<Placemark, LocationError> {
        let device = Arc::clone(&self.device);
        let address = address.to_string();
        let outcome = run_blocking(move || device.geocode_address(&address)).await?;
        first_device_result(outcome)
    }

    /// Geocode a postal code; the country defaults to "US".
    pub async fn geocode_zip(
        &self,
        zip: &str,
        country: Option<&str>,
    ) -> Result<Placemark, LocationError> {
        let device = Arc::clone(&self.device);
        let query = PostalQuery::new(zip, country);
        let outcome = run_blocking(move || device.geocode_postal(&query)).await?;
        first_device_result(outcome)
    }

    /// Geocode an address through the remote provider, which reports richer
    /// administrative-area data.
    pub async fn geocode_address_remote(&self, address: &str) -> Result<Placemark, LocationError> {
        let base = self
            .endpoints
            .url_for(GOOGLE_GEOCODE)
            .ok_or_else(|| LocationError::EndpointNotConfigured(GOOGLE_GEOCODE.to_string()))?;
        let url = encode_query_url(&format!("{}{}", base, address));
        let request = ServiceRequest::get(ServiceIdentifier::RemoteGeocode, url);

        let transport = Arc::clone(&self.transport);
        let response = run_blocking(move || transport.send(&request))
            .await?
            .map_err(|e| {
                warn!(error = %e, "remote geocode request failed");
                LocationError::TransportFailure(e.to_string())
            })?;

        if !response.is_success() {
            warn!(status = response.status, "remote geocode returned an error status");
            return Err(LocationError::GeoCodingFailed);
        }

        parse_geocode_response(&response.body).map_err(|e| {
            warn!(error = %e, "remote geocode gave no usable result");
            LocationError::GeoCodingFailed
        })
    }
}

fn first_device_result(
    outcome: Result<Vec<Placemark>, GeocoderError>,
) -> Result<Placemark, LocationError> {
    match outcome {
        Ok(placemarks) => placemarks.into_iter().next().ok_or_else(|| {
            debug!("device geocoder returned no placemarks");
            LocationError::ReverseGeocodingFailed
        }),
        Err(e) => {
            warn!(error = %e, "device geocoder failed");
            Err(LocationError::ReverseGeocodingFailed)
        }
    }
}

// ─── Remote response shape ──────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeocodeEnvelope {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize, Debug)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Deserialize, Debug)]
struct AddressComponent {
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Geometry {
    #[serde(default)]
    location: Option<LatLng>,
}

#[derive(Deserialize, Debug)]
struct LatLng {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

#[derive(Clone, Copy)]
enum ComponentField {
    PostalCode,
    SubLocality,
    Locality,
    State,
    Country,
}

/// Component types in match priority.
const COMPONENT_PRIORITY: &[(&str, ComponentField)] = &[
    ("postal_code", ComponentField::PostalCode),
    ("sublocality", ComponentField::SubLocality),
    ("locality", ComponentField::Locality),
    ("administrative_area_level_1", ComponentField::State),
    ("country", ComponentField::Country),
];

/// Parse a remote geocoding response into a placemark.
///
/// Requires `status == "OK"` and at least one result; only the first result
/// is used. A malformed body yields `ParseFailure`, a rejected or empty one
/// `GeoCodingFailed`.
pub fn parse_geocode_response(body: &[u8]) -> Result<Placemark, LocationError> {
    let envelope: GeocodeEnvelope =
        serde_json::from_slice(body).map_err(|e| LocationError::ParseFailure(e.to_string()))?;

    if envelope.status != "OK" {
        debug!(status = %envelope.status, "remote geocode status not OK");
        return Err(LocationError::GeoCodingFailed);
    }

    let first = envelope
        .results
        .into_iter()
        .next()
        .ok_or(LocationError::GeoCodingFailed)?;

    Ok(normalize_result(first))
}

fn normalize_result(result: GeocodeResult) -> Placemark {
    let mut placemark = Placemark::default();

    for component in result.address_components {
        let Some(field) = COMPONENT_PRIORITY
            .iter()
            .find(|(tag, _)| component.types.iter().any(|t| t == tag))
            .map(|(_, field)| *field)
        else {
            continue;
        };

        let slot = match field {
            ComponentField::PostalCode => &mut placemark.postal_code,
            ComponentField::SubLocality => &mut placemark.sub_locality,
            ComponentField::Locality => &mut placemark.locality,
            ComponentField::State => &mut placemark.state,
            ComponentField::Country => &mut placemark.country,
        };
        // First component of each kind wins.
        if slot.is_none() {
            *slot = component.short_name;
        }
    }

    placemark.coordinate = result
        .geometry
        .and_then(|g| g.location)
        .and_then(|loc| loc.lat.zip(loc.lng))
        .map(|(lat, lng)| Coordinate::new(lat, lng));

    placemark
}
