//! Straight-line and travel distances from the current location.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::types::{Coordinate, LocationError, LocationFix, TravelDistance};
use crate::config::{EndpointSource, GOOGLE_DISTANCE_MATRIX};
use crate::transport::{
    encode_query_url, run_blocking, HttpTransport, ServiceIdentifier, ServiceRequest,
};

pub const METERS_TO_MILES: f64 = 0.000621371;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;
const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Great-circle distance in meters (haversine).
pub fn great_circle_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude * DEG_TO_RAD;
    let lat2 = b.latitude * DEG_TO_RAD;
    let delta_lat = (b.latitude - a.latitude) * DEG_TO_RAD;
    let delta_lon = (b.longitude - a.longitude) * DEG_TO_RAD;

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Straight-line distance in miles.
pub fn straight_line_distance(a: Coordinate, b: Coordinate) -> f64 {
    great_circle_meters(a, b) * METERS_TO_MILES
}

pub struct DistanceResolver {
    transport: Arc<dyn HttpTransport>,
    endpoints: Arc<dyn EndpointSource>,
    anchor: watch::Receiver<Option<LocationFix>>,
}

impl DistanceResolver {
    /// `anchor` is the session's view of the last known fix.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Arc<dyn EndpointSource>,
        anchor: watch::Receiver<Option<LocationFix>>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            anchor,
        }
    }

    fn anchor(&self) -> Option<Coordinate> {
        self.anchor.borrow().map(|fix| fix.coordinate)
    }

    /// Miles from the last known fix, or `None` before the first fix.
    pub fn distance_from_current(&self, point: Coordinate) -> Option<f64> {
        self.anchor().map(|current| straight_line_distance(current, point))
    }

    /// Travel distance from the last known fix via the distance-matrix
    /// provider. Every failure yields [`TravelDistance::failed`].
    pub async fn travel_distance_from_current(&self, point: Coordinate) -> TravelDistance {
        let Some(current) = self.anchor() else {
            debug!("no location fix yet, skipping distance matrix");
            return TravelDistance::failed();
        };
        let Some(base) = self.endpoints.url_for(GOOGLE_DISTANCE_MATRIX) else {
            warn!(key = GOOGLE_DISTANCE_MATRIX, "distance matrix endpoint not configured");
            return TravelDistance::failed();
        };

        let url = encode_query_url(&format!(
            "{}origins={},{}&destinations={},{}",
            base, point.latitude, point.longitude, current.latitude, current.longitude
        ));
        let request = ServiceRequest::get(ServiceIdentifier::DistanceMatrix, url);
        let transport = Arc::clone(&self.transport);

        let response = match run_blocking(move || transport.send(&request)).await {
            Ok(Ok(response)) if response.is_success() => response,
            Ok(Ok(response)) => {
                warn!(status = response.status, "distance matrix returned an error status");
                return TravelDistance::failed();
            }
            Ok(Err(e)) => {
                warn!(error = %e, "distance matrix request failed");
                return TravelDistance::failed();
            }
            Err(e) => {
                warn!(error = %e, "distance matrix worker failed");
                return TravelDistance::failed();
            }
        };

        match parse_distance_matrix(&response.body) {
            Ok(meters) => TravelDistance::miles(meters * METERS_TO_MILES),
            Err(e) => {
                warn!(error = %e, "distance matrix gave no usable distance");
                TravelDistance::failed()
            }
        }
    }
}

// ─── Distance-matrix response shape ─────────────────────────────

#[derive(Deserialize)]
struct MatrixEnvelope {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Deserialize)]
struct MatrixElement {
    #[serde(default)]
    distance: Option<MatrixDistance>,
}

#[derive(Deserialize)]
struct MatrixDistance {
    value: f64,
}

/// Extract `rows[0].elements[0].distance.value` (meters) from a
/// distance-matrix response with `status == "OK"`.
pub fn parse_distance_matrix(body: &[u8]) -> Result<f64, LocationError> {
    let envelope: MatrixEnvelope =
        serde_json::from_slice(body).map_err(|e| LocationError::ParseFailure(e.to_string()))?;

    if envelope.status != "OK" {
        return Err(LocationError::ParseFailure(format!(
            "distance matrix status {}",
            envelope.status
        )));
    }

    envelope
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .and_then(|element| element.distance)
        .map(|distance| distance.value)
        .ok_or_else(|| LocationError::ParseFailure("no distance in first element".into()))
}
