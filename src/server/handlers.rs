use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::location::{
    AuthorizationState, Coordinate, LocationError, LocationFix, Placemark, TravelDistance,
};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<LocationError> for ApiError {
    fn from(e: LocationError) -> Self {
        ApiError(status_for(&e), e.to_string())
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

pub(super) fn status_for(e: &LocationError) -> StatusCode {
    if e.is_permission() {
        return StatusCode::FORBIDDEN;
    }
    match e {
        LocationError::Superseded => StatusCode::CONFLICT,
        LocationError::SensorFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        LocationError::InvalidLocation => StatusCode::BAD_REQUEST,
        LocationError::ReverseGeocodingFailed | LocationError::GeoCodingFailed => {
            StatusCode::NOT_FOUND
        }
        LocationError::TransportFailure(_) | LocationError::ParseFailure(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The parameter as sent. Blank values go to the provider untouched.
fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ApiError> {
    value.ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Missing '{}' parameter", name),
        )
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /api/location ───────────────────────────────────────────

pub async fn current_location(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LocationFix>, ApiError> {
    let start = Instant::now();
    let fix = state.facade.current_location().await?;
    info!(
        coordinate = %fix.coordinate,
        elapsed_ms = elapsed_ms(start),
        "GET /api/location"
    );
    Ok(Json(fix))
}

// ─── GET /api/authorization ──────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct AuthorizationResponse {
    pub status: AuthorizationState,
    pub enabled: bool,
}

pub async fn authorization(State(state): State<Arc<AppState>>) -> Json<AuthorizationResponse> {
    Json(AuthorizationResponse {
        status: state.facade.authorization_status(),
        enabled: state.facade.is_location_enabled(),
    })
}

// ─── GET /api/geocode, /api/geocode/remote ───────────────────────

#[derive(Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

pub async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<Placemark>, ApiError> {
    let start = Instant::now();
    let address = required(params.address.as_deref(), "address")?;
    let placemark = state.facade.geocode_address(address).await?;
    info!(address, elapsed_ms = elapsed_ms(start), "GET /api/geocode");
    Ok(Json(placemark))
}

pub async fn geocode_remote(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<Placemark>, ApiError> {
    let start = Instant::now();
    let address = required(params.address.as_deref(), "address")?;
    let placemark = state.facade.geocode_address_remote(address).await?;
    info!(address, elapsed_ms = elapsed_ms(start), "GET /api/geocode/remote");
    Ok(Json(placemark))
}

// ─── GET /api/geocode/zip ────────────────────────────────────────

#[derive(Deserialize)]
pub struct ZipQuery {
    pub zip: Option<String>,
    pub country: Option<String>,
}

pub async fn geocode_zip(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ZipQuery>,
) -> Result<Json<Placemark>, ApiError> {
    let start = Instant::now();
    let zip = required(params.zip.as_deref(), "zip")?;
    let placemark = state
        .facade
        .geocode_zip(zip, params.country.as_deref())
        .await?;
    info!(zip, elapsed_ms = elapsed_ms(start), "GET /api/geocode/zip");
    Ok(Json(placemark))
}

// ─── GET /api/distance ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct DistanceQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub travel: bool,
}

#[derive(Serialize, Debug)]
pub struct DistanceResponse {
    /// Straight-line miles from the last known fix; null before the first fix.
    pub miles: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel: Option<TravelDistance>,
}

pub async fn distance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DistanceQuery>,
) -> Result<Json<DistanceResponse>, ApiError> {
    let (Some(lat), Some(lon)) = (params.lat, params.lon) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Provide 'lat' and 'lon' parameters",
        ));
    };
    let point = Coordinate::try_new(lat, lon)?;

    let miles = state.facade.distance_from_current(point);
    let travel = if params.travel {
        Some(state.facade.travel_distance_from_current(point).await)
    } else {
        None
    };

    info!(target_point = %point, ?miles, "GET /api/distance");
    Ok(Json(DistanceResponse { miles, travel }))
}
