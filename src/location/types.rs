//! Core types for the location subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A point on the globe in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if lat_ok && lon_ok {
            Ok(Self::new(latitude, longitude))
        } else {
            Err(LocationError::InvalidLocation)
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// A single position reported by the location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            timestamp: Utc::now(),
        }
    }
}

/// Location permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    Undetermined,
    GrantedWhenInUse,
    GrantedAlways,
    Denied,
    Restricted,
}

impl AuthorizationState {
    /// Whether the sensor may be started under this state.
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::GrantedWhenInUse | Self::GrantedAlways)
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undetermined => write!(f, "undetermined"),
            Self::GrantedWhenInUse => write!(f, "granted (when in use)"),
            Self::GrantedAlways => write!(f, "granted (always)"),
            Self::Denied => write!(f, "denied"),
            Self::Restricted => write!(f, "restricted"),
        }
    }
}

/// A normalized geocoding result. Providers report partial data, so every
/// field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub sub_locality: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Short country form (ISO 3166-1 alpha-2 where the provider supplies it).
    #[serde(default)]
    pub country: Option<String>,
}

/// Result of a distance-matrix lookup. Failures are reported as
/// `(0, false)` rather than through an error channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelDistance {
    pub miles: f64,
    pub success: bool,
}

impl TravelDistance {
    pub const fn failed() -> Self {
        Self {
            miles: 0.0,
            success: false,
        }
    }

    pub const fn miles(miles: f64) -> Self {
        Self {
            miles,
            success: true,
        }
    }
}

/// Location, geocoding and transport errors. `Display` is suitable for
/// showing to a user directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Locations are turned off. Please turn it on in Settings")]
    PermissionDenied,

    #[error("Locations are restricted")]
    PermissionRestricted,

    #[error("Locations are not determined yet")]
    PermissionUndetermined,

    #[error("Unable to fetch location: {0}")]
    SensorFailure(String),

    #[error("Invalid Location")]
    InvalidLocation,

    #[error("Reverse Geocoding Failed")]
    ReverseGeocodingFailed,

    #[error("GeoCoding Failed")]
    GeoCodingFailed,

    #[error("Network request failed: {0}")]
    TransportFailure(String),

    #[error("Invalid response: {0}")]
    ParseFailure(String),

    #[error("No endpoint configured for '{0}'")]
    EndpointNotConfigured(String),

    #[error("Location request was replaced by a newer request")]
    Superseded,
}

impl LocationError {
    /// Permission errors, as opposed to provider or transport failures.
    pub const fn is_permission(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::PermissionRestricted | Self::PermissionUndetermined
        )
    }
}
