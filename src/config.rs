//! Settings file at ~/.locator/config.json.
//!
//! Maps symbolic endpoint keys to base URLs and carries a few runtime knobs.
//! Missing fields and endpoint keys fall back to built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote geocoding base URL; the address is appended.
pub const GOOGLE_GEOCODE: &str = "googleGeoCode";
/// Distance-matrix base URL; `origins=..&destinations=..` is appended.
pub const GOOGLE_DISTANCE_MATRIX: &str = "googleDistanceMatrix";
/// Nominatim search endpoint backing the device geocoder.
pub const NOMINATIM_SEARCH: &str = "nominatimSearch";
/// IP geolocation endpoint backing the IP location sensor.
pub const IP_GEOLOCATION: &str = "ipGeolocation";

const DEFAULT_ENDPOINTS: &[(&str, &str)] = &[
    (GOOGLE_GEOCODE, "https://maps.googleapis.com/maps/api/geocode/json?address="),
    (
        GOOGLE_DISTANCE_MATRIX,
        "https://maps.googleapis.com/maps/api/distancematrix/json?units=imperial&",
    ),
    (NOMINATIM_SEARCH, "https://nominatim.openstreetmap.org/search"),
    (IP_GEOLOCATION, "https://ipapi.co/json/"),
];

/// Key-value source of endpoint base URLs.
pub trait EndpointSource: Send + Sync {
    fn url_for(&self, key: &str) -> Option<String>;
}

impl EndpointSource for HashMap<String, String> {
    fn url_for(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Whether a location permission prompt is answered with a grant.
    #[serde(default)]
    pub grant_location: bool,
    #[serde(default = "default_country")]
    pub default_country: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_country() -> String {
    "US".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            grant_location: false,
            default_country: default_country(),
            request_timeout_secs: default_timeout_secs(),
        }
        .with_default_endpoints()
    }
}

impl Settings {
    /// Load settings from the default location (~/.locator/config.json).
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. Unreadable or invalid files fall
    /// back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>(&data) {
            Ok(settings) => settings.with_default_endpoints(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse settings, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".locator")
            .join("config.json")
    }

    /// Fill in every built-in endpoint the settings don't override.
    #[must_use]
    pub fn with_default_endpoints(mut self) -> Self {
        for (key, url) in DEFAULT_ENDPOINTS {
            self.endpoints
                .entry((*key).to_string())
                .or_insert_with(|| (*url).to_string());
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Write the settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

impl EndpointSource for Settings {
    fn url_for(&self, key: &str) -> Option<String> {
        self.endpoints.get(key).cloned()
    }
}
