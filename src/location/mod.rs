//! Location subsystem.
//!
//! Permission tracking, one-shot location acquisition, layered geocoding
//! and distance lookups, composed behind [`LocationFacade`].

pub mod authorization;
pub mod distance;
pub mod facade;
pub mod geocode;
pub mod providers;
pub mod sensor;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use authorization::AuthorizationGate;
pub use distance::{straight_line_distance, DistanceResolver, METERS_TO_MILES};
pub use facade::LocationFacade;
pub use geocode::{DeviceGeocoder, GeocodeProviderChain, GeocoderError, PostalQuery};
pub use providers::{IpLocationSensor, NominatimGeocoder};
pub use sensor::{
    AuthorizationObserver, LocationSensor, SensorEvent, SensorSink, SensorSubscription,
};
pub use session::{LocationCallback, LocationSensorSession};
pub use types::{
    AuthorizationState, Coordinate, LocationError, LocationFix, Placemark, TravelDistance,
};
