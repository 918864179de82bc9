//! Device location resolution with layered geocoding and distance lookups.

pub mod config;
pub mod location;
pub mod logging;
pub mod server;
pub mod transport;
