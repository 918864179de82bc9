//! Location permission tracking.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::sensor::{AuthorizationObserver, LocationSensor};
use super::types::{AuthorizationState, LocationError};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Reads and requests location permission, and publishes every
/// platform-delivered transition to its observers.
#[derive(Clone)]
pub struct AuthorizationGate {
    sensor: Arc<dyn LocationSensor>,
    changes: broadcast::Sender<AuthorizationState>,
}

impl AuthorizationGate {
    /// Registers the gate as the sensor's authorization observer.
    pub fn new(sensor: Arc<dyn LocationSensor>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        sensor.observe_authorization(AuthorizationObserver::new(changes.clone()));
        Self { sensor, changes }
    }

    pub fn check_authorization(&self) -> AuthorizationState {
        self.sensor.authorization_status()
    }

    /// Prompt for when-in-use permission if no decision has been made yet.
    pub fn request_authorization(&self) {
        if self.check_authorization() == AuthorizationState::Undetermined {
            debug!("requesting when-in-use location authorization");
            self.sensor.request_when_in_use();
        }
    }

    /// Prompt for always permission unless it is already held or refused.
    pub fn request_always_authorization(&self) {
        match self.check_authorization() {
            AuthorizationState::Undetermined | AuthorizationState::GrantedWhenInUse => {
                debug!("requesting always location authorization");
                self.sensor.request_always();
            }
            _ => {}
        }
    }

    pub const fn is_usable(state: AuthorizationState) -> bool {
        state.is_usable()
    }

    /// Location services are on and this app may use them.
    pub fn is_location_enabled(&self) -> bool {
        self.sensor.services_enabled() && Self::is_usable(self.check_authorization())
    }

    pub fn ensure_usable(&self) -> Result<(), LocationError> {
        match self.check_authorization() {
            AuthorizationState::GrantedWhenInUse | AuthorizationState::GrantedAlways => Ok(()),
            AuthorizationState::Denied => Err(LocationError::PermissionDenied),
            AuthorizationState::Restricted => Err(LocationError::PermissionRestricted),
            AuthorizationState::Undetermined => Err(LocationError::PermissionUndetermined),
        }
    }

    /// Observe authorization transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorizationState> {
        self.changes.subscribe()
    }
}
