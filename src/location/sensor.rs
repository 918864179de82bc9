//! Device location sensor seam.
//!
//! A [`LocationSensor`] hands out one [`SensorSubscription`] per location
//! request and reports back through the [`SensorSink`] it was given.
//! Dropping a subscription releases it. Permission transitions also go to
//! the [`AuthorizationObserver`], whether or not a request is in flight.

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::session::Message;
use super::types::{AuthorizationState, LocationFix};

/// Something the sensor reports to its current subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    AuthorizationChanged(AuthorizationState),
    Fix(LocationFix),
    Failure(String),
}

/// Delivery handle tied to one subscription.
///
/// Events from a sink whose subscription has been replaced are ignored by
/// the session.
#[derive(Debug, Clone)]
pub struct SensorSink {
    generation: u64,
    tx: mpsc::WeakUnboundedSender<Message>,
}

impl SensorSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::WeakUnboundedSender<Message>) -> Self {
        Self { generation, tx }
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` once the session is gone.
    pub fn deliver(&self, event: SensorEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx
                .send(Message::Sensor {
                    generation: self.generation,
                    event,
                })
                .is_ok(),
            None => false,
        }
    }
}

/// Gate-owned channel for permission transitions.
#[derive(Debug, Clone)]
pub struct AuthorizationObserver {
    changes: broadcast::Sender<AuthorizationState>,
}

impl AuthorizationObserver {
    pub(crate) const fn new(changes: broadcast::Sender<AuthorizationState>) -> Self {
        Self { changes }
    }

    pub fn notify(&self, state: AuthorizationState) {
        debug!(%state, observers = self.changes.receiver_count(), "authorization changed");
        // No observers is fine.
        let _ = self.changes.send(state);
    }
}

/// A live registration with the sensor.
pub trait SensorSubscription: Send {
    fn start_updating(&mut self);
    fn stop_updating(&mut self);
}

/// Platform location services.
pub trait LocationSensor: Send + Sync {
    /// Current permission as reported by the platform.
    fn authorization_status(&self) -> AuthorizationState;

    /// Prompt for when-in-use permission. The decision arrives later as
    /// [`SensorEvent::AuthorizationChanged`].
    fn request_when_in_use(&self);

    /// Prompt for always permission.
    fn request_always(&self);

    /// Whether location services are switched on at all.
    fn services_enabled(&self) -> bool {
        true
    }

    /// Register the observer for every permission transition, replacing any
    /// earlier one. A transition must reach the observer before it is
    /// delivered to a subscriber sink.
    fn observe_authorization(&self, observer: AuthorizationObserver);

    fn subscribe(&self, sink: SensorSink) -> Box<dyn SensorSubscription>;
}
