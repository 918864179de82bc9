//! One-shot location acquisition.
//!
//! The session runs as a single task that owns the sensor subscription, the
//! pending callback and the last known fix. Caller commands and sensor
//! events share one FIFO channel, so callbacks are always invoked from that
//! task, one at a time.
//!
//! Request flow:  start → subscribe → authorization check/prompt →
//! sensing → first fix or terminal error → release → callback

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::authorization::AuthorizationGate;
use super::sensor::{LocationSensor, SensorEvent, SensorSink, SensorSubscription};
use super::types::{AuthorizationState, LocationError, LocationFix};

/// Completion for a location request. Invoked at most once.
pub type LocationCallback = Box<dyn FnOnce(Result<LocationFix, LocationError>) + Send + 'static>;

pub(crate) enum Message {
    Start(LocationCallback),
    Enable,
    Disable,
    Sensor { generation: u64, event: SensorEvent },
    Pending(oneshot::Sender<bool>),
}

/// Handle to the location session task.
#[derive(Clone)]
pub struct LocationSensorSession {
    tx: mpsc::UnboundedSender<Message>,
    last_fix: watch::Receiver<Option<LocationFix>>,
}

impl LocationSensorSession {
    /// Spawn the session task. Must be called from within a Tokio runtime.
    pub fn spawn(sensor: Arc<dyn LocationSensor>, gate: AuthorizationGate) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fix_tx, fix_rx) = watch::channel(None);

        let actor = SessionActor {
            sensor,
            gate,
            tx: tx.downgrade(),
            generation: 0,
            subscription: None,
            pending: None,
            last_fix: fix_tx,
        };
        tokio::spawn(actor.run(rx));

        Self { tx, last_fix: fix_rx }
    }

    /// Request the current location. Any unresolved earlier request is
    /// dropped without its callback being invoked.
    pub fn start<F>(&self, on_result: F)
    where
        F: FnOnce(Result<LocationFix, LocationError>) + Send + 'static,
    {
        if let Err(mpsc::error::SendError(Message::Start(callback))) =
            self.tx.send(Message::Start(Box::new(on_result)))
        {
            callback(Err(LocationError::SensorFailure("location session stopped".into())));
        }
    }

    /// Start sensing on the live subscription, if there is one.
    pub fn enable(&self) {
        let _ = self.tx.send(Message::Enable);
    }

    /// Stop sensing and release the subscription. A pending request is
    /// dropped silently.
    pub fn disable(&self) {
        let _ = self.tx.send(Message::Disable);
    }

    pub fn last_fix(&self) -> Option<LocationFix> {
        *self.last_fix.borrow()
    }

    /// Read-only view of the last known fix.
    pub fn fixes(&self) -> watch::Receiver<Option<LocationFix>> {
        self.last_fix.clone()
    }

    /// Whether a request is waiting for an outcome, after every event queued
    /// so far has been handled.
    pub async fn is_pending(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Pending(reply)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

struct SessionActor {
    sensor: Arc<dyn LocationSensor>,
    gate: AuthorizationGate,
    tx: mpsc::WeakUnboundedSender<Message>,
    generation: u64,
    subscription: Option<Box<dyn SensorSubscription>>,
    pending: Option<LocationCallback>,
    last_fix: watch::Sender<Option<LocationFix>>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        debug!("location session started");
        while let Some(message) = rx.recv().await {
            match message {
                Message::Start(callback) => self.start(callback),
                Message::Enable => self.begin_sensing(),
                Message::Disable => {
                    if self.pending.take().is_some() {
                        debug!("dropping pending location request on disable");
                    }
                    self.teardown();
                }
                Message::Sensor { generation, event } => self.on_sensor_event(generation, event),
                Message::Pending(reply) => {
                    let _ = reply.send(self.pending.is_some());
                }
            }
        }
        self.teardown();
        debug!("location session stopped");
    }

    fn start(&mut self, callback: LocationCallback) {
        if self.pending.take().is_some() {
            debug!("superseding unresolved location request");
        }
        // Old subscription goes first so only one is ever registered.
        self.teardown();

        self.generation += 1;
        let sink = SensorSink::new(self.generation, self.tx.clone());
        self.subscription = Some(self.sensor.subscribe(sink));
        self.pending = Some(callback);

        let state = self.gate.check_authorization();
        debug!(generation = self.generation, %state, "location request started");
        self.apply_authorization(state);
    }

    fn on_sensor_event(&mut self, generation: u64, event: SensorEvent) {
        if self.subscription.is_none() || generation != self.generation {
            debug!(generation, current = self.generation, "ignoring stale sensor event");
            return;
        }

        match event {
            // Observers already heard about it from the sensor.
            SensorEvent::AuthorizationChanged(state) => self.apply_authorization(state),
            SensorEvent::Fix(fix) => {
                info!(
                    lat = fix.coordinate.latitude,
                    lon = fix.coordinate.longitude,
                    "location fix"
                );
                self.last_fix.send_replace(Some(fix));
                self.complete(Ok(fix));
            }
            SensorEvent::Failure(detail) => {
                warn!(%detail, "location sensor failed");
                self.complete(Err(LocationError::SensorFailure(detail)));
            }
        }
    }

    fn apply_authorization(&mut self, state: AuthorizationState) {
        match state {
            AuthorizationState::GrantedWhenInUse | AuthorizationState::GrantedAlways => {
                self.begin_sensing();
            }
            AuthorizationState::Denied => self.complete(Err(LocationError::PermissionDenied)),
            AuthorizationState::Restricted => {
                self.complete(Err(LocationError::PermissionRestricted));
            }
            // Not terminal: prompt and wait for the next decision.
            AuthorizationState::Undetermined => self.gate.request_authorization(),
        }
    }

    fn begin_sensing(&mut self) {
        if let Some(subscription) = self.subscription.as_mut() {
            debug!(generation = self.generation, "sensing started");
            subscription.start_updating();
        }
    }

    /// Release the subscription, then resolve the pending request.
    fn complete(&mut self, outcome: Result<LocationFix, LocationError>) {
        self.teardown();
        match self.pending.take() {
            Some(callback) => callback(outcome),
            None => debug!("no pending request for location outcome"),
        }
    }

    fn teardown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop_updating();
            debug!(generation = self.generation, "subscription released");
        }
    }
}
