use crate::location::LocationFacade;

/// Shared by every handler. The facade is cheap to clone and internally
/// synchronized, so no lock is needed here.
pub struct AppState {
    pub facade: LocationFacade,
}
