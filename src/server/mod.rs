mod handlers;
mod state;

use axum::routing::get;
use axum::Router;
use state::AppState;
use std::io;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::location::LocationFacade;

pub fn build_router(facade: LocationFacade) -> Router {
    let state = Arc::new(AppState { facade });

    Router::new()
        .route("/api/location", get(handlers::current_location))
        .route("/api/authorization", get(handlers::authorization))
        .route("/api/geocode", get(handlers::geocode))
        .route("/api/geocode/zip", get(handlers::geocode_zip))
        .route("/api/geocode/remote", get(handlers::geocode_remote))
        .route("/api/distance", get(handlers::distance))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(facade: LocationFacade, host: &str, port: u16) -> io::Result<()> {
    let app = build_router(facade);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "server listening");
    eprintln!("  Locator server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
