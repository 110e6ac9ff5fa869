use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::engine::FleetCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: FleetCoordinator,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        .route("/metrics", get(handlers::get_metrics))
        .route("/tasks", post(handlers::submit_task))
        .route("/events", post(handlers::post_event))
        .route("/events", get(handlers::stream_events))
        .layer(CorsLayer::permissive())
        .with_state(state.coordinator)
}

pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    log::info!("Fleet coordinator API listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
