use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde_json::Value;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::api::error::ApiError;
use crate::engine::{FleetCoordinator, StatusReport};
use crate::events::FleetEvent;
use crate::types::{FleetMetrics, TaskResult};

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_status(State(coordinator): State<FleetCoordinator>) -> Json<StatusReport> {
    Json(coordinator.status())
}

pub async fn get_metrics(State(coordinator): State<FleetCoordinator>) -> Json<FleetMetrics> {
    Json(coordinator.metrics())
}

/// Runs one task. The body is the task itself, optionally carrying a
/// `taskId`; one is generated otherwise.
pub async fn submit_task(
    State(coordinator): State<FleetCoordinator>,
    Json(payload): Json<Value>,
) -> Result<Json<TaskResult>, ApiError> {
    let task_id = payload
        .get("taskId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = coordinator.execute_payload(&task_id, payload).await?;
    Ok(Json(result))
}

pub async fn post_event(
    State(coordinator): State<FleetCoordinator>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let event: FleetEvent = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("Invalid event: {}", e)))?;
    if !event.is_inbound() {
        return Err(ApiError::bad_request(format!(
            "{} is emitted by the coordinator, not accepted",
            event.name()
        )));
    }

    let name = event.name();
    coordinator.handle_event(event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": name })),
    ))
}

/// Server-sent stream of everything published on the fleet bus.
pub async fn stream_events(
    State(coordinator): State<FleetCoordinator>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = coordinator.bus().subscribe().into_inner();
    let stream = BroadcastStream::new(receiver).filter_map(|received| match received {
        Ok(event) => match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                log::warn!("Failed to encode {} for streaming: {}", event.name(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Event stream subscriber fell behind: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
