use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tracing::error;

use appointment_cell::appointment_routes;
use billing_cell::billing_routes;
use shared_database::AppState;
use staff_schedule_cell::staff_schedule_routes;
use waiting_queue_cell::waiting_queue_routes;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Campus Clinic API is running!" }))
        .route("/health", get(health_check).with_state(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/admin/staff-schedules", staff_schedule_routes(state.clone()))
        .nest("/bills", billing_routes(state.clone()))
        .merge(waiting_queue_routes(state))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let storage = state.gateway.backend_name();
    match state.gateway.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "storage": storage }))),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "storage": storage })),
            )
        }
    }
}
