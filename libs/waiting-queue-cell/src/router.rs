use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn waiting_queue_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/clinics/{clinic_id}/queue", get(handlers::get_clinic_queue))
        .route("/clinics/{clinic_id}/queue/next", post(handlers::call_next_patient))
        .route(
            "/clinics/{clinic_id}/queue/position/{patient_id}",
            get(handlers::get_queue_position),
        )
        .route("/queue/{queue_id}/status", patch(handlers::update_queue_status))
        .route("/queue/reorder", post(handlers::reorder_queue))
        .route("/queue/enqueue", post(handlers::enqueue_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
