use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment))
        .route("/bulk", post(handlers::bulk_create_appointments))
        .route("/check-conflicts", post(handlers::check_appointment_conflicts))
        .route("/clinic/{clinic_id}", get(handlers::list_clinic_appointments))
        .route("/clinics/{clinic_id}/call-next", post(handlers::call_next_patient))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/room", patch(handlers::reassign_room))
        .route("/{appointment_id}/doctor", patch(handlers::reassign_doctor))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
