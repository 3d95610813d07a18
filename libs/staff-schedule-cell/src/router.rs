use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn staff_schedule_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_schedules).post(handlers::create_schedule))
        .route("/bulk", post(handlers::bulk_create_schedules))
        .route("/check-conflicts", post(handlers::check_schedule_conflicts))
        .route("/{schedule_id}", put(handlers::update_schedule))
        .route("/{schedule_id}/deactivate", post(handlers::deactivate_schedule))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
