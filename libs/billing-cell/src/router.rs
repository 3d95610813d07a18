use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn billing_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_bill))
        .route("/{bill_id}", get(handlers::get_bill))
        .route("/{bill_id}/payments", post(handlers::process_payment))
        .route("/{bill_id}/cancel", post(handlers::cancel_bill))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
