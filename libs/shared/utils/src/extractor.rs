use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, Request as AxumRequest, State},
    http::Request,
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the resulting [`User`] in the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// JSON request body whose rejections come back as [`AppError`] 400s
/// instead of axum's plain-text 415/422 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: AxumRequest, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection_error(rejection)),
        }
    }
}

fn json_rejection_error(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(err) => AppError::ValidationError(err.body_text()),
        other => AppError::BadRequest(other.body_text()),
    }
}

/// Rejects callers whose role is not in `allowed`.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if user.has_any_role(allowed) {
        return Ok(());
    }

    let role = user
        .role
        .map(|r| r.to_string())
        .unwrap_or_else(|| "none".to_string());
    Err(AppError::Forbidden(format!(
        "Role '{}' is not allowed to perform this action",
        role
    )))
}

/// The caller's id as a UUID, needed wherever the actor is recorded.
pub fn actor_id(user: &User) -> Result<uuid::Uuid, AppError> {
    user.uuid()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{JwtTestUtils, TestConfig, TestUser};

    fn app(config: Arc<AppConfig>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(user): Extension<User>| async move { user.id }),
            )
            .layer(middleware::from_fn_with_state(config, auth_middleware))
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let response = app(TestConfig::default().to_arc())
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_bearer_token_reaches_handler() {
        let config = TestConfig::default();
        let user = TestUser::doctor("doc@clinic.test");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

        let response = app(config.to_arc())
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        amount: u32,
    }

    fn echo() -> Router {
        Router::new().route(
            "/echo",
            axum::routing::post(|JsonBody(payload): JsonBody<Payload>| async move { payload.amount.to_string() }),
        )
    }

    async fn post_echo(content_type: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let response = echo()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header("content-type", content_type)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn json_body_rejections_are_structured_400s() {
        let (status, body) = post_echo("application/json", r#"{"other": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("missing field `amount`"));

        let (status, body) = post_echo("application/json", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = post_echo("text/plain", r#"{"amount": 3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn json_body_passes_valid_payloads_through() {
        let response = echo()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"amount": 7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn require_role_checks_allow_list() {
        let cashier = TestUser::cashier("till@clinic.test").to_user();
        assert!(require_role(&cashier, &[Role::Cashier, Role::Admin]).is_ok());
        assert!(matches!(
            require_role(&cashier, &[Role::Doctor]),
            Err(AppError::Forbidden(_))
        ));

        let mut anonymous = cashier.clone();
        anonymous.role = None;
        assert!(require_role(&anonymous, &[Role::Cashier]).is_err());
    }
}
