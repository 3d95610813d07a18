use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, JwtHeader, Role, User};

const DEFAULT_TOKEN_HOURS: i64 = 24;

/// Settings used to build an [`AppConfig`] for in-process tests.
pub struct TestConfig {
    pub jwt_secret: String,
    pub conflict_window_minutes: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "campus-clinic-test-signing-secret-0123456789".to_string(),
            conflict_window_minutes: 20,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            environment: "test".to_string(),
            appointment_conflict_window_minutes: self.conflict_window_minutes,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// A staff identity that tests can sign tokens for. `role_id` is raw so
/// tests can also mint tokens carrying ids no [`Role`] maps to.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role_id: i16,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::admin("admin@clinic.test")
    }
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role_id: role.id(),
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, Role::Admin)
    }

    pub fn reception(email: &str) -> Self {
        Self::new(email, Role::Reception)
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, Role::Doctor)
    }

    pub fn nurse(email: &str) -> Self {
        Self::new(email, Role::Nurse)
    }

    pub fn cashier(email: &str) -> Self {
        Self::new(email, Role::Cashier)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Role::from_id(self.role_id),
            created_at: Some(Utc::now()),
        }
    }

    fn claims(&self, valid_for: Duration) -> JwtClaims {
        let issued = Utc::now();
        JwtClaims {
            sub: self.id.clone(),
            email: Some(self.email.clone()),
            role_id: Some(self.role_id),
            iat: Some(issued.timestamp().max(0) as u64),
            exp: Some((issued + valid_for).timestamp().max(0) as u64),
        }
    }
}

fn encode_segment<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).expect("test claims serialize");
    URL_SAFE_NO_PAD.encode(json)
}

fn sign(signing_input: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Mints HS256 tokens in the shape the identity provider issues.
pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Signs a token for `user` that expires after `exp_hours` (24 when `None`).
    /// Negative hours produce an already expired token.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let header = JwtHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = user.claims(Duration::hours(exp_hours.unwrap_or(DEFAULT_TOKEN_HOURS)));

        let signing_input = format!("{}.{}", encode_segment(&header), encode_segment(&claims));
        let signature = sign(&signing_input, secret);
        format!("{signing_input}.{signature}")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", None)
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    /// `Authorization` header value for the given user.
    pub fn bearer(user: &TestUser, config: &TestConfig) -> String {
        format!("Bearer {}", Self::create_test_token(user, &config.jwt_secret, None))
    }
}
