use std::env;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFLICT_WINDOW_MINUTES: i64 = 20;
/// Conflicts are evaluated within one service day.
pub const MAX_CONFLICT_WINDOW_MINUTES: i64 = 24 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("APPOINTMENT_CONFLICT_WINDOW_MINUTES must be between 1 and {max}, got {value}")]
    ConflictWindowOutOfRange { value: i64, max: i64 },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub environment: String,
    pub port: u16,
    pub appointment_conflict_window_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, falling back to in-memory storage");
                    String::new()
                }),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            run_migrations: parse_or("RUN_MIGRATIONS", false),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            port: parse_or("PORT", 3000),
            appointment_conflict_window_minutes: parse_or(
                "APPOINTMENT_CONFLICT_WINDOW_MINUTES",
                DEFAULT_CONFLICT_WINDOW_MINUTES,
            ),
        };

        config.validate()?;

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = self.appointment_conflict_window_minutes;
        if !(1..=MAX_CONFLICT_WINDOW_MINUTES).contains(&window) {
            return Err(ConfigError::ConflictWindowOutOfRange {
                value: window,
                max: MAX_CONFLICT_WINDOW_MINUTES,
            });
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty() && !self.jwt_secret.is_empty()
    }

    pub fn uses_database(&self) -> bool {
        !self.database_url.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 10,
            run_migrations: false,
            jwt_secret: String::new(),
            environment: "development".to_string(),
            port: 3000,
            appointment_conflict_window_minutes: DEFAULT_CONFLICT_WINDOW_MINUTES,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
