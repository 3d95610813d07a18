use thiserror::Error;

use shared_models::error::AppError;
use shared_models::UnknownStatus;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        let constraint_code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == UNIQUE_VIOLATION || code == EXCLUSION_VIOLATION)
            .unwrap_or(false);

        if constraint_code {
            return DatabaseError::ConstraintViolation(err.to_string());
        }

        DatabaseError::Sqlx(err)
    }
}

impl From<UnknownStatus> for DatabaseError {
    fn from(err: UnknownStatus) -> Self {
        DatabaseError::Decode(err.to_string())
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation(msg) => {
                AppError::Conflict(format!("Concurrent update rejected: {}", msg))
            }
            other => AppError::Database(other.to_string()),
        }
    }
}
