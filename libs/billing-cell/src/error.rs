use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::billing::BillStatus;
use shared_models::error::{AppError, FieldError};

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Bill not found: {0}")]
    NotFound(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Bill {id} is {status} and does not accept payments")]
    NotPayable { id: Uuid, status: BillStatus },

    #[error("Payment of {amount} exceeds the remaining balance of {remaining}")]
    Overpayment { amount: Decimal, remaining: Decimal },

    #[error("Bill {id} cannot be cancelled: {reason}")]
    NotCancellable { id: Uuid, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation failed")]
    InvalidFields(Vec<FieldError>),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotFound(_) | BillingError::PatientNotFound(_) => AppError::NotFound(err.to_string()),
            BillingError::NotPayable { .. }
            | BillingError::Overpayment { .. }
            | BillingError::NotCancellable { .. } => AppError::Conflict(err.to_string()),
            BillingError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            BillingError::InvalidFields(errors) => AppError::InvalidFields(errors),
            BillingError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn overpayment_is_a_conflict() {
        let err: AppError = BillingError::Overpayment {
            amount: Decimal::new(5000, 2),
            remaining: Decimal::new(2000, 2),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("remaining balance of 20.00"));
    }

    #[test]
    fn unknown_bill_is_not_found() {
        let err: AppError = BillingError::NotFound(Uuid::nil()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
