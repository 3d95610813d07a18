use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::appointment::AppointmentStatus;
use shared_models::error::AppError;
use shared_models::queue::QueueStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Patient {patient_id} is not queued at clinic {clinic_id} on {service_day}")]
    PatientNotQueued {
        patient_id: Uuid,
        clinic_id: Uuid,
        service_day: NaiveDate,
    },

    #[error("Appointment {0} is already in the queue")]
    AlreadyQueued(Uuid),

    #[error("Appointment {id} is {status} and cannot be queued")]
    NotQueueable { id: Uuid, status: AppointmentStatus },

    #[error("Invalid queue status transition from {from} to {to}")]
    InvalidStatusTransition { from: QueueStatus, to: QueueStatus },

    #[error("Queue number {queue_number} is used more than once at clinic {clinic_id} on {service_day}")]
    DuplicateQueueNumber {
        clinic_id: Uuid,
        service_day: NaiveDate,
        queue_number: i32,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::EntryNotFound(_)
            | QueueError::AppointmentNotFound(_)
            | QueueError::PatientNotQueued { .. } => AppError::NotFound(err.to_string()),
            QueueError::AlreadyQueued(_)
            | QueueError::InvalidStatusTransition { .. }
            | QueueError::DuplicateQueueNumber { .. } => AppError::Conflict(err.to_string()),
            QueueError::NotQueueable { .. } | QueueError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            QueueError::Database(db) => db.into(),
        }
    }
}
