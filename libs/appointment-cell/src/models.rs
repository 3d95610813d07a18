use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::appointment::{Appointment, AppointmentStatus};
use shared_models::error::{AppError, FieldError};
use waiting_queue_cell::QueueError;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Raw booking input. Fields are optional so every missing one can be reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub appointment_time: Option<DateTime<Utc>>,
}

/// A booking request that passed field validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub staff_id: Uuid,
    pub room_id: Option<Uuid>,
    pub appointment_time: DateTime<Utc>,
}

impl NewAppointment {
    pub fn service_day(&self) -> NaiveDate {
        self.appointment_time.date_naive()
    }
}

impl CreateAppointmentRequest {
    pub fn validate(&self) -> Result<NewAppointment, Vec<FieldError>> {
        let mut errors = Vec::new();

        let patient_id = required_id(self.patient_id, "patient_id", &mut errors);
        let clinic_id = required_id(self.clinic_id, "clinic_id", &mut errors);
        let staff_id = required_id(self.staff_id, "staff_id", &mut errors);

        if self.room_id.map(|id| id.is_nil()).unwrap_or(false) {
            errors.push(FieldError::new("room_id", "must be a valid id"));
        }

        if self.appointment_time.is_none() {
            errors.push(FieldError::new("appointment_time", "is required"));
        }

        match (patient_id, clinic_id, staff_id, self.appointment_time) {
            (Some(patient_id), Some(clinic_id), Some(staff_id), Some(appointment_time)) if errors.is_empty() => {
                Ok(NewAppointment {
                    patient_id,
                    clinic_id,
                    staff_id,
                    room_id: self.room_id,
                    appointment_time,
                })
            }
            _ => Err(errors),
        }
    }
}

fn required_id(value: Option<Uuid>, field: &str, errors: &mut Vec<FieldError>) -> Option<Uuid> {
    match value {
        None => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(id) if id.is_nil() => {
            errors.push(FieldError::new(field, "must be a valid id"));
            None
        }
        Some(id) => Some(id),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkCreateAppointmentsRequest {
    pub appointments: Vec<CreateAppointmentRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateAppointmentsResponse {
    #[serde(rename = "importedCount")]
    pub imported_count: usize,
    pub appointment_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckRequest {
    pub staff_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub window_minutes: i64,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(rename = "cancellationReason", alias = "cancellation_reason", default)]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReassignRoomRequest {
    pub room_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReassignDoctorRequest {
    pub staff_id: Uuid,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Clinic not found: {0}")]
    ClinicNotFound(Uuid),

    #[error("Staff member not found: {0}")]
    StaffNotFound(Uuid),

    #[error("Room not found: {0}")]
    RoomNotFound(Uuid),

    #[error("Staff member {staff_id} already has an appointment within {window_minutes} minutes of {appointment_time}")]
    ConflictDetected {
        staff_id: Uuid,
        appointment_time: DateTime<Utc>,
        window_minutes: i64,
    },

    #[error("Batch item {index} conflicts: {reason}")]
    BatchConflict { index: usize, reason: String },

    #[error("Invalid appointment status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment is {0} and can no longer be changed")]
    NotActive(AppointmentStatus),

    #[error("Use the cancel operation to cancel an appointment")]
    CancelRequiresReason,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation failed")]
    InvalidFields(Vec<FieldError>),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_)
            | AppointmentError::PatientNotFound(_)
            | AppointmentError::ClinicNotFound(_)
            | AppointmentError::StaffNotFound(_)
            | AppointmentError::RoomNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::ConflictDetected { .. }
            | AppointmentError::BatchConflict { .. }
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::NotActive(_) => AppError::Conflict(err.to_string()),
            AppointmentError::CancelRequiresReason | AppointmentError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            AppointmentError::InvalidFields(errors) => AppError::InvalidFields(errors),
            AppointmentError::Queue(queue) => queue.into(),
            AppointmentError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_all_reported() {
        let errors = CreateAppointmentRequest::default().validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["patient_id", "clinic_id", "staff_id", "appointment_time"]);
    }

    #[test]
    fn complete_request_validates() {
        let request = CreateAppointmentRequest {
            patient_id: Some(Uuid::new_v4()),
            clinic_id: Some(Uuid::new_v4()),
            staff_id: Some(Uuid::new_v4()),
            room_id: None,
            appointment_time: Some(Utc::now()),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn nil_ids_are_rejected() {
        let request = CreateAppointmentRequest {
            patient_id: Some(Uuid::nil()),
            clinic_id: Some(Uuid::new_v4()),
            staff_id: Some(Uuid::new_v4()),
            room_id: Some(Uuid::nil()),
            appointment_time: Some(Utc::now()),
        };
        let errors = request.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn cancel_reason_accepts_camel_case() {
        let body: CancelAppointmentRequest =
            serde_json::from_str(r#"{"cancellationReason": "Patient travelling"}"#).unwrap();
        assert_eq!(body.cancellation_reason.as_deref(), Some("Patient travelling"));
    }
}
