use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::{AppError, FieldError};
use shared_models::schedule::StaffSchedule;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub staff_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub shift_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// A shift that passed field validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewShift {
    pub staff_id: Uuid,
    pub clinic_id: Uuid,
    pub room_id: Option<Uuid>,
    pub shift_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl CreateScheduleRequest {
    pub fn validate(&self) -> Result<NewShift, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.staff_id.map(|id| id.is_nil()).unwrap_or(true) {
            errors.push(FieldError::new("staff_id", "is required"));
        }
        if self.clinic_id.map(|id| id.is_nil()).unwrap_or(true) {
            errors.push(FieldError::new("clinic_id", "is required"));
        }
        if self.shift_date.is_none() {
            errors.push(FieldError::new("shift_date", "is required"));
        }
        if self.start_time.is_none() {
            errors.push(FieldError::new("start_time", "is required"));
        }
        if self.end_time.is_none() {
            errors.push(FieldError::new("end_time", "is required"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                errors.push(FieldError::new("end_time", "must be after start_time"));
            }
        }

        match (self.staff_id, self.clinic_id, self.shift_date, self.start_time, self.end_time) {
            (Some(staff_id), Some(clinic_id), Some(shift_date), Some(start_time), Some(end_time))
                if errors.is_empty() =>
            {
                Ok(NewShift {
                    staff_id,
                    clinic_id,
                    room_id: self.room_id,
                    shift_date,
                    start_time,
                    end_time,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Partial update; absent fields keep their current value.
/// `room_id: null` clears the room, an absent `room_id` keeps it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    pub clinic_id: Option<Uuid>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub room_id: Option<Option<Uuid>>,
    pub shift_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkCreateSchedulesRequest {
    pub schedules: Vec<CreateScheduleRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateSchedulesResponse {
    #[serde(rename = "importedCount")]
    pub imported_count: usize,
    pub schedule_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConflictCheckRequest {
    pub schedules: Vec<CreateScheduleRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflictResult {
    pub index: usize,
    pub has_conflict: bool,
    pub conflicting_schedules: Vec<StaffSchedule>,
    /// Earlier items of the same request this item overlaps.
    pub conflicting_items: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflictCheckResponse {
    pub has_conflict: bool,
    pub results: Vec<ScheduleConflictResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleListQuery {
    pub staff_id: Option<Uuid>,
    pub shift_date: Option<NaiveDate>,
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Schedule not found: {0}")]
    NotFound(Uuid),

    #[error("Staff member not found: {0}")]
    StaffNotFound(Uuid),

    #[error("Clinic not found: {0}")]
    ClinicNotFound(Uuid),

    #[error("Room not found: {0}")]
    RoomNotFound(Uuid),

    #[error("Shift {start}-{end} on {shift_date} overlaps an existing shift for staff {staff_id}")]
    Overlap {
        staff_id: Uuid,
        shift_date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Batch item {index} conflicts: {reason}")]
    BatchConflict { index: usize, reason: String },

    #[error("Schedule {0} is inactive")]
    Inactive(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation failed")]
    InvalidFields(Vec<FieldError>),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound(_)
            | ScheduleError::StaffNotFound(_)
            | ScheduleError::ClinicNotFound(_)
            | ScheduleError::RoomNotFound(_) => AppError::NotFound(err.to_string()),
            ScheduleError::Overlap { .. }
            | ScheduleError::BatchConflict { .. }
            | ScheduleError::Inactive(_) => AppError::Conflict(err.to_string()),
            ScheduleError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            ScheduleError::InvalidFields(errors) => AppError::InvalidFields(errors),
            ScheduleError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_room_distinguishes_null_from_absent() {
        let absent: UpdateScheduleRequest = serde_json::from_str(r#"{"start_time": "09:00:00"}"#).unwrap();
        assert_eq!(absent.room_id, None);

        let cleared: UpdateScheduleRequest = serde_json::from_str(r#"{"room_id": null}"#).unwrap();
        assert_eq!(cleared.room_id, Some(None));

        let room = Uuid::new_v4();
        let moved: UpdateScheduleRequest = serde_json::from_str(&format!(r#"{{"room_id": "{}"}}"#, room)).unwrap();
        assert_eq!(moved.room_id, Some(Some(room)));
    }

    #[test]
    fn end_must_follow_start() {
        let request = CreateScheduleRequest {
            staff_id: Some(Uuid::new_v4()),
            clinic_id: Some(Uuid::new_v4()),
            room_id: None,
            shift_date: NaiveDate::from_ymd_opt(2024, 9, 2),
            start_time: NaiveTime::from_hms_opt(12, 0, 0),
            end_time: NaiveTime::from_hms_opt(12, 0, 0),
        };
        let errors = request.validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::new("end_time", "must be after start_time")]);
    }

    #[test]
    fn empty_request_lists_required_fields() {
        let errors = CreateScheduleRequest::default().validate().unwrap_err();
        assert_eq!(errors.len(), 5);
    }
}
