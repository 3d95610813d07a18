use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::{staff_day_key, StorageGateway, UnitOfWork};
use shared_models::error::FieldError;
use shared_models::schedule::{ScheduleStatus, StaffSchedule};

use crate::models::{
    BulkCreateSchedulesResponse, CreateScheduleRequest, NewShift, ScheduleConflictCheckResponse,
    ScheduleConflictResult, ScheduleError, ScheduleListQuery, UpdateScheduleRequest,
};
use crate::services::conflict::ScheduleConflictService;

/// Admin management of staff shifts. Writes for one staff member on one date
/// are serialized by the staff-day lock, so the overlap check and the insert
/// cannot interleave with another writer.
pub struct StaffScheduleService {
    gateway: Arc<dyn StorageGateway>,
    conflicts: ScheduleConflictService,
}

impl StaffScheduleService {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self {
            gateway,
            conflicts: ScheduleConflictService::new(),
        }
    }

    pub async fn create_schedule(&self, request: &CreateScheduleRequest) -> Result<StaffSchedule, ScheduleError> {
        let shift = request.validate().map_err(ScheduleError::InvalidFields)?;

        let mut uow = self.gateway.begin().await?;
        ensure_references(uow.as_mut(), shift.staff_id, shift.clinic_id, shift.room_id).await?;

        uow.lock_key(&staff_day_key(shift.staff_id, shift.shift_date)).await?;

        if self
            .conflicts
            .has_schedule_conflict(
                uow.as_mut(),
                shift.staff_id,
                shift.shift_date,
                shift.start_time,
                shift.end_time,
                None,
            )
            .await?
        {
            return Err(overlap(&shift));
        }

        let schedule = build_schedule(&shift, Utc::now());
        uow.insert_schedule(&schedule).await?;
        uow.commit().await?;

        info!(
            "Schedule {} created for staff {} on {} ({}-{})",
            schedule.id, schedule.staff_id, schedule.shift_date, schedule.start_time, schedule.end_time
        );
        Ok(schedule)
    }

    /// All-or-nothing: one invalid or overlapping shift rejects the batch before anything is written.
    pub async fn bulk_create_schedules(
        &self,
        requests: &[CreateScheduleRequest],
    ) -> Result<BulkCreateSchedulesResponse, ScheduleError> {
        let batch = validate_batch(requests)?;

        let mut uow = self.gateway.begin().await?;

        let keys: BTreeSet<String> = batch
            .iter()
            .map(|shift| staff_day_key(shift.staff_id, shift.shift_date))
            .collect();
        for key in &keys {
            uow.lock_key(key).await?;
        }

        for (index, shift) in batch.iter().enumerate() {
            ensure_references(uow.as_mut(), shift.staff_id, shift.clinic_id, shift.room_id).await?;

            if let Some(earlier) = self
                .conflicts
                .overlapping_batch_items(shift, &batch[..index])
                .first()
            {
                warn!("Bulk schedule import rejected: item {} overlaps item {}", index, earlier);
                return Err(ScheduleError::BatchConflict {
                    index,
                    reason: format!("overlaps item {}", earlier),
                });
            }

            if self
                .conflicts
                .has_schedule_conflict(
                    uow.as_mut(),
                    shift.staff_id,
                    shift.shift_date,
                    shift.start_time,
                    shift.end_time,
                    None,
                )
                .await?
            {
                warn!("Bulk schedule import rejected: item {} overlaps a stored shift", index);
                return Err(ScheduleError::BatchConflict {
                    index,
                    reason: format!(
                        "staff {} already has a shift overlapping {}-{} on {}",
                        shift.staff_id, shift.start_time, shift.end_time, shift.shift_date
                    ),
                });
            }
        }

        let now = Utc::now();
        let mut schedule_ids = Vec::with_capacity(batch.len());
        for shift in &batch {
            let schedule = build_schedule(shift, now);
            uow.insert_schedule(&schedule).await?;
            schedule_ids.push(schedule.id);
        }

        uow.commit().await?;

        info!("Bulk imported {} schedules", schedule_ids.len());
        Ok(BulkCreateSchedulesResponse {
            imported_count: schedule_ids.len(),
            schedule_ids,
        })
    }

    /// Reports overlaps per item without writing.
    pub async fn check_conflicts(
        &self,
        requests: &[CreateScheduleRequest],
    ) -> Result<ScheduleConflictCheckResponse, ScheduleError> {
        let batch = validate_batch(requests)?;

        let mut uow = self.gateway.begin().await?;
        let mut results = Vec::with_capacity(batch.len());
        for (index, shift) in batch.iter().enumerate() {
            let conflicting_schedules = self
                .conflicts
                .find_conflicts(
                    uow.as_mut(),
                    shift.staff_id,
                    shift.shift_date,
                    shift.start_time,
                    shift.end_time,
                    None,
                )
                .await?;
            let conflicting_items = self.conflicts.overlapping_batch_items(shift, &batch[..index]);

            results.push(ScheduleConflictResult {
                index,
                has_conflict: !conflicting_schedules.is_empty() || !conflicting_items.is_empty(),
                conflicting_schedules,
                conflicting_items,
            });
        }
        uow.rollback().await?;

        Ok(ScheduleConflictCheckResponse {
            has_conflict: results.iter().any(|r| r.has_conflict),
            results,
        })
    }

    /// Applies a partial update and re-checks overlap against every other active shift.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: &UpdateScheduleRequest,
    ) -> Result<StaffSchedule, ScheduleError> {
        let mut uow = self.gateway.begin().await?;

        let current = uow
            .lock_schedule(schedule_id)
            .await?
            .ok_or(ScheduleError::NotFound(schedule_id))?;

        if current.status == ScheduleStatus::Inactive {
            return Err(ScheduleError::Inactive(schedule_id));
        }

        let merged = CreateScheduleRequest {
            staff_id: Some(current.staff_id),
            clinic_id: request.clinic_id.or(Some(current.clinic_id)),
            room_id: request.room_id.unwrap_or(current.room_id),
            shift_date: request.shift_date.or(Some(current.shift_date)),
            start_time: request.start_time.or(Some(current.start_time)),
            end_time: request.end_time.or(Some(current.end_time)),
        };
        let shift = merged.validate().map_err(ScheduleError::InvalidFields)?;

        ensure_references(uow.as_mut(), shift.staff_id, shift.clinic_id, shift.room_id).await?;

        let keys: BTreeSet<String> = [current.shift_date, shift.shift_date]
            .into_iter()
            .map(|date| staff_day_key(current.staff_id, date))
            .collect();
        for key in &keys {
            uow.lock_key(key).await?;
        }

        if self
            .conflicts
            .has_schedule_conflict(
                uow.as_mut(),
                shift.staff_id,
                shift.shift_date,
                shift.start_time,
                shift.end_time,
                Some(schedule_id),
            )
            .await?
        {
            return Err(overlap(&shift));
        }

        let updated = StaffSchedule {
            clinic_id: shift.clinic_id,
            room_id: shift.room_id,
            shift_date: shift.shift_date,
            start_time: shift.start_time,
            end_time: shift.end_time,
            updated_at: Utc::now(),
            ..current
        };
        uow.update_schedule(&updated).await?;
        uow.commit().await?;

        info!("Schedule {} updated", schedule_id);
        Ok(updated)
    }

    /// Marks the shift Inactive. Deactivating twice is a no-op.
    pub async fn deactivate_schedule(&self, schedule_id: Uuid) -> Result<StaffSchedule, ScheduleError> {
        let mut uow = self.gateway.begin().await?;

        let mut schedule = uow
            .lock_schedule(schedule_id)
            .await?
            .ok_or(ScheduleError::NotFound(schedule_id))?;

        if schedule.status == ScheduleStatus::Inactive {
            uow.rollback().await?;
            return Ok(schedule);
        }

        schedule.status = ScheduleStatus::Inactive;
        schedule.updated_at = Utc::now();
        uow.update_schedule(&schedule).await?;
        uow.commit().await?;

        info!("Schedule {} deactivated", schedule_id);
        Ok(schedule)
    }

    pub async fn list_schedules(&self, query: &ScheduleListQuery) -> Result<Vec<StaffSchedule>, ScheduleError> {
        let mut uow = self.gateway.begin().await?;
        let schedules = uow.list_schedules(query.staff_id, query.shift_date).await?;
        uow.rollback().await?;
        Ok(schedules)
    }
}

fn validate_batch(requests: &[CreateScheduleRequest]) -> Result<Vec<NewShift>, ScheduleError> {
    if requests.is_empty() {
        return Err(ScheduleError::ValidationError("schedules must not be empty".to_string()));
    }

    let mut field_errors = Vec::new();
    let mut batch = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        match request.validate() {
            Ok(shift) => batch.push(shift),
            Err(errors) => {
                field_errors.extend(errors.into_iter().map(|e: FieldError| e.nested("schedules", index)))
            }
        }
    }

    if field_errors.is_empty() {
        Ok(batch)
    } else {
        Err(ScheduleError::InvalidFields(field_errors))
    }
}

async fn ensure_references(
    uow: &mut dyn UnitOfWork,
    staff_id: Uuid,
    clinic_id: Uuid,
    room_id: Option<Uuid>,
) -> Result<(), ScheduleError> {
    if uow.staff_name(staff_id).await?.is_none() {
        return Err(ScheduleError::StaffNotFound(staff_id));
    }
    if uow.clinic_name(clinic_id).await?.is_none() {
        return Err(ScheduleError::ClinicNotFound(clinic_id));
    }
    if let Some(room_id) = room_id {
        if uow.room_name(room_id).await?.is_none() {
            return Err(ScheduleError::RoomNotFound(room_id));
        }
    }
    Ok(())
}

fn build_schedule(shift: &NewShift, now: DateTime<Utc>) -> StaffSchedule {
    StaffSchedule {
        id: Uuid::new_v4(),
        staff_id: shift.staff_id,
        clinic_id: shift.clinic_id,
        room_id: shift.room_id,
        shift_date: shift.shift_date,
        start_time: shift.start_time,
        end_time: shift.end_time,
        status: ScheduleStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

fn overlap(shift: &NewShift) -> ScheduleError {
    ScheduleError::Overlap {
        staff_id: shift.staff_id,
        shift_date: shift.shift_date,
        start: shift.start_time,
        end: shift.end_time,
    }
}
