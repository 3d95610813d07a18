use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{clinic_day_key, staff_day_key, StorageGateway, UnitOfWork};
use shared_models::appointment::{Appointment, AppointmentDetails, AppointmentStatus};
use shared_models::error::FieldError;
use shared_models::notification::Notification;
use waiting_queue_cell::{CallNextResponse, QueueSequencer};

use crate::models::{
    AppointmentError, BulkCreateAppointmentsResponse, ConflictCheckRequest, ConflictCheckResponse,
    CreateAppointmentRequest, NewAppointment,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{ensure_active, validate_cancellation, validate_status_change};

/// Appointment lifecycle: booking, status changes, cancellation and reassignment.
/// Every operation runs in a single unit of work.
pub struct AppointmentBookingService {
    gateway: Arc<dyn StorageGateway>,
    conflicts: ConflictDetectionService,
}

impl AppointmentBookingService {
    pub fn new(gateway: Arc<dyn StorageGateway>, conflict_window_minutes: i64) -> Self {
        Self {
            gateway,
            conflicts: ConflictDetectionService::new(conflict_window_minutes),
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    pub async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let new = request.validate().map_err(AppointmentError::InvalidFields)?;

        let mut uow = self.gateway.begin().await?;
        ensure_references(uow.as_mut(), &new).await?;

        uow.lock_key(&staff_day_key(new.staff_id, new.service_day())).await?;

        if self
            .conflicts
            .has_appointment_conflict(uow.as_mut(), new.staff_id, new.clinic_id, new.appointment_time, None)
            .await?
        {
            return Err(AppointmentError::ConflictDetected {
                staff_id: new.staff_id,
                appointment_time: new.appointment_time,
                window_minutes: self.conflicts.window_minutes(),
            });
        }

        let appointment = build_appointment(&new, Utc::now());
        uow.insert_appointment(&appointment).await?;
        QueueSequencer::enqueue_in(uow.as_mut(), &appointment).await?;

        let details = details_in(uow.as_mut(), appointment).await?;
        uow.commit().await?;

        info!(
            "Appointment {} booked for patient {} with staff {} at {} (queue #{})",
            details.appointment.id,
            details.appointment.patient_id,
            details.appointment.staff_id,
            details.appointment.appointment_time,
            details.queue_number.unwrap_or_default()
        );
        Ok(details)
    }

    /// All-or-nothing import: any invalid or conflicting item rejects the whole batch.
    pub async fn bulk_create_appointments(
        &self,
        requests: &[CreateAppointmentRequest],
    ) -> Result<BulkCreateAppointmentsResponse, AppointmentError> {
        if requests.is_empty() {
            return Err(AppointmentError::ValidationError(
                "appointments must not be empty".to_string(),
            ));
        }

        let mut field_errors = Vec::new();
        let mut batch = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match request.validate() {
                Ok(new) => batch.push(new),
                Err(errors) => field_errors.extend(
                    errors.into_iter().map(|e: FieldError| e.nested("appointments", index)),
                ),
            }
        }
        if !field_errors.is_empty() {
            return Err(AppointmentError::InvalidFields(field_errors));
        }

        let mut uow = self.gateway.begin().await?;

        // Staff-day keys before clinic-day keys, each group sorted. Holding every
        // clinic-day key up front keeps counter reservations below from crossing another batch.
        let staff_days: BTreeSet<String> = batch
            .iter()
            .map(|new| staff_day_key(new.staff_id, new.service_day()))
            .collect();
        let clinic_days: BTreeSet<String> = batch
            .iter()
            .map(|new| clinic_day_key(new.clinic_id, new.service_day()))
            .collect();
        for key in staff_days.iter().chain(&clinic_days) {
            uow.lock_key(key).await?;
        }

        for (index, new) in batch.iter().enumerate() {
            ensure_references(uow.as_mut(), new).await?;

            if let Some(earlier) = self.conflicts.conflicting_batch_item(new, &batch[..index]) {
                warn!("Bulk import rejected: item {} collides with item {}", index, earlier);
                return Err(AppointmentError::BatchConflict {
                    index,
                    reason: format!("within {} minutes of item {}", self.conflicts.window_minutes(), earlier),
                });
            }

            if self
                .conflicts
                .has_appointment_conflict(uow.as_mut(), new.staff_id, new.clinic_id, new.appointment_time, None)
                .await?
            {
                warn!("Bulk import rejected: item {} collides with a stored appointment", index);
                return Err(AppointmentError::BatchConflict {
                    index,
                    reason: format!(
                        "staff {} already has an appointment within {} minutes of {}",
                        new.staff_id,
                        self.conflicts.window_minutes(),
                        new.appointment_time
                    ),
                });
            }
        }

        let now = Utc::now();
        let mut appointment_ids = Vec::with_capacity(batch.len());
        for new in &batch {
            let appointment = build_appointment(new, now);
            uow.insert_appointment(&appointment).await?;
            QueueSequencer::enqueue_in(uow.as_mut(), &appointment).await?;
            appointment_ids.push(appointment.id);
        }

        uow.commit().await?;

        info!("Bulk imported {} appointments", appointment_ids.len());
        Ok(BulkCreateAppointmentsResponse {
            imported_count: appointment_ids.len(),
            appointment_ids,
        })
    }

    /// Read-only conflict probe; nothing is reserved.
    pub async fn check_conflicts(
        &self,
        request: &ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        let conflicting = self
            .conflicts
            .find_conflicts(
                uow.as_mut(),
                request.staff_id,
                request.clinic_id,
                request.appointment_time,
                request.exclude_appointment_id,
            )
            .await?;
        uow.rollback().await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting.is_empty(),
            window_minutes: self.conflicts.window_minutes(),
            conflicting_appointments: conflicting,
        })
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        let appointment = uow
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;
        let details = details_in(uow.as_mut(), appointment).await?;
        uow.rollback().await?;
        Ok(details)
    }

    pub async fn list_clinic_appointments(
        &self,
        clinic_id: Uuid,
        service_day: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        uow.clinic_name(clinic_id)
            .await?
            .ok_or(AppointmentError::ClinicNotFound(clinic_id))?;

        let appointments = uow.appointments_for_clinic_day(clinic_id, service_day).await?;
        let mut details = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            details.push(details_in(uow.as_mut(), appointment).await?);
        }
        uow.rollback().await?;

        debug!("Listed {} appointments for clinic {} on {}", details.len(), clinic_id, service_day);
        Ok(details)
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        let mut appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        validate_status_change(appointment.status, status)?;

        let previous = appointment.status;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        uow.update_appointment(&appointment).await?;

        if status == AppointmentStatus::Completed {
            QueueSequencer::retire_in(uow.as_mut(), appointment_id).await?;
        }

        let details = details_in(uow.as_mut(), appointment).await?;
        uow.commit().await?;

        info!("Appointment {} moved {} -> {}", appointment_id, previous, status);
        Ok(details)
    }

    /// Cancels with a mandatory reason and retires the queue entry in the same transaction.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<AppointmentDetails, AppointmentError> {
        if reason.map(str::trim).unwrap_or_default().is_empty() {
            return Err(AppointmentError::ValidationError(
                "cancellationReason is required".to_string(),
            ));
        }

        let mut uow = self.gateway.begin().await?;
        let mut appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        let reason = validate_cancellation(&appointment, reason)?;

        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancellation_reason = Some(reason);
        appointment.updated_at = Utc::now();
        uow.update_appointment(&appointment).await?;

        let retired = QueueSequencer::retire_in(uow.as_mut(), appointment_id).await?;

        let details = details_in(uow.as_mut(), appointment).await?;
        uow.commit().await?;

        info!(
            "Appointment {} cancelled{}",
            appointment_id,
            if retired.is_some() { " and removed from the queue" } else { "" }
        );
        Ok(details)
    }

    pub async fn reassign_room(
        &self,
        appointment_id: Uuid,
        room_id: Uuid,
        actor_id: Uuid,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        let mut appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;
        ensure_active(&appointment)?;

        let room_name = uow
            .room_name(room_id)
            .await?
            .ok_or(AppointmentError::RoomNotFound(room_id))?;

        appointment.room_id = Some(room_id);
        appointment.updated_at = Utc::now();
        uow.update_appointment(&appointment).await?;

        let message = format!(
            "Appointment at {} has been moved to room {}",
            appointment.appointment_time, room_name
        );
        notify(
            uow.as_mut(),
            &[appointment.staff_id, actor_id],
            "Appointment room changed",
            &message,
        )
        .await?;

        let details = details_in(uow.as_mut(), appointment).await?;
        uow.commit().await?;

        info!("Appointment {} reassigned to room {} by {}", appointment_id, room_id, actor_id);
        Ok(details)
    }

    /// Moves the appointment to another staff member after re-running the conflict check on their day.
    pub async fn reassign_doctor(
        &self,
        appointment_id: Uuid,
        staff_id: Uuid,
        actor_id: Uuid,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let mut uow = self.gateway.begin().await?;
        let mut appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;
        ensure_active(&appointment)?;

        let new_staff_name = uow
            .staff_name(staff_id)
            .await?
            .ok_or(AppointmentError::StaffNotFound(staff_id))?;

        uow.lock_key(&staff_day_key(staff_id, appointment.service_day())).await?;

        if self
            .conflicts
            .has_appointment_conflict(
                uow.as_mut(),
                staff_id,
                appointment.clinic_id,
                appointment.appointment_time,
                Some(appointment.id),
            )
            .await?
        {
            return Err(AppointmentError::ConflictDetected {
                staff_id,
                appointment_time: appointment.appointment_time,
                window_minutes: self.conflicts.window_minutes(),
            });
        }

        let previous_staff = appointment.staff_id;
        appointment.staff_id = staff_id;
        appointment.updated_at = Utc::now();
        uow.update_appointment(&appointment).await?;

        let message = format!(
            "Appointment at {} is now assigned to {}",
            appointment.appointment_time, new_staff_name
        );
        notify(
            uow.as_mut(),
            &[previous_staff, staff_id, actor_id],
            "Appointment reassigned",
            &message,
        )
        .await?;

        let details = details_in(uow.as_mut(), appointment).await?;
        uow.commit().await?;

        info!(
            "Appointment {} reassigned from staff {} to {} by {}",
            appointment_id, previous_staff, staff_id, actor_id
        );
        Ok(details)
    }

    /// Queue call-next exposed under the appointments routes.
    pub async fn call_next_patient(
        &self,
        clinic_id: Uuid,
        service_day: NaiveDate,
    ) -> Result<CallNextResponse, AppointmentError> {
        let sequencer = QueueSequencer::new(self.gateway.clone());
        Ok(sequencer.call_next(clinic_id, service_day).await?)
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

fn build_appointment(new: &NewAppointment, now: DateTime<Utc>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        clinic_id: new.clinic_id,
        staff_id: new.staff_id,
        room_id: new.room_id,
        appointment_time: new.appointment_time,
        status: AppointmentStatus::Scheduled,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    }
}

async fn ensure_references(uow: &mut dyn UnitOfWork, new: &NewAppointment) -> Result<(), AppointmentError> {
    if uow.patient_name(new.patient_id).await?.is_none() {
        return Err(AppointmentError::PatientNotFound(new.patient_id));
    }
    if uow.clinic_name(new.clinic_id).await?.is_none() {
        return Err(AppointmentError::ClinicNotFound(new.clinic_id));
    }
    if uow.staff_name(new.staff_id).await?.is_none() {
        return Err(AppointmentError::StaffNotFound(new.staff_id));
    }
    if let Some(room_id) = new.room_id {
        if uow.room_name(room_id).await?.is_none() {
            return Err(AppointmentError::RoomNotFound(room_id));
        }
    }
    Ok(())
}

/// Joins the display names and current queue number onto an appointment.
async fn details_in(
    uow: &mut dyn UnitOfWork,
    appointment: Appointment,
) -> Result<AppointmentDetails, AppointmentError> {
    let patient_name = uow
        .patient_name(appointment.patient_id)
        .await?
        .ok_or(AppointmentError::PatientNotFound(appointment.patient_id))?;
    let clinic_name = uow
        .clinic_name(appointment.clinic_id)
        .await?
        .ok_or(AppointmentError::ClinicNotFound(appointment.clinic_id))?;
    let staff_name = uow
        .staff_name(appointment.staff_id)
        .await?
        .ok_or(AppointmentError::StaffNotFound(appointment.staff_id))?;
    let room_name = match appointment.room_id {
        Some(room_id) => uow.room_name(room_id).await?,
        None => None,
    };

    let queue_number = uow
        .queue_entries_for_clinic_day(appointment.clinic_id, appointment.service_day())
        .await?
        .into_iter()
        .find(|entry| entry.appointment_id == appointment.id)
        .map(|entry| entry.queue_number);

    Ok(AppointmentDetails {
        appointment,
        patient_name,
        clinic_name,
        staff_name,
        room_name,
        queue_number,
    })
}

async fn notify(
    uow: &mut dyn UnitOfWork,
    recipients: &[Uuid],
    title: &str,
    message: &str,
) -> Result<(), AppointmentError> {
    let unique: BTreeSet<Uuid> = recipients.iter().copied().collect();
    for recipient in unique {
        uow.insert_notification(&Notification::new(recipient, title, message)).await?;
    }
    Ok(())
}
