use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{clinic_day_key, StorageGateway, UnitOfWork};
use shared_models::appointment::Appointment;
use shared_models::queue::{QueueEntry, QueueStatus, QueueTicket};

use crate::error::QueueError;
use crate::models::{
    CallNextResponse, ClinicQueueResponse, QueueNumberUpdate, QueuePosition, QueueStatistics,
};

/// Assigns and advances per clinic-day queue positions.
pub struct QueueSequencer {
    gateway: Arc<dyn StorageGateway>,
}

impl QueueSequencer {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    // ==============================================================================
    // IN-TRANSACTION STEPS (shared with the appointment lifecycle)
    // ==============================================================================

    /// Appends the appointment to its clinic-day queue inside the caller's transaction.
    pub async fn enqueue_in(
        uow: &mut dyn UnitOfWork,
        appointment: &Appointment,
    ) -> Result<QueueEntry, QueueError> {
        let service_day = appointment.service_day();
        let queue_number = uow.next_queue_number(appointment.clinic_id, service_day).await?;

        let now = Utc::now();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            clinic_id: appointment.clinic_id,
            service_day,
            queue_number,
            status: QueueStatus::Waiting,
            created_at: now,
            updated_at: now,
        };
        uow.insert_queue_entry(&entry).await?;

        debug!(
            "Queued appointment {} as #{} at clinic {} on {}",
            appointment.id, queue_number, appointment.clinic_id, service_day
        );
        Ok(entry)
    }

    /// Marks the appointment's queue entry Completed, if it has one that is still open.
    pub async fn retire_in(
        uow: &mut dyn UnitOfWork,
        appointment_id: Uuid,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let Some(mut entry) = uow.lock_queue_entry_for_appointment(appointment_id).await? else {
            return Ok(None);
        };

        if entry.status == QueueStatus::Completed {
            return Ok(Some(entry));
        }

        entry.status = QueueStatus::Completed;
        entry.updated_at = Utc::now();
        uow.update_queue_entry(&entry).await?;

        debug!("Retired queue entry {} for appointment {}", entry.id, appointment_id);
        Ok(Some(entry))
    }

    // ==============================================================================
    // STANDALONE OPERATIONS
    // ==============================================================================

    pub async fn enqueue(&self, appointment_id: Uuid) -> Result<QueueTicket, QueueError> {
        let mut uow = self.gateway.begin().await?;

        let appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(QueueError::AppointmentNotFound(appointment_id))?;

        if appointment.status.is_terminal() {
            return Err(QueueError::NotQueueable {
                id: appointment.id,
                status: appointment.status,
            });
        }

        if uow.lock_queue_entry_for_appointment(appointment_id).await?.is_some() {
            return Err(QueueError::AlreadyQueued(appointment_id));
        }

        let entry = Self::enqueue_in(uow.as_mut(), &appointment).await?;
        let ticket = uow
            .queue_ticket(entry.id)
            .await?
            .ok_or(QueueError::EntryNotFound(entry.id))?;
        uow.commit().await?;

        info!("Appointment {} enqueued as #{}", appointment_id, ticket.queue_number);
        Ok(ticket)
    }

    /// Moves the lowest-numbered Waiting entry to In-Service. An empty queue is not an error.
    pub async fn call_next(
        &self,
        clinic_id: Uuid,
        service_day: NaiveDate,
    ) -> Result<CallNextResponse, QueueError> {
        let mut uow = self.gateway.begin().await?;

        let Some(mut entry) = uow.lock_next_waiting(clinic_id, service_day).await? else {
            uow.rollback().await?;
            debug!("No patients waiting at clinic {} on {}", clinic_id, service_day);
            return Ok(CallNextResponse {
                patient: None,
                message: "No patients waiting in queue".to_string(),
            });
        };

        entry.status = QueueStatus::InService;
        entry.updated_at = Utc::now();
        uow.update_queue_entry(&entry).await?;

        let ticket = uow
            .queue_ticket(entry.id)
            .await?
            .ok_or(QueueError::EntryNotFound(entry.id))?;
        uow.commit().await?;

        info!(
            "Called #{} ({}) at clinic {} on {}",
            ticket.queue_number, ticket.patient_name, clinic_id, service_day
        );

        let message = format!("Now serving #{}: {}", ticket.queue_number, ticket.patient_name);
        Ok(CallNextResponse {
            patient: Some(ticket),
            message,
        })
    }

    pub async fn update_status(
        &self,
        queue_id: Uuid,
        status: QueueStatus,
    ) -> Result<QueueEntry, QueueError> {
        let mut uow = self.gateway.begin().await?;

        let mut entry = uow
            .lock_queue_entry(queue_id)
            .await?
            .ok_or(QueueError::EntryNotFound(queue_id))?;

        if !entry.status.can_transition_to(&status) {
            warn!(
                "Rejected queue transition {} -> {} for entry {}",
                entry.status, status, queue_id
            );
            return Err(QueueError::InvalidStatusTransition {
                from: entry.status,
                to: status,
            });
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        uow.update_queue_entry(&entry).await?;
        uow.commit().await?;

        info!("Queue entry {} is now {}", queue_id, status);
        Ok(entry)
    }

    /// Applies manual position changes atomically. Every touched clinic-day must
    /// still have unique queue numbers afterwards, otherwise nothing is written.
    pub async fn reorder(&self, updates: &[QueueNumberUpdate]) -> Result<Vec<QueueEntry>, QueueError> {
        validate_reorder(updates)?;

        let mut ordered: Vec<QueueNumberUpdate> = updates.to_vec();
        ordered.sort_by_key(|u| u.queue_id);

        let mut uow = self.gateway.begin().await?;

        // Clinic-day keys are taken in sorted order before any entry row is locked.
        let mut touched: BTreeSet<(Uuid, NaiveDate)> = BTreeSet::new();
        for update in &ordered {
            let entry = uow
                .get_queue_entry(update.queue_id)
                .await?
                .ok_or(QueueError::EntryNotFound(update.queue_id))?;
            touched.insert((entry.clinic_id, entry.service_day));
        }
        let keys: BTreeSet<String> = touched
            .iter()
            .map(|(clinic_id, day)| clinic_day_key(*clinic_id, *day))
            .collect();
        for key in &keys {
            uow.lock_key(key).await?;
        }

        let mut updated = Vec::with_capacity(ordered.len());
        let now = Utc::now();
        for update in &ordered {
            let mut entry = uow
                .lock_queue_entry(update.queue_id)
                .await?
                .ok_or(QueueError::EntryNotFound(update.queue_id))?;

            entry.queue_number = update.queue_number;
            entry.updated_at = now;
            uow.update_queue_entry(&entry).await?;
            updated.push(entry);
        }

        for (clinic_id, service_day) in &touched {
            let entries = uow.queue_entries_for_clinic_day(*clinic_id, *service_day).await?;

            if let Some(queue_number) = first_duplicate(&entries) {
                uow.rollback().await?;
                warn!(
                    "Reorder rejected: #{} duplicated at clinic {} on {}",
                    queue_number, clinic_id, service_day
                );
                return Err(QueueError::DuplicateQueueNumber {
                    clinic_id: *clinic_id,
                    service_day: *service_day,
                    queue_number,
                });
            }

            if let Some(highest) = entries.iter().map(|e| e.queue_number).max() {
                uow.raise_queue_counter(*clinic_id, *service_day, highest).await?;
            }
        }

        uow.commit().await?;

        info!("Reordered {} queue entries across {} clinic-day(s)", updated.len(), touched.len());
        Ok(updated)
    }

    pub async fn get_position(
        &self,
        patient_id: Uuid,
        clinic_id: Uuid,
        service_day: NaiveDate,
    ) -> Result<QueuePosition, QueueError> {
        let mut uow = self.gateway.begin().await?;

        let entry = uow
            .latest_queue_entry_for_patient(patient_id, clinic_id, service_day)
            .await?
            .ok_or(QueueError::PatientNotQueued {
                patient_id,
                clinic_id,
                service_day,
            })?;

        let people_ahead = if entry.status == QueueStatus::Waiting {
            uow.count_waiting_ahead(clinic_id, service_day, entry.queue_number).await?
        } else {
            0
        };
        uow.rollback().await?;

        Ok(QueuePosition {
            patient_id,
            clinic_id,
            service_day,
            queue_id: entry.id,
            queue_number: entry.queue_number,
            status: entry.status,
            people_ahead,
        })
    }

    pub async fn get_clinic_queue(
        &self,
        clinic_id: Uuid,
        service_day: NaiveDate,
    ) -> Result<ClinicQueueResponse, QueueError> {
        let mut uow = self.gateway.begin().await?;
        let queue = uow.queue_tickets_for_clinic_day(clinic_id, service_day).await?;
        uow.rollback().await?;

        let statistics = QueueStatistics::from_tickets(&queue);
        Ok(ClinicQueueResponse {
            clinic_id,
            service_day,
            queue,
            statistics,
        })
    }
}

fn validate_reorder(updates: &[QueueNumberUpdate]) -> Result<(), QueueError> {
    if updates.is_empty() {
        return Err(QueueError::ValidationError("queueUpdates must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    for update in updates {
        if update.queue_number < 1 {
            return Err(QueueError::ValidationError(format!(
                "queue_number for {} must be positive",
                update.queue_id
            )));
        }
        if !seen.insert(update.queue_id) {
            return Err(QueueError::ValidationError(format!(
                "queue entry {} appears more than once",
                update.queue_id
            )));
        }
    }
    Ok(())
}

fn first_duplicate(entries: &[QueueEntry]) -> Option<i32> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(|e| e.queue_number)
        .find(|number| !seen.insert(*number))
}
