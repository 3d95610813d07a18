use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::appointment::Appointment;
use shared_models::billing::{Bill, BillItem, Payment};
use shared_models::notification::Notification;
use shared_models::queue::{QueueEntry, QueueStatus, QueueTicket};
use shared_models::schedule::{ScheduleStatus, StaffSchedule};

use crate::error::{DatabaseError, DatabaseResult};
use crate::gateway::{StorageGateway, UnitOfWork};

/// Everything the in-memory store holds. Public so tests can inspect a [`MemoryGateway::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub patients: HashMap<Uuid, String>,
    pub clinics: HashMap<Uuid, String>,
    pub staff: HashMap<Uuid, String>,
    pub rooms: HashMap<Uuid, String>,
    pub appointments: HashMap<Uuid, Appointment>,
    pub queue_entries: HashMap<Uuid, QueueEntry>,
    pub queue_counters: HashMap<(Uuid, NaiveDate), i32>,
    pub schedules: HashMap<Uuid, StaffSchedule>,
    pub bills: HashMap<Uuid, Bill>,
    pub bill_items: Vec<BillItem>,
    pub payments: Vec<Payment>,
    pub notifications: Vec<Notification>,
}

impl MemoryState {
    /// Queue numbers must be unique per clinic-day once a transaction ends.
    fn check_queue_numbers(&self) -> DatabaseResult<()> {
        let mut seen = HashSet::new();
        for entry in self.queue_entries.values() {
            if !seen.insert((entry.clinic_id, entry.service_day, entry.queue_number)) {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "duplicate queue number {} for clinic {} on {}",
                    entry.queue_number, entry.clinic_id, entry.service_day
                )));
            }
        }
        Ok(())
    }

    fn ticket_for(&self, entry: &QueueEntry) -> Option<QueueTicket> {
        let appointment = self.appointments.get(&entry.appointment_id)?;
        let room_name = match appointment.room_id {
            Some(room_id) => Some(self.rooms.get(&room_id)?.clone()),
            None => None,
        };

        Some(QueueTicket {
            queue_id: entry.id,
            queue_number: entry.queue_number,
            status: entry.status,
            service_day: entry.service_day,
            appointment_id: appointment.id,
            appointment_time: appointment.appointment_time,
            clinic_id: entry.clinic_id,
            clinic_name: self.clinics.get(&entry.clinic_id)?.clone(),
            patient_id: appointment.patient_id,
            patient_name: self.patients.get(&appointment.patient_id)?.clone(),
            staff_id: appointment.staff_id,
            staff_name: self.staff.get(&appointment.staff_id)?.clone(),
            room_id: appointment.room_id,
            room_name,
        })
    }

    fn clinic_day_entries(&self, clinic_id: Uuid, day: NaiveDate) -> Vec<&QueueEntry> {
        let mut entries: Vec<&QueueEntry> = self
            .queue_entries
            .values()
            .filter(|e| e.clinic_id == clinic_id && e.service_day == day)
            .collect();
        entries.sort_by_key(|e| (e.queue_number, e.created_at));
        entries
    }
}

/// Process-local gateway used when no database is configured and by the test suites.
///
/// A unit of work holds the store-wide lock for its whole lifetime and mutates a
/// staged copy, so transactions are fully serialized and commit is all-or-nothing.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
    key_log: Arc<Mutex<Vec<String>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.patients.insert(id, name.to_string());
        id
    }

    pub async fn add_clinic(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.clinics.insert(id, name.to_string());
        id
    }

    pub async fn add_staff(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.staff.insert(id, name.to_string());
        id
    }

    pub async fn add_room(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.rooms.insert(id, name.to_string());
        id
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Every lock key requested so far, in acquisition order, committed or not.
    pub async fn acquired_keys(&self) -> Vec<String> {
        self.key_log.lock().await.clone()
    }

    /// Makes the next commit fail, leaving the committed state untouched.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn begin(&self) -> DatabaseResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            fail_next_commit: self.fail_next_commit.clone(),
            key_log: self.key_log.clone(),
        }))
    }

    async fn ping(&self) -> DatabaseResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_next_commit: Arc<AtomicBool>,
    key_log: Arc<Mutex<Vec<String>>>,
}

fn missing(what: &str, id: Uuid) -> DatabaseError {
    DatabaseError::QueryFailed(format!("{} {} does not exist", what, id))
}

fn duplicate(what: &str, id: Uuid) -> DatabaseError {
    DatabaseError::ConstraintViolation(format!("{} {} already exists", what, id))
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_key(&mut self, key: &str) -> DatabaseResult<()> {
        // The store-wide guard already serializes every transaction.
        debug!("Memory lock {}", key);
        self.key_log.lock().await.push(key.to_string());
        Ok(())
    }

    async fn patient_name(&mut self, patient_id: Uuid) -> DatabaseResult<Option<String>> {
        Ok(self.staged.patients.get(&patient_id).cloned())
    }

    async fn clinic_name(&mut self, clinic_id: Uuid) -> DatabaseResult<Option<String>> {
        Ok(self.staged.clinics.get(&clinic_id).cloned())
    }

    async fn staff_name(&mut self, staff_id: Uuid) -> DatabaseResult<Option<String>> {
        Ok(self.staged.staff.get(&staff_id).cloned())
    }

    async fn room_name(&mut self, room_id: Uuid) -> DatabaseResult<Option<String>> {
        Ok(self.staged.rooms.get(&room_id).cloned())
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()> {
        if self.staged.appointments.contains_key(&appointment.id) {
            return Err(duplicate("Appointment", appointment.id));
        }
        self.staged.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn get_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>> {
        Ok(self.staged.appointments.get(&appointment_id).cloned())
    }

    async fn lock_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>> {
        self.get_appointment(appointment_id).await
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()> {
        let slot = self
            .staged
            .appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| missing("Appointment", appointment.id))?;
        *slot = appointment.clone();
        Ok(())
    }

    async fn active_appointments_for_staff_day(
        &mut self,
        staff_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>> {
        let mut found: Vec<Appointment> = self
            .staged
            .appointments
            .values()
            .filter(|a| {
                a.staff_id == staff_id && a.clinic_id == clinic_id && a.service_day() == day && a.is_active()
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| a.appointment_time);
        Ok(found)
    }

    async fn appointments_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>> {
        let mut found: Vec<Appointment> = self
            .staged
            .appointments
            .values()
            .filter(|a| a.clinic_id == clinic_id && a.service_day() == day)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.appointment_time);
        Ok(found)
    }

    async fn next_queue_number(&mut self, clinic_id: Uuid, day: NaiveDate) -> DatabaseResult<i32> {
        let counter = self.staged.queue_counters.entry((clinic_id, day)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn raise_queue_counter(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        at_least: i32,
    ) -> DatabaseResult<()> {
        let counter = self.staged.queue_counters.entry((clinic_id, day)).or_insert(0);
        *counter = (*counter).max(at_least);
        Ok(())
    }

    async fn insert_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()> {
        if self.staged.queue_entries.contains_key(&entry.id) {
            return Err(duplicate("Queue entry", entry.id));
        }
        if self
            .staged
            .queue_entries
            .values()
            .any(|e| e.appointment_id == entry.appointment_id)
        {
            return Err(DatabaseError::ConstraintViolation(format!(
                "appointment {} is already queued",
                entry.appointment_id
            )));
        }
        self.staged.queue_entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>> {
        Ok(self.staged.queue_entries.get(&queue_id).cloned())
    }

    async fn lock_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>> {
        Ok(self.staged.queue_entries.get(&queue_id).cloned())
    }

    async fn lock_queue_entry_for_appointment(
        &mut self,
        appointment_id: Uuid,
    ) -> DatabaseResult<Option<QueueEntry>> {
        Ok(self
            .staged
            .queue_entries
            .values()
            .find(|e| e.appointment_id == appointment_id)
            .cloned())
    }

    async fn lock_next_waiting(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>> {
        Ok(self
            .staged
            .clinic_day_entries(clinic_id, day)
            .into_iter()
            .find(|e| e.status == QueueStatus::Waiting)
            .cloned())
    }

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()> {
        let slot = self
            .staged
            .queue_entries
            .get_mut(&entry.id)
            .ok_or_else(|| missing("Queue entry", entry.id))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn queue_entries_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueEntry>> {
        Ok(self
            .staged
            .clinic_day_entries(clinic_id, day)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn queue_ticket(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueTicket>> {
        Ok(self
            .staged
            .queue_entries
            .get(&queue_id)
            .and_then(|entry| self.staged.ticket_for(entry)))
    }

    async fn queue_tickets_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueTicket>> {
        let state = &self.staged;
        Ok(state
            .clinic_day_entries(clinic_id, day)
            .into_iter()
            .filter_map(|entry| state.ticket_for(entry))
            .collect())
    }

    async fn latest_queue_entry_for_patient(
        &mut self,
        patient_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>> {
        let state = &self.staged;
        Ok(state
            .queue_entries
            .values()
            .filter(|e| e.clinic_id == clinic_id && e.service_day == day)
            .filter(|e| {
                state
                    .appointments
                    .get(&e.appointment_id)
                    .map(|a| a.patient_id == patient_id)
                    .unwrap_or(false)
            })
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn count_waiting_ahead(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        queue_number: i32,
    ) -> DatabaseResult<i64> {
        Ok(self
            .staged
            .clinic_day_entries(clinic_id, day)
            .into_iter()
            .filter(|e| e.status == QueueStatus::Waiting && e.queue_number < queue_number)
            .count() as i64)
    }

    async fn insert_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()> {
        if self.staged.schedules.contains_key(&schedule.id) {
            return Err(duplicate("Schedule", schedule.id));
        }
        self.staged.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn lock_schedule(&mut self, schedule_id: Uuid) -> DatabaseResult<Option<StaffSchedule>> {
        Ok(self.staged.schedules.get(&schedule_id).cloned())
    }

    async fn update_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()> {
        let slot = self
            .staged
            .schedules
            .get_mut(&schedule.id)
            .ok_or_else(|| missing("Schedule", schedule.id))?;
        *slot = schedule.clone();
        Ok(())
    }

    async fn active_schedules_for_staff_day(
        &mut self,
        staff_id: Uuid,
        shift_date: NaiveDate,
    ) -> DatabaseResult<Vec<StaffSchedule>> {
        let mut found: Vec<StaffSchedule> = self
            .staged
            .schedules
            .values()
            .filter(|s| {
                s.staff_id == staff_id && s.shift_date == shift_date && s.status != ScheduleStatus::Inactive
            })
            .cloned()
            .collect();
        found.sort_by_key(|s| s.start_time);
        Ok(found)
    }

    async fn list_schedules(
        &mut self,
        staff_id: Option<Uuid>,
        shift_date: Option<NaiveDate>,
    ) -> DatabaseResult<Vec<StaffSchedule>> {
        let mut found: Vec<StaffSchedule> = self
            .staged
            .schedules
            .values()
            .filter(|s| staff_id.map(|id| s.staff_id == id).unwrap_or(true))
            .filter(|s| shift_date.map(|d| s.shift_date == d).unwrap_or(true))
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.shift_date, s.start_time));
        Ok(found)
    }

    async fn insert_bill(&mut self, bill: &Bill) -> DatabaseResult<()> {
        if self.staged.bills.contains_key(&bill.id) {
            return Err(duplicate("Bill", bill.id));
        }
        self.staged.bills.insert(bill.id, bill.clone());
        Ok(())
    }

    async fn insert_bill_item(&mut self, item: &BillItem) -> DatabaseResult<()> {
        if !self.staged.bills.contains_key(&item.bill_id) {
            return Err(missing("Bill", item.bill_id));
        }
        self.staged.bill_items.push(item.clone());
        Ok(())
    }

    async fn get_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>> {
        Ok(self.staged.bills.get(&bill_id).cloned())
    }

    async fn lock_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>> {
        self.get_bill(bill_id).await
    }

    async fn update_bill(&mut self, bill: &Bill) -> DatabaseResult<()> {
        let slot = self
            .staged
            .bills
            .get_mut(&bill.id)
            .ok_or_else(|| missing("Bill", bill.id))?;
        *slot = bill.clone();
        Ok(())
    }

    async fn bill_items(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<BillItem>> {
        Ok(self
            .staged
            .bill_items
            .iter()
            .filter(|item| item.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> DatabaseResult<()> {
        if !self.staged.bills.contains_key(&payment.bill_id) {
            return Err(missing("Bill", payment.bill_id));
        }
        self.staged.payments.push(payment.clone());
        Ok(())
    }

    async fn payments_for_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<Payment>> {
        Ok(self
            .staged
            .payments
            .iter()
            .filter(|payment| payment.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> DatabaseResult<()> {
        self.staged.notifications.push(notification.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        let MemoryUnitOfWork {
            mut guard,
            staged,
            fail_next_commit,
            ..
        } = *self;

        if fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!("Injected commit failure at {}", Utc::now());
            return Err(DatabaseError::QueryFailed("injected commit failure".to_string()));
        }

        staged.check_queue_numbers()?;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_models::appointment::AppointmentStatus;

    fn appointment(patient_id: Uuid, clinic_id: Uuid, staff_id: Uuid) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id,
            clinic_id,
            staff_id,
            room_id: None,
            appointment_time: now,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(appointment: &Appointment, queue_number: i32) -> QueueEntry {
        let now = Utc::now();
        QueueEntry {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            clinic_id: appointment.clinic_id,
            service_day: appointment.service_day(),
            queue_number,
            status: QueueStatus::Waiting,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let gateway = MemoryGateway::new();
        let patient = gateway.add_patient("Amina Yusuf").await;
        let clinic = gateway.add_clinic("Outpatient").await;
        let staff = gateway.add_staff("Dr. Okafor").await;

        {
            let mut uow = gateway.begin().await.unwrap();
            uow.insert_appointment(&appointment(patient, clinic, staff)).await.unwrap();
        }

        assert!(gateway.snapshot().await.appointments.is_empty());
    }

    #[tokio::test]
    async fn commit_publishes_staged_writes() {
        let gateway = MemoryGateway::new();
        let patient = gateway.add_patient("Amina Yusuf").await;
        let clinic = gateway.add_clinic("Outpatient").await;
        let staff = gateway.add_staff("Dr. Okafor").await;
        let appt = appointment(patient, clinic, staff);

        let mut uow = gateway.begin().await.unwrap();
        uow.insert_appointment(&appt).await.unwrap();
        let number = uow.next_queue_number(clinic, appt.service_day()).await.unwrap();
        uow.insert_queue_entry(&entry(&appt, number)).await.unwrap();
        uow.commit().await.unwrap();

        let state = gateway.snapshot().await;
        assert_eq!(state.appointments.len(), 1);
        assert_eq!(state.queue_counters.get(&(clinic, appt.service_day())), Some(&1));

        let mut uow = gateway.begin().await.unwrap();
        let tickets = uow.queue_tickets_for_clinic_day(clinic, appt.service_day()).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].patient_name, "Amina Yusuf");
        assert_eq!(tickets[0].staff_name, "Dr. Okafor");
    }

    #[tokio::test]
    async fn duplicate_queue_numbers_fail_at_commit() {
        let gateway = MemoryGateway::new();
        let clinic = gateway.add_clinic("Outpatient").await;
        let staff = gateway.add_staff("Dr. Okafor").await;
        let first = appointment(gateway.add_patient("A").await, clinic, staff);
        let second = appointment(gateway.add_patient("B").await, clinic, staff);

        let mut uow = gateway.begin().await.unwrap();
        uow.insert_appointment(&first).await.unwrap();
        uow.insert_appointment(&second).await.unwrap();
        uow.insert_queue_entry(&entry(&first, 1)).await.unwrap();
        uow.insert_queue_entry(&entry(&second, 1)).await.unwrap();

        let result = uow.commit().await;
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
        assert!(gateway.snapshot().await.queue_entries.is_empty());
    }

    #[tokio::test]
    async fn appointment_is_queued_at_most_once() {
        let gateway = MemoryGateway::new();
        let appt = appointment(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut uow = gateway.begin().await.unwrap();
        uow.insert_appointment(&appt).await.unwrap();
        uow.insert_queue_entry(&entry(&appt, 1)).await.unwrap();
        let result = uow.insert_queue_entry(&entry(&appt, 2)).await;
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn injected_commit_failure_leaves_state_untouched() {
        let gateway = MemoryGateway::new();
        gateway.fail_next_commit();

        let mut uow = gateway.begin().await.unwrap();
        uow.next_queue_number(Uuid::new_v4(), Utc::now().date_naive()).await.unwrap();
        assert!(uow.commit().await.is_err());
        assert!(gateway.snapshot().await.queue_counters.is_empty());

        let mut uow = gateway.begin().await.unwrap();
        uow.next_queue_number(Uuid::new_v4(), Utc::now().date_naive()).await.unwrap();
        assert!(uow.commit().await.is_ok());
    }

    #[tokio::test]
    async fn raised_counter_never_goes_backwards() {
        let gateway = MemoryGateway::new();
        let clinic = Uuid::new_v4();
        let day = Utc::now().date_naive();

        let mut uow = gateway.begin().await.unwrap();
        uow.raise_queue_counter(clinic, day, 7).await.unwrap();
        uow.raise_queue_counter(clinic, day, 3).await.unwrap();
        assert_eq!(uow.next_queue_number(clinic, day).await.unwrap(), 8);
    }
}
