use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_models::appointment::Appointment;
use shared_models::billing::{Bill, BillItem, Payment};
use shared_models::notification::Notification;
use shared_models::queue::{QueueEntry, QueueTicket};
use shared_models::schedule::StaffSchedule;

use crate::error::DatabaseResult;

/// Entry point to the relational store. Every read and write happens inside a
/// [`UnitOfWork`] obtained from [`StorageGateway::begin`].
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn begin(&self) -> DatabaseResult<Box<dyn UnitOfWork>>;

    async fn ping(&self) -> DatabaseResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// One transaction. Writes become visible only after [`UnitOfWork::commit`];
/// dropping the unit of work without committing discards them.
///
/// `lock_*` reads hold an exclusive row lock until the transaction ends.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Transaction-scoped exclusive lock on an arbitrary key, e.g. a staff-day.
    async fn lock_key(&mut self, key: &str) -> DatabaseResult<()>;

    // Reference directory

    async fn patient_name(&mut self, patient_id: Uuid) -> DatabaseResult<Option<String>>;

    async fn clinic_name(&mut self, clinic_id: Uuid) -> DatabaseResult<Option<String>>;

    async fn staff_name(&mut self, staff_id: Uuid) -> DatabaseResult<Option<String>>;

    async fn room_name(&mut self, room_id: Uuid) -> DatabaseResult<Option<String>>;

    // Appointments

    async fn insert_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()>;

    async fn get_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>>;

    async fn lock_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>>;

    async fn update_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()>;

    /// Scheduled and In-Progress appointments of a staff member at a clinic on one UTC day.
    async fn active_appointments_for_staff_day(
        &mut self,
        staff_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>>;

    async fn appointments_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>>;

    // Waiting queue

    /// Atomically advances the clinic-day counter and returns the new number (first call yields 1).
    async fn next_queue_number(&mut self, clinic_id: Uuid, day: NaiveDate) -> DatabaseResult<i32>;

    /// Raises the clinic-day counter so later enqueues never reuse `at_least`.
    async fn raise_queue_counter(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        at_least: i32,
    ) -> DatabaseResult<()>;

    async fn insert_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()>;

    async fn get_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>>;

    async fn lock_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>>;

    async fn lock_queue_entry_for_appointment(
        &mut self,
        appointment_id: Uuid,
    ) -> DatabaseResult<Option<QueueEntry>>;

    /// Lowest-numbered Waiting entry of the clinic-day, skipping rows other transactions hold.
    async fn lock_next_waiting(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>>;

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()>;

    /// Entries of a clinic-day ordered by queue number.
    async fn queue_entries_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueEntry>>;

    async fn queue_ticket(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueTicket>>;

    async fn queue_tickets_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueTicket>>;

    async fn latest_queue_entry_for_patient(
        &mut self,
        patient_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>>;

    async fn count_waiting_ahead(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        queue_number: i32,
    ) -> DatabaseResult<i64>;

    // Staff schedules

    async fn insert_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()>;

    async fn lock_schedule(&mut self, schedule_id: Uuid) -> DatabaseResult<Option<StaffSchedule>>;

    async fn update_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()>;

    async fn active_schedules_for_staff_day(
        &mut self,
        staff_id: Uuid,
        shift_date: NaiveDate,
    ) -> DatabaseResult<Vec<StaffSchedule>>;

    async fn list_schedules(
        &mut self,
        staff_id: Option<Uuid>,
        shift_date: Option<NaiveDate>,
    ) -> DatabaseResult<Vec<StaffSchedule>>;

    // Billing

    async fn insert_bill(&mut self, bill: &Bill) -> DatabaseResult<()>;

    async fn insert_bill_item(&mut self, item: &BillItem) -> DatabaseResult<()>;

    async fn get_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>>;

    async fn lock_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>>;

    async fn update_bill(&mut self, bill: &Bill) -> DatabaseResult<()>;

    async fn bill_items(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<BillItem>>;

    async fn insert_payment(&mut self, payment: &Payment) -> DatabaseResult<()>;

    async fn payments_for_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<Payment>>;

    // Notifications

    async fn insert_notification(&mut self, notification: &Notification) -> DatabaseResult<()>;

    async fn commit(self: Box<Self>) -> DatabaseResult<()>;

    async fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}

/// `[start, end)` of a UTC calendar day.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::default()).and_utc();
    (start, start + Duration::days(1))
}

/// Advisory-lock key serializing writes for one staff member on one day.
pub fn staff_day_key(staff_id: Uuid, day: NaiveDate) -> String {
    format!("staff-day:{}:{}", staff_id, day)
}

/// Advisory-lock key serializing queue writes for one clinic-day.
pub fn clinic_day_key(clinic_id: Uuid, day: NaiveDate) -> String {
    format!("clinic-day:{}:{}", clinic_id, day)
}
