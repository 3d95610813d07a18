use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::appointment::Appointment;
use shared_models::billing::{Bill, BillItem, Payment};
use shared_models::notification::Notification;
use shared_models::queue::{QueueEntry, QueueStatus, QueueTicket};
use shared_models::schedule::StaffSchedule;

use crate::error::{DatabaseError, DatabaseResult};
use crate::gateway::{day_bounds, StorageGateway, UnitOfWork};

/// PostgreSQL-backed gateway.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub async fn connect(config: &AppConfig) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        info!("Database connection pool created ({} max connections)", config.database_max_connections);

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> DatabaseResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for PgGateway {
    async fn begin(&self) -> DatabaseResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> DatabaseResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            warn!("Database health check failed: {}", e);
            DatabaseError::ConnectionFailed(e.to_string())
        })?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

// ==============================================================================
// ROW MAPPING
// ==============================================================================

const APPOINTMENT_COLUMNS: &str = "id, patient_id, clinic_id, staff_id, room_id, appointment_time, \
     status, cancellation_reason, created_at, updated_at";

const QUEUE_COLUMNS: &str = "id, appointment_id, clinic_id, service_day, queue_number, status, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, staff_id, clinic_id, room_id, shift_date, start_time, end_time, \
     status, created_at, updated_at";

const BILL_COLUMNS: &str = "id, patient_id, total_amount, discount_percent, discount_amount, \
     final_amount, paid_amount, status, created_at, updated_at";

const TICKET_SELECT: &str = "SELECT q.id AS queue_id, q.queue_number, q.status, q.service_day, \
     a.id AS appointment_id, a.appointment_time, \
     c.id AS clinic_id, c.name AS clinic_name, \
     p.id AS patient_id, p.first_name || ' ' || p.last_name AS patient_name, \
     s.id AS staff_id, s.first_name || ' ' || s.last_name AS staff_name, \
     r.id AS room_id, r.name AS room_name \
     FROM waiting_queue q \
     JOIN appointments a ON a.id = q.appointment_id \
     JOIN clinics c ON c.id = q.clinic_id \
     JOIN patients p ON p.id = a.patient_id \
     JOIN staff s ON s.id = a.staff_id \
     LEFT JOIN rooms r ON r.id = a.room_id";

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    clinic_id: Uuid,
    staff_id: Uuid,
    room_id: Option<Uuid>,
    appointment_time: DateTime<Utc>,
    status: String,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DatabaseError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            patient_id: row.patient_id,
            clinic_id: row.clinic_id,
            staff_id: row.staff_id,
            room_id: row.room_id,
            appointment_time: row.appointment_time,
            status: row.status.parse()?,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: Uuid,
    appointment_id: Uuid,
    clinic_id: Uuid,
    service_day: NaiveDate,
    queue_number: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = DatabaseError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        Ok(QueueEntry {
            id: row.id,
            appointment_id: row.appointment_id,
            clinic_id: row.clinic_id,
            service_day: row.service_day,
            queue_number: row.queue_number,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    queue_id: Uuid,
    queue_number: i32,
    status: String,
    service_day: NaiveDate,
    appointment_id: Uuid,
    appointment_time: DateTime<Utc>,
    clinic_id: Uuid,
    clinic_name: String,
    patient_id: Uuid,
    patient_name: String,
    staff_id: Uuid,
    staff_name: String,
    room_id: Option<Uuid>,
    room_name: Option<String>,
}

impl TryFrom<TicketRow> for QueueTicket {
    type Error = DatabaseError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(QueueTicket {
            queue_id: row.queue_id,
            queue_number: row.queue_number,
            status: row.status.parse()?,
            service_day: row.service_day,
            appointment_id: row.appointment_id,
            appointment_time: row.appointment_time,
            clinic_id: row.clinic_id,
            clinic_name: row.clinic_name,
            patient_id: row.patient_id,
            patient_name: row.patient_name,
            staff_id: row.staff_id,
            staff_name: row.staff_name,
            room_id: row.room_id,
            room_name: row.room_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    staff_id: Uuid,
    clinic_id: Uuid,
    room_id: Option<Uuid>,
    shift_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for StaffSchedule {
    type Error = DatabaseError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(StaffSchedule {
            id: row.id,
            staff_id: row.staff_id,
            clinic_id: row.clinic_id,
            room_id: row.room_id,
            shift_date: row.shift_date,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BillRow {
    id: Uuid,
    patient_id: Uuid,
    total_amount: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    final_amount: Decimal,
    paid_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BillRow> for Bill {
    type Error = DatabaseError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        Ok(Bill {
            id: row.id,
            patient_id: row.patient_id,
            total_amount: row.total_amount,
            discount_percent: row.discount_percent,
            discount_amount: row.discount_amount,
            final_amount: row.final_amount,
            paid_amount: row.paid_amount,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BillItemRow {
    id: Uuid,
    bill_id: Uuid,
    description: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl From<BillItemRow> for BillItem {
    fn from(row: BillItemRow) -> Self {
        BillItem {
            id: row.id,
            bill_id: row.bill_id,
            description: row.description,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    bill_id: Uuid,
    amount: Decimal,
    payment_method: String,
    payment_reference: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            bill_id: row.bill_id,
            amount: row.amount,
            payment_method: row.payment_method.parse()?,
            payment_reference: row.payment_reference,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> DatabaseResult<Vec<T>>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn expect_one_row(affected: u64, what: &str, id: Uuid) -> DatabaseResult<()> {
    if affected == 0 {
        return Err(DatabaseError::QueryFailed(format!("{} {} does not exist", what, id)));
    }
    Ok(())
}

// ==============================================================================
// UNIT OF WORK
// ==============================================================================

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_key(&mut self, key: &str) -> DatabaseResult<()> {
        debug!("Acquiring advisory lock {}", key);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn patient_name(&mut self, patient_id: Uuid) -> DatabaseResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT first_name || ' ' || last_name FROM patients WHERE id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(name)
    }

    async fn clinic_name(&mut self, clinic_id: Uuid) -> DatabaseResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM clinics WHERE id = $1")
            .bind(clinic_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(name)
    }

    async fn staff_name(&mut self, staff_id: Uuid) -> DatabaseResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT first_name || ' ' || last_name FROM staff WHERE id = $1",
        )
        .bind(staff_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(name)
    }

    async fn room_name(&mut self, room_id: Uuid) -> DatabaseResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(name)
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO appointments (id, patient_id, clinic_id, staff_id, room_id, appointment_time, \
             status, cancellation_reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(appointment.id)
        .bind(appointment.patient_id)
        .bind(appointment.clinic_id)
        .bind(appointment.staff_id)
        .bind(appointment.room_id)
        .bind(appointment.appointment_time)
        .bind(appointment.status.as_str())
        .bind(appointment.cancellation_reason.as_deref())
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>> {
        let sql = format!("SELECT {} FROM appointments WHERE id = $1", APPOINTMENT_COLUMNS);
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn lock_appointment(&mut self, appointment_id: Uuid) -> DatabaseResult<Option<Appointment>> {
        let sql = format!("SELECT {} FROM appointments WHERE id = $1 FOR UPDATE", APPOINTMENT_COLUMNS);
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE appointments SET staff_id = $2, room_id = $3, appointment_time = $4, status = $5, \
             cancellation_reason = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(appointment.id)
        .bind(appointment.staff_id)
        .bind(appointment.room_id)
        .bind(appointment.appointment_time)
        .bind(appointment.status.as_str())
        .bind(appointment.cancellation_reason.as_deref())
        .bind(appointment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "Appointment", appointment.id)
    }

    async fn active_appointments_for_staff_day(
        &mut self,
        staff_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>> {
        let (start, end) = day_bounds(day);
        let sql = format!(
            "SELECT {} FROM appointments WHERE staff_id = $1 AND clinic_id = $2 \
             AND appointment_time >= $3 AND appointment_time < $4 \
             AND status IN ('Scheduled', 'In-Progress') ORDER BY appointment_time",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(staff_id)
            .bind(clinic_id)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn appointments_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<Appointment>> {
        let (start, end) = day_bounds(day);
        let sql = format!(
            "SELECT {} FROM appointments WHERE clinic_id = $1 \
             AND appointment_time >= $2 AND appointment_time < $3 ORDER BY appointment_time",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(clinic_id)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn next_queue_number(&mut self, clinic_id: Uuid, day: NaiveDate) -> DatabaseResult<i32> {
        let number = sqlx::query_scalar::<_, i32>(
            "INSERT INTO queue_counters (clinic_id, service_day, last_number) VALUES ($1, $2, 1) \
             ON CONFLICT (clinic_id, service_day) \
             DO UPDATE SET last_number = queue_counters.last_number + 1 \
             RETURNING last_number",
        )
        .bind(clinic_id)
        .bind(day)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(number)
    }

    async fn raise_queue_counter(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        at_least: i32,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO queue_counters (clinic_id, service_day, last_number) VALUES ($1, $2, $3) \
             ON CONFLICT (clinic_id, service_day) \
             DO UPDATE SET last_number = GREATEST(queue_counters.last_number, EXCLUDED.last_number)",
        )
        .bind(clinic_id)
        .bind(day)
        .bind(at_least)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO waiting_queue (id, appointment_id, clinic_id, service_day, queue_number, \
             status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.appointment_id)
        .bind(entry.clinic_id)
        .bind(entry.service_day)
        .bind(entry.queue_number)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>> {
        let sql = format!("SELECT {} FROM waiting_queue WHERE id = $1", QUEUE_COLUMNS);
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(queue_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn lock_queue_entry(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueEntry>> {
        let sql = format!("SELECT {} FROM waiting_queue WHERE id = $1 FOR UPDATE", QUEUE_COLUMNS);
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(queue_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn lock_queue_entry_for_appointment(
        &mut self,
        appointment_id: Uuid,
    ) -> DatabaseResult<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM waiting_queue WHERE appointment_id = $1 FOR UPDATE",
            QUEUE_COLUMNS
        );
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn lock_next_waiting(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM waiting_queue WHERE clinic_id = $1 AND service_day = $2 AND status = $3 \
             ORDER BY queue_number LIMIT 1 FOR UPDATE SKIP LOCKED",
            QUEUE_COLUMNS
        );
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(clinic_id)
            .bind(day)
            .bind(QueueStatus::Waiting.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE waiting_queue SET queue_number = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(entry.id)
        .bind(entry.queue_number)
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "Queue entry", entry.id)
    }

    async fn queue_entries_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM waiting_queue WHERE clinic_id = $1 AND service_day = $2 ORDER BY queue_number",
            QUEUE_COLUMNS
        );
        let rows = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(clinic_id)
            .bind(day)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn queue_ticket(&mut self, queue_id: Uuid) -> DatabaseResult<Option<QueueTicket>> {
        let sql = format!("{} WHERE q.id = $1", TICKET_SELECT);
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(queue_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(QueueTicket::try_from).transpose()
    }

    async fn queue_tickets_for_clinic_day(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Vec<QueueTicket>> {
        let sql = format!(
            "{} WHERE q.clinic_id = $1 AND q.service_day = $2 ORDER BY q.queue_number",
            TICKET_SELECT
        );
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(clinic_id)
            .bind(day)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn latest_queue_entry_for_patient(
        &mut self,
        patient_id: Uuid,
        clinic_id: Uuid,
        day: NaiveDate,
    ) -> DatabaseResult<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, QueueRow>(
            "SELECT q.id, q.appointment_id, q.clinic_id, q.service_day, q.queue_number, q.status, \
             q.created_at, q.updated_at \
             FROM waiting_queue q JOIN appointments a ON a.id = q.appointment_id \
             WHERE a.patient_id = $1 AND q.clinic_id = $2 AND q.service_day = $3 \
             ORDER BY q.created_at DESC LIMIT 1",
        )
        .bind(patient_id)
        .bind(clinic_id)
        .bind(day)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn count_waiting_ahead(
        &mut self,
        clinic_id: Uuid,
        day: NaiveDate,
        queue_number: i32,
    ) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM waiting_queue WHERE clinic_id = $1 AND service_day = $2 \
             AND status = $3 AND queue_number < $4",
        )
        .bind(clinic_id)
        .bind(day)
        .bind(QueueStatus::Waiting.as_str())
        .bind(queue_number)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO staff_schedules (id, staff_id, clinic_id, room_id, shift_date, start_time, \
             end_time, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(schedule.id)
        .bind(schedule.staff_id)
        .bind(schedule.clinic_id)
        .bind(schedule.room_id)
        .bind(schedule.shift_date)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.status.as_str())
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_schedule(&mut self, schedule_id: Uuid) -> DatabaseResult<Option<StaffSchedule>> {
        let sql = format!("SELECT {} FROM staff_schedules WHERE id = $1 FOR UPDATE", SCHEDULE_COLUMNS);
        let row = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(schedule_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(StaffSchedule::try_from).transpose()
    }

    async fn update_schedule(&mut self, schedule: &StaffSchedule) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE staff_schedules SET clinic_id = $2, room_id = $3, shift_date = $4, start_time = $5, \
             end_time = $6, status = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(schedule.id)
        .bind(schedule.clinic_id)
        .bind(schedule.room_id)
        .bind(schedule.shift_date)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.status.as_str())
        .bind(schedule.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "Schedule", schedule.id)
    }

    async fn active_schedules_for_staff_day(
        &mut self,
        staff_id: Uuid,
        shift_date: NaiveDate,
    ) -> DatabaseResult<Vec<StaffSchedule>> {
        let sql = format!(
            "SELECT {} FROM staff_schedules WHERE staff_id = $1 AND shift_date = $2 \
             AND status <> 'Inactive' ORDER BY start_time",
            SCHEDULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(staff_id)
            .bind(shift_date)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn list_schedules(
        &mut self,
        staff_id: Option<Uuid>,
        shift_date: Option<NaiveDate>,
    ) -> DatabaseResult<Vec<StaffSchedule>> {
        let sql = format!(
            "SELECT {} FROM staff_schedules \
             WHERE ($1::uuid IS NULL OR staff_id = $1) AND ($2::date IS NULL OR shift_date = $2) \
             ORDER BY shift_date, start_time",
            SCHEDULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(staff_id)
            .bind(shift_date)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn insert_bill(&mut self, bill: &Bill) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO bills (id, patient_id, total_amount, discount_percent, discount_amount, \
             final_amount, paid_amount, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(bill.id)
        .bind(bill.patient_id)
        .bind(bill.total_amount)
        .bind(bill.discount_percent)
        .bind(bill.discount_amount)
        .bind(bill.final_amount)
        .bind(bill.paid_amount)
        .bind(bill.status.as_str())
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_bill_item(&mut self, item: &BillItem) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO bill_items (id, bill_id, description, quantity, unit_price, line_total) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id)
        .bind(item.bill_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.line_total)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>> {
        let sql = format!("SELECT {} FROM bills WHERE id = $1", BILL_COLUMNS);
        let row = sqlx::query_as::<_, BillRow>(&sql)
            .bind(bill_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Bill::try_from).transpose()
    }

    async fn lock_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Option<Bill>> {
        let sql = format!("SELECT {} FROM bills WHERE id = $1 FOR UPDATE", BILL_COLUMNS);
        let row = sqlx::query_as::<_, BillRow>(&sql)
            .bind(bill_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Bill::try_from).transpose()
    }

    async fn update_bill(&mut self, bill: &Bill) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE bills SET paid_amount = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(bill.id)
        .bind(bill.paid_amount)
        .bind(bill.status.as_str())
        .bind(bill.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "Bill", bill.id)
    }

    async fn bill_items(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<BillItem>> {
        let rows = sqlx::query_as::<_, BillItemRow>(
            "SELECT id, bill_id, description, quantity, unit_price, line_total \
             FROM bill_items WHERE bill_id = $1 ORDER BY line_no",
        )
        .bind(bill_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(BillItem::from).collect())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, bill_id, amount, payment_method, payment_reference, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.id)
        .bind(payment.bill_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(payment.payment_reference.as_deref())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn payments_for_bill(&mut self, bill_id: Uuid) -> DatabaseResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, bill_id, amount, payment_method, payment_reference, status, created_at \
             FROM payments WHERE bill_id = $1 ORDER BY created_at",
        )
        .bind(bill_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn insert_notification(&mut self, notification: &Notification) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, title, message, is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(notification.id)
        .bind(notification.recipient_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
