//! Runs only when `DATABASE_URL` points at a scratch PostgreSQL database.

use std::sync::Arc;

use chrono::{Days, NaiveDate, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use appointment_cell::{AppointmentBookingService, CreateAppointmentRequest};
use shared_config::AppConfig;
use shared_database::{PgGateway, StorageGateway};
use waiting_queue_cell::{QueueNumberUpdate, QueueSequencer};

struct Fixture {
    booking: Arc<AppointmentBookingService>,
    queue: Arc<QueueSequencer>,
    clinic_a: Uuid,
    clinic_b: Uuid,
    staff_1: Uuid,
    staff_2: Uuid,
    patient_id: Uuid,
}

async fn seed(pool: &PgPool, table: &str, id: Uuid) {
    let sql = match table {
        "clinics" => "INSERT INTO clinics (id, name) VALUES ($1, 'Lock order clinic')",
        "staff" => "INSERT INTO staff (id, first_name, last_name, role_id) VALUES ($1, 'Lock', 'Order', 3)",
        _ => "INSERT INTO patients (id, first_name, last_name) VALUES ($1, 'Lock', 'Order')",
    };
    sqlx::query(sql).bind(id).execute(pool).await.unwrap();
}

async fn fixture() -> Option<Fixture> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL lock order test");
        return None;
    };

    let config = AppConfig {
        database_url: database_url.clone(),
        ..AppConfig::default()
    };
    let gateway = PgGateway::connect(&config).await.unwrap();
    gateway.run_migrations().await.unwrap();

    let pool = PgPoolOptions::new().max_connections(2).connect(&database_url).await.unwrap();
    let fixture_ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    seed(&pool, "clinics", fixture_ids[0]).await;
    seed(&pool, "clinics", fixture_ids[1]).await;
    seed(&pool, "staff", fixture_ids[2]).await;
    seed(&pool, "staff", fixture_ids[3]).await;
    seed(&pool, "patients", fixture_ids[4]).await;

    let gateway: Arc<dyn StorageGateway> = Arc::new(gateway);
    Some(Fixture {
        booking: Arc::new(AppointmentBookingService::new(gateway.clone(), 20)),
        queue: Arc::new(QueueSequencer::new(gateway)),
        clinic_a: fixture_ids[0],
        clinic_b: fixture_ids[1],
        staff_1: fixture_ids[2],
        staff_2: fixture_ids[3],
        patient_id: fixture_ids[4],
    })
}

impl Fixture {
    fn visit(&self, clinic_id: Uuid, staff_id: Uuid, day: NaiveDate, hour: u32) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: Some(self.patient_id),
            clinic_id: Some(clinic_id),
            staff_id: Some(staff_id),
            room_id: None,
            appointment_time: Some(Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_clinic_orders_do_not_deadlock() {
    let Some(fx) = fixture().await else {
        return;
    };
    let first_day = NaiveDate::from_ymd_opt(2031, 3, 3).unwrap();

    for round in 0..20u64 {
        let day = first_day.checked_add_days(Days::new(round)).unwrap();

        let forward = vec![
            fx.visit(fx.clinic_a, fx.staff_1, day, 8),
            fx.visit(fx.clinic_b, fx.staff_1, day, 10),
        ];
        let backward = vec![
            fx.visit(fx.clinic_b, fx.staff_2, day, 8),
            fx.visit(fx.clinic_a, fx.staff_2, day, 10),
        ];

        let (booking_1, booking_2) = (fx.booking.clone(), fx.booking.clone());
        let one = tokio::spawn(async move { booking_1.bulk_create_appointments(&forward).await });
        let two = tokio::spawn(async move { booking_2.bulk_create_appointments(&backward).await });
        assert_eq!(one.await.unwrap().unwrap().imported_count, 2);
        assert_eq!(two.await.unwrap().unwrap().imported_count, 2);

        let a = fx.queue.get_clinic_queue(fx.clinic_a, day).await.unwrap();
        let b = fx.queue.get_clinic_queue(fx.clinic_b, day).await.unwrap();
        let swap = |tickets: &[shared_models::queue::QueueTicket]| {
            vec![
                QueueNumberUpdate {
                    queue_id: tickets[0].queue_id,
                    queue_number: tickets[1].queue_number,
                },
                QueueNumberUpdate {
                    queue_id: tickets[1].queue_id,
                    queue_number: tickets[0].queue_number,
                },
            ]
        };
        let a_then_b: Vec<QueueNumberUpdate> = swap(&a.queue[..]).into_iter().chain(swap(&b.queue[..])).collect();
        let b_then_a: Vec<QueueNumberUpdate> = swap(&b.queue[..]).into_iter().chain(swap(&a.queue[..])).collect();

        let (queue_1, queue_2) = (fx.queue.clone(), fx.queue.clone());
        let one = tokio::spawn(async move { queue_1.reorder(&a_then_b).await });
        let two = tokio::spawn(async move { queue_2.reorder(&b_then_a).await });
        assert_eq!(one.await.unwrap().unwrap().len(), 4);
        assert_eq!(two.await.unwrap().unwrap().len(), 4);
    }
}
