use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::queue::{QueueStatus, QueueTicket};

/// `?service_day=YYYY-MM-DD`; absent means today (UTC).
#[derive(Debug, Default, Deserialize)]
pub struct ServiceDayQuery {
    pub service_day: Option<NaiveDate>,
}

impl ServiceDayQuery {
    pub fn resolve(&self) -> NaiveDate {
        self.service_day.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNextResponse {
    pub patient: Option<QueueTicket>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub total: usize,
    pub waiting: usize,
    pub in_service: usize,
    pub completed: usize,
    /// Number the next call-next would pick.
    pub next_waiting_number: Option<i32>,
}

impl QueueStatistics {
    pub fn from_tickets(tickets: &[QueueTicket]) -> Self {
        let count = |status: QueueStatus| tickets.iter().filter(|t| t.status == status).count();

        Self {
            total: tickets.len(),
            waiting: count(QueueStatus::Waiting),
            in_service: count(QueueStatus::InService),
            completed: count(QueueStatus::Completed),
            next_waiting_number: tickets
                .iter()
                .filter(|t| t.status == QueueStatus::Waiting)
                .map(|t| t.queue_number)
                .min(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicQueueResponse {
    pub clinic_id: Uuid,
    pub service_day: NaiveDate,
    pub queue: Vec<QueueTicket>,
    pub statistics: QueueStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePosition {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub service_day: NaiveDate,
    pub queue_id: Uuid,
    pub queue_number: i32,
    pub status: QueueStatus,
    /// Waiting entries with a smaller number.
    pub people_ahead: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQueueStatusRequest {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueNumberUpdate {
    pub queue_id: Uuid,
    pub queue_number: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    #[serde(rename = "queueUpdates", alias = "queue_updates")]
    pub queue_updates: Vec<QueueNumberUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub appointment_id: Uuid,
}
