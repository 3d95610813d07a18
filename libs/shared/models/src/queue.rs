use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UnknownStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub service_day: NaiveDate,
    pub queue_number: i32,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Waiting,
    #[serde(rename = "In-Service", alias = "in_service", alias = "InService")]
    InService,
    Completed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "Waiting",
            QueueStatus::InService => "In-Service",
            QueueStatus::Completed => "Completed",
        }
    }

    /// Forward-only: an entry never returns to Waiting once it has advanced.
    pub fn allowed_transitions(&self) -> &'static [QueueStatus] {
        match self {
            QueueStatus::Waiting => &[QueueStatus::InService, QueueStatus::Completed],
            QueueStatus::InService => &[QueueStatus::Completed],
            QueueStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, target: &QueueStatus) -> bool {
        self.allowed_transitions().contains(target)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(QueueStatus::Waiting),
            "In-Service" => Ok(QueueStatus::InService),
            "Completed" => Ok(QueueStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A queue entry with the patient/staff/room context shown on the clinic board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTicket {
    pub queue_id: Uuid,
    pub queue_number: i32,
    pub status: QueueStatus,
    pub service_day: NaiveDate,
    pub appointment_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub clinic_id: Uuid,
    pub clinic_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub staff_id: Uuid,
    pub staff_name: String,
    pub room_id: Option<Uuid>,
    pub room_name: Option<String>,
}
