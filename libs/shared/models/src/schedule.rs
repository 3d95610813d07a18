use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UnknownStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffSchedule {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub clinic_id: Uuid,
    pub room_id: Option<Uuid>,
    pub shift_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleStatus {
    #[serde(alias = "Scheduled", alias = "active")]
    Active,
    #[serde(alias = "inactive")]
    Inactive,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "Active",
            ScheduleStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" | "Scheduled" => Ok(ScheduleStatus::Active),
            "Inactive" => Ok(ScheduleStatus::Inactive),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
