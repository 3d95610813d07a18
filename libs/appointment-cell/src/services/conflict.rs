use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::UnitOfWork;
use shared_models::appointment::Appointment;

use crate::models::{AppointmentError, NewAppointment};

/// True when two start times are closer than `window`. Exactly `window` apart is allowed.
pub fn within_conflict_window(a: DateTime<Utc>, b: DateTime<Utc>, window: Duration) -> bool {
    let gap = if a >= b { a - b } else { b - a };
    gap < window
}

/// Fixed-width collision check for appointments of one staff member at one clinic on one day.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetectionService {
    window: Duration,
}

impl ConflictDetectionService {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
        }
    }

    pub fn window_minutes(&self) -> i64 {
        self.window.num_minutes()
    }

    /// Active appointments that collide with `proposed_time`, skipping `exclude`.
    pub async fn find_conflicts(
        &self,
        uow: &mut dyn UnitOfWork,
        staff_id: Uuid,
        clinic_id: Uuid,
        proposed_time: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for staff {} at clinic {} around {}",
            staff_id, clinic_id, proposed_time
        );

        let same_day = uow
            .active_appointments_for_staff_day(staff_id, clinic_id, proposed_time.date_naive())
            .await?;

        let conflicts: Vec<Appointment> = same_day
            .into_iter()
            .filter(|existing| Some(existing.id) != exclude)
            .filter(|existing| within_conflict_window(existing.appointment_time, proposed_time, self.window))
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for staff {} at {}: {} appointment(s) within {} minutes",
                staff_id,
                proposed_time,
                conflicts.len(),
                self.window_minutes()
            );
        }

        Ok(conflicts)
    }

    pub async fn has_appointment_conflict(
        &self,
        uow: &mut dyn UnitOfWork,
        staff_id: Uuid,
        clinic_id: Uuid,
        proposed_time: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let conflicts = self
            .find_conflicts(uow, staff_id, clinic_id, proposed_time, exclude)
            .await?;
        Ok(!conflicts.is_empty())
    }

    /// Index of the earlier batch item `candidate` collides with, if any.
    pub fn conflicting_batch_item(&self, candidate: &NewAppointment, earlier: &[NewAppointment]) -> Option<usize> {
        earlier.iter().position(|other| {
            other.staff_id == candidate.staff_id
                && other.clinic_id == candidate.clinic_id
                && other.service_day() == candidate.service_day()
                && within_conflict_window(other.appointment_time, candidate.appointment_time, self.window)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, hour, minute, 0).unwrap()
    }

    #[test]
    fn window_is_exclusive_at_its_edge() {
        let window = Duration::minutes(20);
        assert!(within_conflict_window(at(9, 0), at(9, 15), window));
        assert!(within_conflict_window(at(9, 15), at(9, 0), window));
        assert!(within_conflict_window(at(9, 0), at(9, 19), window));
        assert!(!within_conflict_window(at(9, 0), at(9, 20), window));
        assert!(!within_conflict_window(at(9, 40), at(9, 20), window));
    }

    #[test]
    fn identical_times_collide() {
        assert!(within_conflict_window(at(10, 0), at(10, 0), Duration::minutes(20)));
    }

    #[test]
    fn batch_items_only_collide_for_same_staff_and_clinic() {
        let detector = ConflictDetectionService::new(20);
        let staff = Uuid::new_v4();
        let clinic = Uuid::new_v4();
        let item = |staff_id, time| NewAppointment {
            patient_id: Uuid::new_v4(),
            clinic_id: clinic,
            staff_id,
            room_id: None,
            appointment_time: time,
        };

        let earlier = vec![item(staff, at(9, 0)), item(Uuid::new_v4(), at(10, 0))];
        assert_eq!(detector.conflicting_batch_item(&item(staff, at(9, 10)), &earlier), Some(0));
        assert_eq!(detector.conflicting_batch_item(&item(staff, at(10, 5)), &earlier), None);
        assert_eq!(detector.conflicting_batch_item(&item(staff, at(9, 20)), &earlier), None);
    }
}
