use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::UnitOfWork;
use shared_models::schedule::StaffSchedule;

use crate::models::{NewShift, ScheduleError};

/// Half-open overlap of `[a_start, a_end)` and `[b_start, b_end)`. Touching shifts do not overlap.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Overlap checks for shifts of one staff member on one date.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleConflictService;

impl ScheduleConflictService {
    pub fn new() -> Self {
        Self
    }

    /// Active schedules overlapping the proposed shift, skipping `exclude`.
    pub async fn find_conflicts(
        &self,
        uow: &mut dyn UnitOfWork,
        staff_id: Uuid,
        shift_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<Vec<StaffSchedule>, ScheduleError> {
        debug!(
            "Checking shift overlap for staff {} on {} ({}-{})",
            staff_id, shift_date, start_time, end_time
        );

        let conflicts: Vec<StaffSchedule> = uow
            .active_schedules_for_staff_day(staff_id, shift_date)
            .await?
            .into_iter()
            .filter(|existing| Some(existing.id) != exclude)
            .filter(|existing| intervals_overlap(existing.start_time, existing.end_time, start_time, end_time))
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Shift {}-{} on {} overlaps {} schedule(s) of staff {}",
                start_time,
                end_time,
                shift_date,
                conflicts.len(),
                staff_id
            );
        }

        Ok(conflicts)
    }

    pub async fn has_schedule_conflict(
        &self,
        uow: &mut dyn UnitOfWork,
        staff_id: Uuid,
        shift_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<bool, ScheduleError> {
        let conflicts = self
            .find_conflicts(uow, staff_id, shift_date, start_time, end_time, exclude)
            .await?;
        Ok(!conflicts.is_empty())
    }

    /// Indices of earlier batch items that overlap `candidate`.
    pub fn overlapping_batch_items(&self, candidate: &NewShift, earlier: &[NewShift]) -> Vec<usize> {
        earlier
            .iter()
            .enumerate()
            .filter(|(_, other)| {
                other.staff_id == candidate.staff_id
                    && other.shift_date == candidate.shift_date
                    && intervals_overlap(other.start_time, other.end_time, candidate.start_time, candidate.end_time)
            })
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn every_overlap_orientation_is_detected() {
        // new inside existing
        assert!(intervals_overlap(t(8, 0), t(16, 0), t(9, 0), t(10, 0)));
        // existing inside new
        assert!(intervals_overlap(t(9, 0), t(10, 0), t(8, 0), t(16, 0)));
        // partial on either side
        assert!(intervals_overlap(t(8, 0), t(12, 0), t(11, 0), t(14, 0)));
        assert!(intervals_overlap(t(11, 0), t(14, 0), t(8, 0), t(12, 0)));
        // identical
        assert!(intervals_overlap(t(8, 0), t(12, 0), t(8, 0), t(12, 0)));
    }

    #[test]
    fn adjacent_and_disjoint_shifts_do_not_overlap() {
        assert!(!intervals_overlap(t(8, 0), t(12, 0), t(12, 0), t(16, 0)));
        assert!(!intervals_overlap(t(12, 0), t(16, 0), t(8, 0), t(12, 0)));
        assert!(!intervals_overlap(t(8, 0), t(9, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn batch_overlap_is_scoped_to_staff_and_date() {
        let service = ScheduleConflictService::new();
        let staff = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let shift = |staff_id, shift_date, start, end| NewShift {
            staff_id,
            clinic_id: Uuid::new_v4(),
            room_id: None,
            shift_date,
            start_time: start,
            end_time: end,
        };

        let earlier = vec![
            shift(staff, date, t(8, 0), t(12, 0)),
            shift(Uuid::new_v4(), date, t(8, 0), t(12, 0)),
            shift(staff, date.succ_opt().unwrap(), t(8, 0), t(12, 0)),
        ];
        assert_eq!(
            service.overlapping_batch_items(&shift(staff, date, t(10, 0), t(14, 0)), &earlier),
            vec![0]
        );
        assert!(service
            .overlapping_batch_items(&shift(staff, date, t(12, 0), t(14, 0)), &earlier)
            .is_empty());
    }
}
