use tracing::warn;

use shared_models::appointment::{Appointment, AppointmentStatus};

use crate::models::AppointmentError;

/// Checks a requested status change against the appointment transition table.
/// Cancellation is refused here because it needs a reason.
pub fn validate_status_change(
    current: AppointmentStatus,
    target: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if target == AppointmentStatus::Cancelled {
        return Err(AppointmentError::CancelRequiresReason);
    }

    if !current.can_transition_to(&target) {
        warn!("Rejected appointment transition {} -> {}", current, target);
        return Err(AppointmentError::InvalidStatusTransition {
            from: current,
            to: target,
        });
    }

    Ok(())
}

pub fn validate_cancellation(appointment: &Appointment, reason: Option<&str>) -> Result<String, AppointmentError> {
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Err(AppointmentError::ValidationError(
            "cancellationReason is required".to_string(),
        ));
    }

    if !appointment.status.can_transition_to(&AppointmentStatus::Cancelled) {
        return Err(AppointmentError::InvalidStatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Cancelled,
        });
    }

    Ok(reason.to_string())
}

/// Reassignment only applies to appointments that have not finished.
pub fn ensure_active(appointment: &Appointment) -> Result<(), AppointmentError> {
    if appointment.status.is_active() {
        Ok(())
    } else {
        Err(AppointmentError::NotActive(appointment.status))
    }
}
