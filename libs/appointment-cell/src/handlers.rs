use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_database::AppState;
use shared_models::appointment::AppointmentDetails;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::{actor_id, require_role, JsonBody};
use waiting_queue_cell::{CallNextResponse, ServiceDayQuery};

use crate::models::{
    BulkCreateAppointmentsRequest, BulkCreateAppointmentsResponse, CancelAppointmentRequest,
    ConflictCheckRequest, ConflictCheckResponse, CreateAppointmentRequest, ReassignDoctorRequest,
    ReassignRoomRequest, UpdateAppointmentStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

pub const BOOKING_ROLES: &[Role] = &[Role::Admin, Role::Reception];
pub const CLINICAL_ROLES: &[Role] = &[Role::Admin, Role::Reception, Role::Doctor, Role::Nurse];

fn booking_service(state: &AppState) -> AppointmentBookingService {
    AppointmentBookingService::new(
        state.gateway.clone(),
        state.config.appointment_conflict_window_minutes,
    )
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentDetails>), AppError> {
    require_role(&user, BOOKING_ROLES)?;
    info!("Appointment booking requested by {}", user.id);

    let appointment = booking_service(&state).create_appointment(&request).await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn bulk_create_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<BulkCreateAppointmentsRequest>,
) -> Result<(StatusCode, Json<BulkCreateAppointmentsResponse>), AppError> {
    require_role(&user, BOOKING_ROLES)?;
    info!("Bulk import of {} appointments by {}", request.appointments.len(), user.id);

    let response = booking_service(&state)
        .bulk_create_appointments(&request.appointments)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn check_appointment_conflicts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<ConflictCheckRequest>,
) -> Result<Json<ConflictCheckResponse>, AppError> {
    require_role(&user, CLINICAL_ROLES)?;

    let response = booking_service(&state).check_conflicts(&request).await?;

    Ok(Json(response))
}

pub async fn list_clinic_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<ServiceDayQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, CLINICAL_ROLES)?;

    let service_day = query.resolve();
    let appointments = booking_service(&state)
        .list_clinic_appointments(clinic_id, service_day)
        .await?;

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "service_day": service_day,
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentDetails>, AppError> {
    require_role(&user, CLINICAL_ROLES)?;

    let appointment = booking_service(&state).get_appointment(appointment_id).await?;

    Ok(Json(appointment))
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateAppointmentStatusRequest>,
) -> Result<Json<AppointmentDetails>, AppError> {
    require_role(&user, CLINICAL_ROLES)?;
    info!("Status {} requested for appointment {} by {}", request.status, appointment_id, user.id);

    let appointment = booking_service(&state)
        .update_status(appointment_id, request.status)
        .await?;

    Ok(Json(appointment))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    JsonBody(request): JsonBody<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, BOOKING_ROLES)?;
    info!("Cancellation of appointment {} requested by {}", appointment_id, user.id);

    let appointment = booking_service(&state)
        .cancel_appointment(appointment_id, request.cancellation_reason.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "Appointment cancelled",
        "appointment": appointment,
    })))
}

pub async fn reassign_room(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    JsonBody(request): JsonBody<ReassignRoomRequest>,
) -> Result<Json<AppointmentDetails>, AppError> {
    require_role(&user, BOOKING_ROLES)?;
    let actor = actor_id(&user)?;

    let appointment = booking_service(&state)
        .reassign_room(appointment_id, request.room_id, actor)
        .await?;

    Ok(Json(appointment))
}

pub async fn reassign_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    JsonBody(request): JsonBody<ReassignDoctorRequest>,
) -> Result<Json<AppointmentDetails>, AppError> {
    require_role(&user, BOOKING_ROLES)?;
    let actor = actor_id(&user)?;

    let appointment = booking_service(&state)
        .reassign_doctor(appointment_id, request.staff_id, actor)
        .await?;

    Ok(Json(appointment))
}

pub async fn call_next_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<ServiceDayQuery>,
) -> Result<Json<CallNextResponse>, AppError> {
    require_role(&user, CLINICAL_ROLES)?;

    let response = booking_service(&state)
        .call_next_patient(clinic_id, query.resolve())
        .await?;

    Ok(Json(response))
}
