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
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::schedule::StaffSchedule;
use shared_utils::extractor::{require_role, JsonBody};

use crate::models::{
    BulkCreateSchedulesRequest, BulkCreateSchedulesResponse, CreateScheduleRequest,
    ScheduleConflictCheckRequest, ScheduleConflictCheckResponse, ScheduleListQuery,
    UpdateScheduleRequest,
};
use crate::services::scheduling::StaffScheduleService;

pub const SCHEDULE_ADMINS: &[Role] = &[Role::Admin];

pub async fn list_schedules(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;

    let schedules = StaffScheduleService::new(state.gateway.clone())
        .list_schedules(&query)
        .await?;

    Ok(Json(json!({
        "total": schedules.len(),
        "schedules": schedules,
    })))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<StaffSchedule>), AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;
    info!("Schedule creation requested by {}", user.id);

    let schedule = StaffScheduleService::new(state.gateway.clone())
        .create_schedule(&request)
        .await?;

    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn bulk_create_schedules(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<BulkCreateSchedulesRequest>,
) -> Result<(StatusCode, Json<BulkCreateSchedulesResponse>), AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;
    info!("Bulk import of {} schedules by {}", request.schedules.len(), user.id);

    let response = StaffScheduleService::new(state.gateway.clone())
        .bulk_create_schedules(&request.schedules)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn check_schedule_conflicts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<ScheduleConflictCheckRequest>,
) -> Result<Json<ScheduleConflictCheckResponse>, AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;

    let response = StaffScheduleService::new(state.gateway.clone())
        .check_conflicts(&request.schedules)
        .await?;

    Ok(Json(response))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateScheduleRequest>,
) -> Result<Json<StaffSchedule>, AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;
    info!("Schedule {} update requested by {}", schedule_id, user.id);

    let schedule = StaffScheduleService::new(state.gateway.clone())
        .update_schedule(schedule_id, &request)
        .await?;

    Ok(Json(schedule))
}

pub async fn deactivate_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<StaffSchedule>, AppError> {
    require_role(&user, SCHEDULE_ADMINS)?;
    info!("Schedule {} deactivation requested by {}", schedule_id, user.id);

    let schedule = StaffScheduleService::new(state.gateway.clone())
        .deactivate_schedule(schedule_id)
        .await?;

    Ok(Json(schedule))
}
