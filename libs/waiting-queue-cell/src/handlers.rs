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
use shared_models::queue::QueueTicket;
use shared_utils::extractor::{require_role, JsonBody};

use crate::models::{
    CallNextResponse, ClinicQueueResponse, EnqueueRequest, QueuePosition, ReorderRequest,
    ServiceDayQuery, UpdateQueueStatusRequest,
};
use crate::services::sequencer::QueueSequencer;

pub const QUEUE_OPERATORS: &[Role] = &[Role::Admin, Role::Reception, Role::Doctor, Role::Nurse];
pub const QUEUE_MANAGERS: &[Role] = &[Role::Admin, Role::Reception];

pub async fn get_clinic_queue(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<ServiceDayQuery>,
) -> Result<Json<ClinicQueueResponse>, AppError> {
    require_role(&user, QUEUE_OPERATORS)?;

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let queue = sequencer.get_clinic_queue(clinic_id, query.resolve()).await?;

    Ok(Json(queue))
}

pub async fn call_next_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<ServiceDayQuery>,
) -> Result<Json<CallNextResponse>, AppError> {
    require_role(&user, QUEUE_OPERATORS)?;
    info!("Call-next at clinic {} by {}", clinic_id, user.id);

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let response = sequencer.call_next(clinic_id, query.resolve()).await?;

    Ok(Json(response))
}

pub async fn get_queue_position(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((clinic_id, patient_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ServiceDayQuery>,
) -> Result<Json<QueuePosition>, AppError> {
    require_role(&user, QUEUE_OPERATORS)?;

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let position = sequencer
        .get_position(patient_id, clinic_id, query.resolve())
        .await?;

    Ok(Json(position))
}

pub async fn update_queue_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateQueueStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, QUEUE_OPERATORS)?;
    info!("Queue entry {} -> {} requested by {}", queue_id, request.status, user.id);

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let entry = sequencer.update_status(queue_id, request.status).await?;

    Ok(Json(json!({
        "message": "Queue status updated",
        "queue": entry,
    })))
}

pub async fn reorder_queue(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<ReorderRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, QUEUE_MANAGERS)?;
    info!("Queue reorder of {} entries by {}", request.queue_updates.len(), user.id);

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let updated = sequencer.reorder(&request.queue_updates).await?;

    Ok(Json(json!({
        "message": "Queue reordered",
        "updated": updated.len(),
        "queue": updated,
    })))
}

pub async fn enqueue_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<EnqueueRequest>,
) -> Result<(StatusCode, Json<QueueTicket>), AppError> {
    require_role(&user, QUEUE_MANAGERS)?;

    let sequencer = QueueSequencer::new(state.gateway.clone());
    let ticket = sequencer.enqueue(request.appointment_id).await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}
