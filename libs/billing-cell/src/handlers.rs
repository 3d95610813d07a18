use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use tracing::info;
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::{Role, User};
use shared_models::billing::Bill;
use shared_models::error::AppError;
use shared_utils::extractor::{require_role, JsonBody};

use crate::models::{BillDetails, CreateBillRequest, PaymentReceipt, ProcessPaymentRequest};
use crate::services::ledger::BillingLedger;

pub const BILL_CREATORS: &[Role] = &[Role::Admin, Role::Reception, Role::Cashier];
pub const BILL_READERS: &[Role] = &[Role::Admin, Role::Reception, Role::Cashier];
pub const CASHIERS: &[Role] = &[Role::Admin, Role::Cashier];

pub async fn create_bill(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<CreateBillRequest>,
) -> Result<(StatusCode, Json<BillDetails>), AppError> {
    require_role(&user, BILL_CREATORS)?;
    info!("Bill creation requested by {}", user.id);

    let bill = BillingLedger::new(state.gateway.clone()).create_bill(&request).await?;

    Ok((StatusCode::CREATED, Json(bill)))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<BillDetails>, AppError> {
    require_role(&user, BILL_READERS)?;

    let bill = BillingLedger::new(state.gateway.clone()).get_bill(bill_id).await?;

    Ok(Json(bill))
}

pub async fn process_payment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(bill_id): Path<Uuid>,
    JsonBody(request): JsonBody<ProcessPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentReceipt>), AppError> {
    require_role(&user, CASHIERS)?;
    info!("Payment of {} on bill {} recorded by {}", request.amount, bill_id, user.id);

    let receipt = BillingLedger::new(state.gateway.clone())
        .process_payment(bill_id, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn cancel_bill(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<Bill>, AppError> {
    require_role(&user, CASHIERS)?;
    info!("Cancellation of bill {} requested by {}", bill_id, user.id);

    let bill = BillingLedger::new(state.gateway.clone()).cancel_bill(bill_id).await?;

    Ok(Json(bill))
}
