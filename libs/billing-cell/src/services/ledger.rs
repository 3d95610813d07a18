use std::sync::Arc;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::StorageGateway;
use shared_models::billing::{Bill, BillItem, BillStatus, Payment, PaymentStatus};

use crate::error::{BillingError, BillingResult};
use crate::models::{
    checked_line_total, BillDetails, CreateBillRequest, NewBillItem, PaymentReceipt, ProcessPaymentRequest,
    MAX_AMOUNT,
};

/// Rounds to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillTotals {
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
}

impl BillTotals {
    /// Fails when the sum or the discount leaves the money range.
    pub fn compute(items: &[NewBillItem], discount_percent: Decimal) -> BillingResult<Self> {
        let total_amount = items.iter().try_fold(Decimal::ZERO, |sum, item| {
            line_total(item).and_then(|line| sum.checked_add(line).ok_or_else(out_of_range))
        })?;
        if total_amount > MAX_AMOUNT {
            return Err(out_of_range());
        }

        let discount_amount = total_amount
            .checked_mul(discount_percent)
            .and_then(|d| d.checked_div(Decimal::ONE_HUNDRED))
            .map(round_money)
            .ok_or_else(out_of_range)?;
        Ok(Self {
            total_amount,
            discount_amount,
            final_amount: total_amount - discount_amount,
        })
    }
}

fn line_total(item: &NewBillItem) -> BillingResult<Decimal> {
    checked_line_total(item.quantity, item.unit_price).ok_or_else(out_of_range)
}

fn out_of_range() -> BillingError {
    BillingError::ValidationError(format!("bill amounts must not exceed {}", MAX_AMOUNT))
}

/// Bills and payments. Payments against one bill are serialized by the bill row lock.
pub struct BillingLedger {
    gateway: Arc<dyn StorageGateway>,
}

impl BillingLedger {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    pub async fn create_bill(&self, request: &CreateBillRequest) -> BillingResult<BillDetails> {
        let new = request.validate().map_err(BillingError::InvalidFields)?;

        let mut uow = self.gateway.begin().await?;
        if uow.patient_name(new.patient_id).await?.is_none() {
            return Err(BillingError::PatientNotFound(new.patient_id));
        }

        let totals = BillTotals::compute(&new.items, new.discount_percent)?;
        // nothing can ever be paid against a zero total
        let status = if totals.final_amount.is_zero() {
            BillStatus::Paid
        } else {
            BillStatus::Pending
        };
        let now = Utc::now();
        let bill = Bill {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            total_amount: totals.total_amount,
            discount_percent: new.discount_percent,
            discount_amount: totals.discount_amount,
            final_amount: totals.final_amount,
            paid_amount: Decimal::ZERO,
            status,
            created_at: now,
            updated_at: now,
        };
        uow.insert_bill(&bill).await?;

        let mut items = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let row = BillItem {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: line_total(item)?,
            };
            uow.insert_bill_item(&row).await?;
            items.push(row);
        }

        uow.commit().await?;

        info!(
            "Bill {} created for patient {}: total {} discount {} final {}",
            bill.id, bill.patient_id, bill.total_amount, bill.discount_amount, bill.final_amount
        );
        Ok(BillDetails {
            remaining_balance: bill.remaining_balance(),
            bill,
            items,
            payments: Vec::new(),
        })
    }

    /// Records a completed payment. The amount may not exceed what is still owed.
    pub async fn process_payment(
        &self,
        bill_id: Uuid,
        request: &ProcessPaymentRequest,
    ) -> BillingResult<PaymentReceipt> {
        let amount = round_money(request.amount);
        if amount <= Decimal::ZERO {
            return Err(BillingError::ValidationError("amount must be positive".to_string()));
        }

        let mut uow = self.gateway.begin().await?;
        let mut bill = uow.lock_bill(bill_id).await?.ok_or(BillingError::NotFound(bill_id))?;

        if !bill.accepts_payments() {
            return Err(BillingError::NotPayable {
                id: bill.id,
                status: bill.status,
            });
        }

        let remaining = bill.remaining_balance();
        if amount > remaining {
            warn!("Payment of {} on bill {} exceeds remaining {}", amount, bill_id, remaining);
            return Err(BillingError::Overpayment { amount, remaining });
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            bill_id,
            amount,
            payment_method: request.payment_method,
            payment_reference: request
                .payment_reference
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            status: PaymentStatus::Completed,
            created_at: now,
        };
        uow.insert_payment(&payment).await?;

        bill.paid_amount += amount;
        bill.status = if bill.paid_amount >= bill.final_amount {
            BillStatus::Paid
        } else {
            BillStatus::PartiallyPaid
        };
        bill.updated_at = now;
        uow.update_bill(&bill).await?;
        uow.commit().await?;

        info!(
            "Payment {} of {} via {} on bill {}: {} ({} paid)",
            payment.id,
            amount,
            payment.payment_method.as_str(),
            bill_id,
            bill.status,
            bill.paid_amount
        );
        Ok(PaymentReceipt {
            remaining_balance: bill.remaining_balance(),
            payment,
            bill,
        })
    }

    /// Only bills with nothing paid can be cancelled.
    pub async fn cancel_bill(&self, bill_id: Uuid) -> BillingResult<Bill> {
        let mut uow = self.gateway.begin().await?;
        let mut bill = uow.lock_bill(bill_id).await?.ok_or(BillingError::NotFound(bill_id))?;

        let reason = match bill.status {
            BillStatus::Cancelled => Some("already cancelled".to_string()),
            BillStatus::Paid | BillStatus::PartiallyPaid => Some(format!("{} has been paid", bill.paid_amount)),
            BillStatus::Pending if bill.paid_amount > Decimal::ZERO => {
                Some(format!("{} has been paid", bill.paid_amount))
            }
            BillStatus::Pending => None,
        };
        if let Some(reason) = reason {
            return Err(BillingError::NotCancellable { id: bill_id, reason });
        }

        bill.status = BillStatus::Cancelled;
        bill.updated_at = Utc::now();
        uow.update_bill(&bill).await?;
        uow.commit().await?;

        info!("Bill {} cancelled", bill_id);
        Ok(bill)
    }

    pub async fn get_bill(&self, bill_id: Uuid) -> BillingResult<BillDetails> {
        let mut uow = self.gateway.begin().await?;
        let bill = uow.get_bill(bill_id).await?.ok_or(BillingError::NotFound(bill_id))?;
        let items = uow.bill_items(bill_id).await?;
        let payments = uow.payments_for_bill(bill_id).await?;
        uow.rollback().await?;

        debug!("Loaded bill {} with {} item(s) and {} payment(s)", bill_id, items.len(), payments.len());
        Ok(BillDetails {
            remaining_balance: bill.remaining_balance(),
            bill,
            items,
            payments,
        })
    }
}
