use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::billing::{Bill, BillItem, Payment, PaymentMethod};
use shared_models::error::FieldError;

/// Largest amount a `NUMERIC(12, 2)` money column holds: 9999999999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// `quantity * unit_price` rounded to cents, or `None` when it leaves the money range.
pub fn checked_line_total(quantity: i32, unit_price: Decimal) -> Option<Decimal> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .map(|total| total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .filter(|total| *total <= MAX_AMOUNT)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillItemRequest {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBillRequest {
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<BillItemRequest>,
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
}

/// A bill line that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBillItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub patient_id: Uuid,
    pub items: Vec<NewBillItem>,
    pub discount_percent: Decimal,
}

impl CreateBillRequest {
    pub fn validate(&self) -> Result<NewBill, Vec<FieldError>> {
        let mut errors = Vec::new();

        let patient_id = match self.patient_id {
            Some(id) if !id.is_nil() => Some(id),
            Some(_) => {
                errors.push(FieldError::new("patient_id", "must be a valid id"));
                None
            }
            None => {
                errors.push(FieldError::new("patient_id", "is required"));
                None
            }
        };

        let discount_percent = self.discount_percent.unwrap_or(Decimal::ZERO);
        if discount_percent < Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
            errors.push(FieldError::new("discount_percent", "must be between 0 and 100"));
        }

        if self.items.is_empty() {
            errors.push(FieldError::new("items", "must contain at least one item"));
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.iter().enumerate() {
            match item.validate() {
                Ok(valid) => items.push(valid),
                Err(item_errors) => errors.extend(item_errors.into_iter().map(|e| e.nested("items", index))),
            }
        }

        if items.len() == self.items.len() {
            let total = items
                .iter()
                .try_fold(Decimal::ZERO, |sum, item| {
                    checked_line_total(item.quantity, item.unit_price).and_then(|line| sum.checked_add(line))
                })
                .filter(|total| *total <= MAX_AMOUNT);
            if total.is_none() {
                errors.push(FieldError::new("items", format!("bill total must not exceed {}", MAX_AMOUNT)));
            }
        }

        match patient_id {
            Some(patient_id) if errors.is_empty() => Ok(NewBill {
                patient_id,
                items,
                discount_percent,
            }),
            _ => Err(errors),
        }
    }
}

impl BillItemRequest {
    fn validate(&self) -> Result<NewBillItem, Vec<FieldError>> {
        let mut errors = Vec::new();

        let description = self.description.as_deref().map(str::trim).unwrap_or_default();
        if description.is_empty() {
            errors.push(FieldError::new("description", "is required"));
        }

        match self.quantity {
            None => errors.push(FieldError::new("quantity", "is required")),
            Some(q) if q < 1 => errors.push(FieldError::new("quantity", "must be at least 1")),
            Some(_) => {}
        }

        match self.unit_price {
            None => errors.push(FieldError::new("unit_price", "is required")),
            Some(p) if p < Decimal::ZERO => errors.push(FieldError::new("unit_price", "must not be negative")),
            Some(p) if p > MAX_AMOUNT => {
                errors.push(FieldError::new("unit_price", format!("must not exceed {}", MAX_AMOUNT)))
            }
            Some(p) => {
                if let Some(q) = self.quantity.filter(|q| *q >= 1) {
                    if checked_line_total(q, p).is_none() {
                        errors.push(FieldError::new(
                            "unit_price",
                            format!("quantity times unit_price must not exceed {}", MAX_AMOUNT),
                        ));
                    }
                }
            }
        }

        match (self.quantity, self.unit_price) {
            (Some(quantity), Some(unit_price)) if errors.is_empty() => Ok(NewBillItem {
                description: description.to_string(),
                quantity,
                unit_price,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPaymentRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDetails {
    #[serde(flatten)]
    pub bill: Bill,
    pub remaining_balance: Decimal,
    pub items: Vec<BillItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub bill: Bill,
    pub remaining_balance: Decimal,
}
