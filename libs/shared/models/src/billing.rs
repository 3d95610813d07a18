use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UnknownStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub total_amount: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: BillStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn remaining_balance(&self) -> Decimal {
        self.final_amount - self.paid_amount
    }

    pub fn accepts_payments(&self) -> bool {
        !matches!(self.status, BillStatus::Paid | BillStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillStatus {
    Pending,
    #[serde(rename = "Partially Paid", alias = "partially_paid", alias = "PartiallyPaid")]
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "Pending",
            BillStatus::PartiallyPaid => "Partially Paid",
            BillStatus::Paid => "Paid",
            BillStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BillStatus::Pending),
            "Partially Paid" => Ok(BillStatus::PartiallyPaid),
            "Paid" => Ok(BillStatus::Paid),
            "Cancelled" => Ok(BillStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Immutable line entry of a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(alias = "Cash")]
    Cash,
    #[serde(alias = "Card")]
    Card,
    #[serde(alias = "MobileMoney")]
    MobileMoney,
    #[serde(alias = "BankTransfer")]
    BankTransfer,
    #[serde(alias = "Insurance")]
    Insurance,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Insurance => "insurance",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "insurance" => Ok(PaymentMethod::Insurance),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Payments are append-only; only completed payments are recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "Completed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Completed" => Ok(PaymentStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
