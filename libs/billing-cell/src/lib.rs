pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::*;
pub use models::*;
pub use router::billing_routes;
pub use services::ledger::{round_money, BillTotals, BillingLedger};
