use std::str::FromStr;
use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use uuid::Uuid;

use billing_cell::{BillItemRequest, BillingError, BillingLedger, CreateBillRequest, ProcessPaymentRequest};
use shared_database::MemoryGateway;
use shared_models::billing::{BillStatus, PaymentMethod};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Desk {
    gateway: MemoryGateway,
    patient_id: Uuid,
}

impl Desk {
    async fn new() -> Self {
        let gateway = MemoryGateway::new();
        Self {
            patient_id: gateway.add_patient("Brian Ochieng").await,
            gateway,
        }
    }

    fn ledger(&self) -> BillingLedger {
        BillingLedger::new(Arc::new(self.gateway.clone()))
    }

    fn bill_for(&self, lines: &[(&str, i32, &str)], discount: &str) -> CreateBillRequest {
        CreateBillRequest {
            patient_id: Some(self.patient_id),
            items: lines
                .iter()
                .map(|(description, quantity, price)| BillItemRequest {
                    description: Some(description.to_string()),
                    quantity: Some(*quantity),
                    unit_price: Some(dec(price)),
                })
                .collect(),
            discount_percent: Some(dec(discount)),
        }
    }
}

fn payment(amount: &str) -> ProcessPaymentRequest {
    ProcessPaymentRequest {
        amount: dec(amount),
        payment_method: PaymentMethod::MobileMoney,
        payment_reference: Some("QKX41ZT".to_string()),
    }
}

#[tokio::test]
async fn create_bill_stores_totals_and_items() {
    let desk = Desk::new().await;
    let details = desk
        .ledger()
        .create_bill(&desk.bill_for(&[("Consultation", 1, "80.00"), ("Paracetamol", 2, "10.00")], "10"))
        .await
        .unwrap();

    assert_eq!(details.bill.status, BillStatus::Pending);
    assert_eq!(details.bill.total_amount, dec("100.00"));
    assert_eq!(details.bill.discount_amount, dec("10.00"));
    assert_eq!(details.bill.final_amount, dec("90.00"));
    assert_eq!(details.items.len(), 2);
    assert_eq!(details.items[1].line_total, dec("20.00"));

    let snapshot = desk.gateway.snapshot().await;
    assert_eq!(snapshot.bills.len(), 1);
    assert_eq!(snapshot.bill_items.len(), 2);
}

#[tokio::test]
async fn create_bill_rejects_unknown_patient_and_invalid_items() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();

    let mut unknown = desk.bill_for(&[("Consultation", 1, "50.00")], "0");
    unknown.patient_id = Some(Uuid::new_v4());
    assert_matches!(ledger.create_bill(&unknown).await, Err(BillingError::PatientNotFound(_)));

    let invalid = desk.bill_for(&[("Consultation", 0, "50.00")], "0");
    assert_matches!(
        ledger.create_bill(&invalid).await,
        Err(BillingError::InvalidFields(errors)) if errors[0].field == "items[0].quantity"
    );

    assert!(desk.gateway.snapshot().await.bills.is_empty());
}

#[tokio::test]
async fn amounts_beyond_the_money_range_are_field_errors() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();

    let huge = desk.bill_for(&[("Theatre", 2, "70000000000000000000000000000")], "0");
    assert_matches!(
        ledger.create_bill(&huge).await,
        Err(BillingError::InvalidFields(errors)) if errors[0].field == "items[0].unit_price"
    );

    let too_large_total = desk.bill_for(&[("Ward", 1, "9999999999.99"), ("Meals", 1, "0.01")], "0");
    assert_matches!(
        ledger.create_bill(&too_large_total).await,
        Err(BillingError::InvalidFields(errors)) if errors[0].field == "items"
    );

    let at_limit = desk.bill_for(&[("Ward", 1, "9999999999.99")], "0");
    let details = ledger.create_bill(&at_limit).await.unwrap();
    assert_eq!(details.bill.final_amount, dec("9999999999.99"));
}

#[tokio::test]
async fn fully_discounted_bill_is_settled_on_creation() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();

    let details = ledger
        .create_bill(&desk.bill_for(&[("Staff check-up", 1, "45.00")], "100"))
        .await
        .unwrap();
    assert_eq!(details.bill.final_amount, Decimal::ZERO);
    assert_eq!(details.bill.status, BillStatus::Paid);
    assert_eq!(details.remaining_balance, Decimal::ZERO);

    assert_matches!(
        ledger.process_payment(details.bill.id, &payment("1.00")).await,
        Err(BillingError::NotPayable { status: BillStatus::Paid, .. })
    );
}

#[tokio::test]
async fn failed_commit_leaves_no_bill_or_items() {
    let desk = Desk::new().await;
    desk.gateway.fail_next_commit();

    let result = desk
        .ledger()
        .create_bill(&desk.bill_for(&[("X-ray", 1, "120.00")], "0"))
        .await;
    assert_matches!(result, Err(BillingError::Database(_)));

    let snapshot = desk.gateway.snapshot().await;
    assert!(snapshot.bills.is_empty());
    assert!(snapshot.bill_items.is_empty());
}

// Payments are capped by the remaining balance, not by the bill's final amount.
#[tokio::test]
async fn scenario_d_second_payment_is_capped_by_remaining_balance() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();
    let bill = ledger
        .create_bill(&desk.bill_for(&[("Consultation", 1, "100.00")], "0"))
        .await
        .unwrap()
        .bill;

    let receipt = ledger.process_payment(bill.id, &payment("60.00")).await.unwrap();
    assert_eq!(receipt.bill.status, BillStatus::PartiallyPaid);
    assert_eq!(receipt.bill.paid_amount, dec("60.00"));
    assert_eq!(receipt.remaining_balance, dec("40.00"));

    let over = ledger.process_payment(bill.id, &payment("50.00")).await;
    assert_matches!(
        over,
        Err(BillingError::Overpayment { amount, remaining }) if amount == dec("50.00") && remaining == dec("40.00")
    );

    let settled = ledger.process_payment(bill.id, &payment("40.00")).await.unwrap();
    assert_eq!(settled.bill.status, BillStatus::Paid);
    assert_eq!(settled.bill.paid_amount, dec("100.00"));
    assert_eq!(settled.remaining_balance, Decimal::ZERO);

    let details = ledger.get_bill(bill.id).await.unwrap();
    assert_eq!(details.payments.len(), 2);
    assert_eq!(details.payments[0].payment_reference.as_deref(), Some("QKX41ZT"));
}

#[tokio::test]
async fn p6_settled_and_cancelled_bills_reject_payments() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();

    let paid = ledger
        .create_bill(&desk.bill_for(&[("Lab test", 1, "30.00")], "0"))
        .await
        .unwrap()
        .bill;
    ledger.process_payment(paid.id, &payment("30.00")).await.unwrap();
    assert_matches!(
        ledger.process_payment(paid.id, &payment("0.01")).await,
        Err(BillingError::NotPayable { status: BillStatus::Paid, .. })
    );

    let cancelled = ledger
        .create_bill(&desk.bill_for(&[("Lab test", 1, "30.00")], "0"))
        .await
        .unwrap()
        .bill;
    ledger.cancel_bill(cancelled.id).await.unwrap();
    assert_matches!(
        ledger.process_payment(cancelled.id, &payment("10.00")).await,
        Err(BillingError::NotPayable { status: BillStatus::Cancelled, .. })
    );

    assert_eq!(desk.gateway.snapshot().await.payments.len(), 1);
}

#[tokio::test]
async fn non_positive_and_unknown_payments_are_rejected() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();
    let bill = ledger
        .create_bill(&desk.bill_for(&[("Dressing", 1, "15.00")], "0"))
        .await
        .unwrap()
        .bill;

    assert_matches!(
        ledger.process_payment(bill.id, &payment("0")).await,
        Err(BillingError::ValidationError(_))
    );
    assert_matches!(
        ledger.process_payment(bill.id, &payment("0.004")).await,
        Err(BillingError::ValidationError(_))
    );
    assert_matches!(
        ledger.process_payment(Uuid::new_v4(), &payment("5.00")).await,
        Err(BillingError::NotFound(_))
    );
}

#[tokio::test]
async fn concurrent_payments_never_exceed_final_amount() {
    let desk = Desk::new().await;
    let bill = desk
        .ledger()
        .create_bill(&desk.bill_for(&[("Physiotherapy", 1, "100.00")], "0"))
        .await
        .unwrap()
        .bill;
    let bill_id = bill.id;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = desk.ledger();
        handles.push(tokio::spawn(async move { ledger.process_payment(bill_id, &payment("30.00")).await }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 3);

    let details = desk.ledger().get_bill(bill_id).await.unwrap();
    assert_eq!(details.bill.paid_amount, dec("90.00"));
    assert_eq!(details.bill.status, BillStatus::PartiallyPaid);
}

#[tokio::test]
async fn only_unpaid_bills_can_be_cancelled() {
    let desk = Desk::new().await;
    let ledger = desk.ledger();
    let bill = ledger
        .create_bill(&desk.bill_for(&[("Consultation", 1, "50.00")], "0"))
        .await
        .unwrap()
        .bill;
    ledger.process_payment(bill.id, &payment("10.00")).await.unwrap();

    assert_matches!(
        ledger.cancel_bill(bill.id).await,
        Err(BillingError::NotCancellable { .. })
    );

    let unpaid = ledger
        .create_bill(&desk.bill_for(&[("Consultation", 1, "50.00")], "0"))
        .await
        .unwrap()
        .bill;
    let cancelled = ledger.cancel_bill(unpaid.id).await.unwrap();
    assert_eq!(cancelled.status, BillStatus::Cancelled);
    assert_matches!(
        ledger.cancel_bill(unpaid.id).await,
        Err(BillingError::NotCancellable { .. })
    );
}
