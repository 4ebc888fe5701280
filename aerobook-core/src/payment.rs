use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;
use uuid::Uuid;

/// Payment state of a booking. Gateway protocol details live outside the
/// engine; only the outcome is tracked here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    RefundPending,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::RefundPending => "REFUND_PENDING",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "REFUND_PENDING" => Ok(PaymentStatus::RefundPending),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentReceipt {
    pub id: String,
    pub booking_reference: String,
    pub amount: Decimal,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment declined for booking {0}")]
    Declined(String),

    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Payment gateway failure: {0}")]
    Gateway(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture `amount` for a booking.
    async fn charge(&self, booking_reference: &str, amount: Decimal) -> Result<PaymentReceipt, PaymentError>;

    /// Give back a capture that could not be applied to its booking.
    async fn refund(&self, receipt: &PaymentReceipt) -> Result<(), PaymentError>;
}

/// Always-approving gateway, except for references registered with
/// [`MockPaymentGateway::decline`].
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    declined: HashSet<String>,
    refunds: AtomicUsize,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline(mut self, booking_reference: &str) -> Self {
        self.declined.insert(booking_reference.to_string());
        self
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, booking_reference: &str, amount: Decimal) -> Result<PaymentReceipt, PaymentError> {
        if amount < Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount));
        }
        if self.declined.contains(booking_reference) {
            return Err(PaymentError::Declined(booking_reference.to_string()));
        }

        Ok(PaymentReceipt {
            id: format!("mock_pay_{}", Uuid::new_v4().simple()),
            booking_reference: booking_reference.to_string(),
            amount,
            captured_at: Utc::now(),
        })
    }

    async fn refund(&self, receipt: &PaymentReceipt) -> Result<(), PaymentError> {
        info!("Mock refund of {} for booking {}", receipt.amount, receipt.booking_reference);
        self.refunds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_gateway_charges_and_declines() {
        let gateway = MockPaymentGateway::new().decline("BADPAY");

        let receipt = gateway.charge("ABC123", dec!(230.00)).await.unwrap();
        assert_eq!(receipt.amount, dec!(230.00));
        assert!(receipt.id.starts_with("mock_pay_"));

        let declined = gateway.charge("BADPAY", dec!(10.00)).await;
        assert!(matches!(declined, Err(PaymentError::Declined(_))));

        gateway.refund(&receipt).await.unwrap();
        assert_eq!(gateway.refund_count(), 1);
    }

    #[test]
    fn test_payment_status_round_trips_through_str() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::RefundPending,
            PaymentStatus::Refunded,
            PaymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
