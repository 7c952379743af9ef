//! Payment and escrow models

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

/// Escrow axis, independent of the payment status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Telebirr,
    CbeBirr,
    Chapa,
    BankTransfer,
}

/// Payment for one order, amounts in santim
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub farmer_id: Uuid,
    pub amount: i64,
    pub method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub transaction_id: Option<String>,
    pub checkout_url: Option<String>,
    pub gateway_data: Option<JsonValue>,
    pub paid_at: Option<DateTime<Utc>>,
    pub escrow_release_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Funds are captured and still sitting in escrow
    pub fn is_releasable(&self) -> bool {
        self.status == PaymentStatus::Completed && self.escrow_status == EscrowStatus::Held
    }

    /// Releasable and past its scheduled release time
    pub fn is_due_for_release(&self, now: DateTime<Utc>) -> bool {
        self.is_releasable() && self.escrow_release_at <= now
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.farmer_id == user_id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub method: PaymentMethod,
}

/// Outcome reported by the payment gateway
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayOutcome {
    Success,
    Failed,
}

/// Body of a gateway callback
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub status: GatewayOutcome,
    #[serde(default)]
    pub gateway_data: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub reason: Option<String>,
}

/// Result of one auto-release sweep
#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub released: Vec<Uuid>,
    pub failed: Vec<ReleaseFailure>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFailure {
    pub payment_id: Uuid,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn payment(status: PaymentStatus, escrow: EscrowStatus, release_in: Duration) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            amount: 4500,
            method: Some(PaymentMethod::Telebirr),
            status,
            escrow_status: escrow,
            transaction_id: None,
            checkout_url: None,
            gateway_data: None,
            paid_at: None,
            escrow_release_at: now + release_in,
            released_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_release_requires_completed_and_held() {
        let past = Duration::hours(-1);
        assert!(payment(PaymentStatus::Completed, EscrowStatus::Held, past).is_releasable());
        assert!(!payment(PaymentStatus::Processing, EscrowStatus::Held, past).is_releasable());
        assert!(!payment(PaymentStatus::Completed, EscrowStatus::Released, past).is_releasable());
        assert!(!payment(PaymentStatus::Refunded, EscrowStatus::Refunded, past).is_releasable());
    }

    #[test]
    fn test_due_only_after_release_time() {
        let now = Utc::now();
        assert!(payment(PaymentStatus::Completed, EscrowStatus::Held, Duration::hours(-1))
            .is_due_for_release(now));
        assert!(!payment(PaymentStatus::Completed, EscrowStatus::Held, Duration::days(3))
            .is_due_for_release(now));
        assert!(!payment(PaymentStatus::Pending, EscrowStatus::Held, Duration::hours(-1))
            .is_due_for_release(now));
    }

    #[test]
    fn test_webhook_payload_wire_format() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"transactionId":"AGL-TX-1","status":"success","gatewayData":{"ref":"x"}}"#,
        )
        .unwrap();
        assert_eq!(payload.status, GatewayOutcome::Success);
        assert_eq!(payload.gateway_data.unwrap()["ref"], "x");

        let payload: WebhookPayload =
            serde_json::from_str(r#"{"transactionId":"AGL-TX-2","status":"failed"}"#).unwrap();
        assert_eq!(payload.status, GatewayOutcome::Failed);
        assert!(payload.gateway_data.is_none());
    }

    #[test]
    fn test_method_wire_format() {
        let method: PaymentMethod = serde_json::from_str("\"CBE_BIRR\"").unwrap();
        assert_eq!(method, PaymentMethod::CbeBirr);
    }
}
