use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Deserialize, Serialize, PartialEq, Eq, Copy, Clone)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Completed, failed and cancelled records never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Why an entitlement was granted. Stored explicitly on the record so nothing
/// downstream has to infer "was this the trial" from expiry windows.
#[derive(sqlx::Type, Debug, Deserialize, Serialize, PartialEq, Eq, Copy, Clone)]
#[sqlx(type_name = "grant_origin", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GrantOrigin {
    Purchase,
    Renewal,
    Trial,
}

/// One row per payment attempt. `transaction_id` is the caller-assigned
/// idempotency key; `gateway_transaction_id` arrives from the processor.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub plan_id: Uuid,
    pub transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Hosted checkout URL for this attempt, kept so a deduplicated initiate
    /// can hand back the same session instead of opening a new one.
    pub checkout_url: Option<String>,
    pub is_renewal: bool,
    pub origin: Option<GrantOrigin>,
    pub subscription_start_date: Option<OffsetDateTime>,
    pub subscription_end_date: Option<OffsetDateTime>,
    pub paid_at: Option<OffsetDateTime>,
    pub failure_reason: Option<String>,
    pub gateway_payload: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

/// Either key a completion can arrive with: the internal transaction id from
/// the success redirect, or the gateway's own id from a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    TransactionId(String),
    GatewayTransactionId(String),
}

pub fn new_transaction_id() -> String {
    format!("txn_{}", Uuid::new_v4().simple())
}
