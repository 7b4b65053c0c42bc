use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::payment::{PaymentLookup, PaymentRecord};
use crate::models::subscriber::Subscriber;
use crate::services::lifecycle::PlanChange;

/// What happened when a completion was applied. `Rejected` is the
/// reconciliation seam: the charge is recorded as completed but no
/// entitlement was granted.
#[derive(Debug)]
pub enum CompletionOutcome {
    Applied {
        record: PaymentRecord,
        subscriber: Subscriber,
        change: PlanChange,
    },
    /// Duplicate delivery; nothing was changed.
    AlreadyCompleted { record: PaymentRecord },
    /// The record had already failed or been cancelled; a completion arriving
    /// now means the gateway and the ledger disagree.
    AlreadyTerminal { record: PaymentRecord },
    /// Payment marked completed, entitlement refused by the state machine.
    EntitlementRejected {
        record: PaymentRecord,
        reason: String,
    },
    NotFound,
}

pub struct NewPaymentRecord {
    pub subscriber_id: Uuid,
    pub plan_id: Uuid,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Most recent non-terminal record for (subscriber, plan) created at or
    /// after `created_after`; used to deduplicate checkout initiation. Only
    /// records with a gateway session qualify, so a record orphaned by a
    /// gateway outage never blocks a retry.
    async fn find_open_payment(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        created_after: OffsetDateTime,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    async fn insert_pending(&self, new: NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error>;

    /// Attaches the gateway's session/intent id and hosted checkout URL once
    /// the gateway session exists.
    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        gateway_transaction_id: &str,
        checkout_url: Option<&str>,
    ) -> Result<(), sqlx::Error>;

    async fn find_payment(
        &self,
        lookup: &PaymentLookup,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    /// Completes a payment and applies the resulting plan change in one
    /// transaction. The record lookup, the idempotency decision, the status
    /// flip and the subscriber mutation all happen under the same row locks,
    /// so at-least-once webhook delivery and a racing success-redirect
    /// confirmation collapse into a single effect.
    async fn complete_payment(
        &self,
        lookup: &PaymentLookup,
        gateway_payload: Option<serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<CompletionOutcome, sqlx::Error>;

    /// Marks the record failed. False when the record was already terminal
    /// (or missing); terminal records are never rewritten.
    async fn mark_failed(&self, lookup: &PaymentLookup, reason: &str)
        -> Result<bool, sqlx::Error>;

    async fn mark_cancelled(&self, lookup: &PaymentLookup) -> Result<bool, sqlx::Error>;
}
