use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};

use crate::db::payment_repository::{CompletionOutcome, NewPaymentRecord, PaymentRepository};
use crate::db::plan_repository::PlanRepository;
use crate::models::payment::{new_transaction_id, PaymentLookup, PaymentRecord};
use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;
use crate::services::gateway::{CreateChargeRequest, GatewayError, PaymentGateway};
use crate::services::notifier::Notifier;

/// Open records younger than this are reused instead of creating a second
/// checkout for the same (subscriber, plan).
pub const DEDUPE_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("plan '{0}' is not sold through the gateway")]
    FreePlanNotPayable(String),
    #[error("plan '{0}' has no gateway price configured")]
    PlanNotPurchasable(String),
    #[error("payment record not found")]
    PaymentNotFound,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// What the checkout endpoint hands back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutIntent {
    pub transaction_id: String,
    pub checkout_url: Option<String>,
}

/// The payment-record ledger: initiates checkouts, applies completions, and
/// records failures. Every mutation of a subscriber's paid plan flows through
/// `complete`.
pub struct LedgerService {
    payments: Arc<dyn PaymentRepository>,
    plans: Arc<dyn PlanRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    frontend_origin: String,
}

impl LedgerService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        plans: Arc<dyn PlanRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        frontend_origin: String,
    ) -> Self {
        Self {
            payments,
            plans,
            gateway,
            notifier,
            frontend_origin,
        }
    }

    /// Starts a checkout for a paid plan. A recent open record for the same
    /// (subscriber, plan) is reused, so a double-clicked buy button yields one
    /// charge and the same redirect URL. Records that never got a gateway
    /// session are skipped by the dedupe lookup, so a gateway outage leaves
    /// retries open.
    pub async fn initiate(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
        now: OffsetDateTime,
    ) -> Result<CheckoutIntent, LedgerError> {
        if !plan.is_paid() {
            return Err(LedgerError::FreePlanNotPayable(plan.slug.clone()));
        }
        let price_id = plan
            .gateway_price_id
            .as_deref()
            .ok_or_else(|| LedgerError::PlanNotPurchasable(plan.slug.clone()))?;

        let window_start = now - Duration::minutes(DEDUPE_WINDOW_MINUTES);
        if let Some(open) = self
            .payments
            .find_open_payment(subscriber.id, plan.id, window_start)
            .await?
        {
            return Ok(CheckoutIntent {
                transaction_id: open.transaction_id,
                checkout_url: open.checkout_url,
            });
        }

        let record = self
            .payments
            .insert_pending(NewPaymentRecord {
                subscriber_id: subscriber.id,
                plan_id: plan.id,
                transaction_id: new_transaction_id(),
                amount_cents: plan.price_cents,
                currency: plan.currency.clone(),
            })
            .await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("plan".to_string(), plan.slug.clone());
        metadata.insert("subscriber_id".to_string(), subscriber.id.to_string());

        let session = self
            .gateway
            .create_charge(CreateChargeRequest {
                price_id: price_id.to_string(),
                quantity: 1,
                success_url: format!(
                    "{}/billing/success?txn={}",
                    self.frontend_origin, record.transaction_id
                ),
                cancel_url: format!("{}/billing/cancelled", self.frontend_origin),
                client_reference_id: record.transaction_id.clone(),
                metadata,
            })
            .await?;

        self.payments
            .attach_gateway_session(record.id, &session.id, session.url.as_deref())
            .await?;

        Ok(CheckoutIntent {
            transaction_id: record.transaction_id,
            checkout_url: session.url,
        })
    }

    /// Applies a gateway-confirmed payment. Safe under at-least-once webhook
    /// delivery and a racing success-redirect confirmation: the repository
    /// collapses duplicates, and this layer only adds notifications and the
    /// reconciliation alarm.
    pub async fn complete(
        &self,
        lookup: &PaymentLookup,
        gateway_payload: Option<serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<CompletionOutcome, LedgerError> {
        let outcome = self
            .payments
            .complete_payment(lookup, gateway_payload, now)
            .await?;

        match &outcome {
            CompletionOutcome::Applied {
                record, subscriber, ..
            } => {
                self.notify_plan_changed(record, subscriber).await;
            }
            CompletionOutcome::AlreadyCompleted { .. } => {}
            CompletionOutcome::AlreadyTerminal { record } => {
                error!(
                    transaction_id = %record.transaction_id,
                    status = ?record.status,
                    "completion arrived for a terminal payment record; reconciliation required"
                );
                self.alert_reconciliation(
                    &record.transaction_id,
                    "completion received for a payment already marked failed or cancelled",
                )
                .await;
            }
            CompletionOutcome::EntitlementRejected { record, reason } => {
                error!(
                    transaction_id = %record.transaction_id,
                    subscriber_id = %record.subscriber_id,
                    reason = %reason,
                    "charge completed but entitlement refused; reconciliation required"
                );
                self.alert_reconciliation(&record.transaction_id, reason).await;
            }
            CompletionOutcome::NotFound => return Err(LedgerError::PaymentNotFound),
        }

        Ok(outcome)
    }

    /// Marks a payment failed. Already-terminal records are left alone.
    pub async fn fail(&self, lookup: &PaymentLookup, reason: &str) -> Result<(), LedgerError> {
        let updated = self.payments.mark_failed(lookup, reason).await?;
        if !updated {
            warn!(reason, "failure notice for a terminal or unknown payment; ignored");
        }
        Ok(())
    }

    /// Marks a payment cancelled (subscriber abandoned checkout).
    pub async fn cancel(&self, lookup: &PaymentLookup) -> Result<(), LedgerError> {
        let updated = self.payments.mark_cancelled(lookup).await?;
        if !updated {
            warn!("cancellation notice for a terminal or unknown payment; ignored");
        }
        Ok(())
    }

    async fn notify_plan_changed(&self, record: &PaymentRecord, subscriber: &Subscriber) {
        let plan = match self.plans.find_plan(record.plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "could not load plan for payment notification");
                return;
            }
        };
        if let Err(err) = self
            .notifier
            .notify_plan_changed(subscriber, &plan, record.is_renewal)
            .await
        {
            warn!(
                subscriber_id = %subscriber.id,
                error = %err,
                "failed to send plan-change notification"
            );
        }
    }

    async fn alert_reconciliation(&self, transaction_id: &str, reason: &str) {
        if let Err(err) = self
            .notifier
            .notify_reconciliation_required(transaction_id, reason)
            .await
        {
            error!(
                transaction_id,
                error = %err,
                "failed to send reconciliation alert"
            );
        }
    }
}
