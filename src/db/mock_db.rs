#![allow(dead_code)]
//! In-memory repository implementation shared by unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::payment_repository::{CompletionOutcome, NewPaymentRecord, PaymentRepository};
use crate::db::plan_repository::PlanRepository;
use crate::db::subscriber_repository::SubscriberRepository;
use crate::models::payment::{PaymentLookup, PaymentRecord, PaymentStatus};
use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;
use crate::services::lifecycle;

#[derive(Default)]
pub struct MockDb {
    pub plans: Mutex<Vec<Plan>>,
    pub subscribers: Mutex<Vec<Subscriber>>,
    pub payments: Mutex<Vec<PaymentRecord>>,
    pub should_fail: bool,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_plan(&self, plan: Plan) -> Plan {
        self.plans.lock().unwrap().push(plan.clone());
        plan
    }

    pub fn seed_subscriber(&self, subscriber: Subscriber) -> Subscriber {
        self.subscribers.lock().unwrap().push(subscriber.clone());
        subscriber
    }

    pub fn subscriber(&self, id: Uuid) -> Option<Subscriber> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn payment_by_transaction_id(&self, transaction_id: &str) -> Option<PaymentRecord> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned()
    }

    fn fail_check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            Err(sqlx::Error::Protocol("mock db failure".into()))
        } else {
            Ok(())
        }
    }
}

fn matches_lookup(record: &PaymentRecord, lookup: &PaymentLookup) -> bool {
    match lookup {
        PaymentLookup::TransactionId(id) => record.transaction_id == *id,
        PaymentLookup::GatewayTransactionId(id) => {
            record.gateway_transaction_id.as_deref() == Some(id.as_str())
        }
    }
}

#[async_trait]
impl PlanRepository for MockDb {
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
        self.fail_check()?;
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == plan_id)
            .cloned())
    }

    async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>, sqlx::Error> {
        self.fail_check()?;
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error> {
        self.fail_check()?;
        let mut plans = self.plans.lock().unwrap().clone();
        plans.sort_by(|a, b| (a.price_cents, &a.slug).cmp(&(b.price_cents, &b.slug)));
        Ok(plans)
    }
}

#[async_trait]
impl SubscriberRepository for MockDb {
    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber, sqlx::Error> {
        self.fail_check()?;
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            email: email.to_string(),
            current_plan_id: None,
            plan_expires_at: None,
            plan_updated_at: None,
            trial_taken: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.subscribers.lock().unwrap().push(subscriber.clone());
        Ok(subscriber)
    }

    async fn find_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        self.fail_check()?;
        Ok(self.subscriber(subscriber_id))
    }

    async fn assign_plan_if_unset(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.fail_check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers
            .iter_mut()
            .find(|s| s.id == subscriber_id && s.current_plan_id.is_none())
        {
            Some(sub) => {
                sub.current_plan_id = Some(plan_id);
                sub.plan_expires_at = expires_at;
                sub.plan_updated_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn downgrade_if_expired(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.fail_check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.iter_mut().find(|s| {
            s.id == subscriber_id && matches!(s.plan_expires_at, Some(expires) if expires <= now)
        }) {
            Some(sub) => {
                sub.current_plan_id = Some(free_plan_id);
                sub.plan_expires_at = None;
                sub.plan_updated_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn begin_trial(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        trial_plan_id: Uuid,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.fail_check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.iter_mut().find(|s| {
            s.id == subscriber_id
                && s.current_plan_id == Some(free_plan_id)
                && !s.trial_taken
        }) {
            Some(sub) => {
                sub.current_plan_id = Some(trial_plan_id);
                sub.plan_expires_at = Some(expires_at);
                sub.plan_updated_at = Some(now);
                sub.trial_taken = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentRepository for MockDb {
    async fn find_open_payment(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        created_after: OffsetDateTime,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.fail_check()?;
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .iter()
            .filter(|p| {
                p.subscriber_id == subscriber_id
                    && p.plan_id == plan_id
                    && !p.status.is_terminal()
                    && p.gateway_transaction_id.is_some()
                    && p.created_at >= created_after
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn insert_pending(&self, new: NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error> {
        self.fail_check()?;
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            subscriber_id: new.subscriber_id,
            plan_id: new.plan_id,
            transaction_id: new.transaction_id,
            gateway_transaction_id: None,
            amount_cents: new.amount_cents,
            currency: new.currency,
            status: PaymentStatus::Pending,
            checkout_url: None,
            is_renewal: false,
            origin: None,
            subscription_start_date: None,
            subscription_end_date: None,
            paid_at: None,
            failure_reason: None,
            gateway_payload: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.payments.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        gateway_transaction_id: &str,
        checkout_url: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        self.fail_check()?;
        let mut payments = self.payments.lock().unwrap();
        if let Some(record) = payments.iter_mut().find(|p| p.id == payment_id) {
            record.gateway_transaction_id = Some(gateway_transaction_id.to_string());
            record.checkout_url = checkout_url.map(|s| s.to_string());
        }
        Ok(())
    }

    async fn find_payment(
        &self,
        lookup: &PaymentLookup,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.fail_check()?;
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| matches_lookup(p, lookup))
            .cloned())
    }

    async fn complete_payment(
        &self,
        lookup: &PaymentLookup,
        gateway_payload: Option<serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<CompletionOutcome, sqlx::Error> {
        self.fail_check()?;
        // Both tables stay locked for the whole decision, mirroring the
        // single-transaction guarantee of the Postgres implementation.
        let mut payments = self.payments.lock().unwrap();
        let mut subscribers = self.subscribers.lock().unwrap();
        let plans = self.plans.lock().unwrap();

        let record = match payments.iter_mut().find(|p| matches_lookup(p, lookup)) {
            Some(record) => record,
            None => return Ok(CompletionOutcome::NotFound),
        };

        match record.status {
            PaymentStatus::Completed => {
                return Ok(CompletionOutcome::AlreadyCompleted {
                    record: record.clone(),
                });
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                return Ok(CompletionOutcome::AlreadyTerminal {
                    record: record.clone(),
                });
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let subscriber = subscribers
            .iter_mut()
            .find(|s| s.id == record.subscriber_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        let plan = plans
            .iter()
            .find(|p| p.id == record.plan_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        let current_plan_kind = subscriber
            .current_plan_id
            .and_then(|id| plans.iter().find(|p| p.id == id))
            .map(|p| p.kind());

        match lifecycle::plan_change_for_completion(subscriber, current_plan_kind, plan, now) {
            Ok(change) => {
                record.status = PaymentStatus::Completed;
                record.paid_at = Some(now);
                record.is_renewal = change.is_renewal;
                record.origin = Some(change.origin);
                record.subscription_start_date = Some(change.period_start);
                record.subscription_end_date = change.period_end;
                if gateway_payload.is_some() {
                    record.gateway_payload = gateway_payload;
                }

                subscriber.current_plan_id = Some(change.plan_id);
                subscriber.plan_expires_at = change.expires_at;
                subscriber.plan_updated_at = Some(now);

                Ok(CompletionOutcome::Applied {
                    record: record.clone(),
                    subscriber: subscriber.clone(),
                    change,
                })
            }
            Err(err) => {
                record.status = PaymentStatus::Completed;
                record.paid_at = Some(now);
                if gateway_payload.is_some() {
                    record.gateway_payload = gateway_payload;
                }

                Ok(CompletionOutcome::EntitlementRejected {
                    record: record.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn mark_failed(
        &self,
        lookup: &PaymentLookup,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        self.fail_check()?;
        let mut payments = self.payments.lock().unwrap();
        match payments
            .iter_mut()
            .find(|p| matches_lookup(p, lookup) && !p.status.is_terminal())
        {
            Some(record) => {
                record.status = PaymentStatus::Failed;
                record.failure_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_cancelled(&self, lookup: &PaymentLookup) -> Result<bool, sqlx::Error> {
        self.fail_check()?;
        let mut payments = self.payments.lock().unwrap();
        match payments
            .iter_mut()
            .find(|p| matches_lookup(p, lookup) && !p.status.is_terminal())
        {
            Some(record) => {
                record.status = PaymentStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
