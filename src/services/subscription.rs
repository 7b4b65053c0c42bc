use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::db::plan_repository::PlanRepository;
use crate::db::subscriber_repository::SubscriberRepository;
use crate::models::plan::{Plan, PlanKind};
use crate::models::subscriber::Subscriber;
use crate::services::eligibility::EligibilityCheck;
use crate::services::lifecycle::{self, LifecycleError};
use crate::services::notifier::Notifier;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscriber not found")]
    SubscriberNotFound,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Owns the subscriber-side transitions: default assignment at registration,
/// lazy expiry downgrades, and trial starts. Paid grants arrive through the
/// ledger instead.
pub struct SubscriptionService {
    subscribers: Arc<dyn SubscriberRepository>,
    plans: Arc<dyn PlanRepository>,
    eligibility: Arc<dyn EligibilityCheck>,
    notifier: Arc<dyn Notifier>,
    free_plan: Plan,
    trial_plan: Plan,
    lifetime_plan: Option<Plan>,
}

impl SubscriptionService {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        plans: Arc<dyn PlanRepository>,
        eligibility: Arc<dyn EligibilityCheck>,
        notifier: Arc<dyn Notifier>,
        free_plan: Plan,
        trial_plan: Plan,
        lifetime_plan: Option<Plan>,
    ) -> Self {
        Self {
            subscribers,
            plans,
            eligibility,
            notifier,
            free_plan,
            trial_plan,
            lifetime_plan,
        }
    }

    /// Registers a subscriber and assigns their default plan in one call.
    pub async fn register(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<Subscriber, SubscriptionError> {
        let subscriber = self.subscribers.insert_subscriber(email).await?;
        self.assign_default_plan(subscriber, now).await
    }

    /// Idempotent: a subscriber who already has a plan is returned unchanged.
    /// Eligible subscribers get the lifetime plan, everyone else the free one;
    /// both carry no expiry.
    pub async fn assign_default_plan(
        &self,
        subscriber: Subscriber,
        now: OffsetDateTime,
    ) -> Result<Subscriber, SubscriptionError> {
        if subscriber.current_plan_id.is_some() {
            return Ok(subscriber);
        }

        let plan = match &self.lifetime_plan {
            Some(lifetime) if self.eligibility.qualifies_for_lifetime_grant(&subscriber) => {
                lifetime
            }
            _ => &self.free_plan,
        };

        self.subscribers
            .assign_plan_if_unset(subscriber.id, plan.id, None, now)
            .await?;
        self.refetch(subscriber.id).await
    }

    /// Lazy expiry enforcement, run at the billing entry points. Downgrades a
    /// lapsed subscriber to the free plan and returns the fresh row; repeated
    /// calls and concurrent races are no-ops.
    pub async fn check_expiry(
        &self,
        subscriber_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Subscriber, SubscriptionError> {
        let subscriber = self.refetch(subscriber_id).await?;
        if !lifecycle::expiry_due(&subscriber, now) {
            return Ok(subscriber);
        }

        self.subscribers
            .downgrade_if_expired(subscriber_id, self.free_plan.id, now)
            .await?;
        self.refetch(subscriber_id).await
    }

    /// Starts the one-per-subscriber free trial. The pure check produces the
    /// precise refusal; the guarded UPDATE makes the check-then-act atomic, so
    /// a racing duplicate request loses with `TrialNotEligible` rather than a
    /// second trial.
    pub async fn start_trial(
        &self,
        subscriber_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Subscriber, SubscriptionError> {
        let subscriber = self.check_expiry(subscriber_id, now).await?;
        let current_plan_kind = self.plan_kind_of(&subscriber).await?;

        let change =
            lifecycle::plan_change_for_trial(&subscriber, current_plan_kind, &self.trial_plan, now)?;

        let expires_at = change
            .expires_at
            .ok_or_else(|| LifecycleError::InvalidTransition("trial must carry an expiry".into()))?;
        let applied = self
            .subscribers
            .begin_trial(
                subscriber_id,
                self.free_plan.id,
                self.trial_plan.id,
                expires_at,
                now,
            )
            .await?;
        if !applied {
            return Err(LifecycleError::TrialNotEligible.into());
        }

        let subscriber = self.refetch(subscriber_id).await?;
        // Best effort; a refused email never rolls back the trial.
        if let Err(err) = self
            .notifier
            .notify_trial_started(&subscriber, &self.trial_plan)
            .await
        {
            warn!(
                subscriber_id = %subscriber.id,
                error = %err,
                "failed to send trial-start notification"
            );
        }
        Ok(subscriber)
    }

    async fn plan_kind_of(
        &self,
        subscriber: &Subscriber,
    ) -> Result<Option<PlanKind>, SubscriptionError> {
        let plan_id = match subscriber.current_plan_id {
            Some(id) => id,
            None => return Ok(None),
        };
        Ok(self.plans.find_plan(plan_id).await?.map(|p| p.kind()))
    }

    async fn refetch(&self, subscriber_id: Uuid) -> Result<Subscriber, SubscriptionError> {
        self.subscribers
            .find_subscriber(subscriber_id)
            .await?
            .ok_or(SubscriptionError::SubscriberNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::MockDb;
    use crate::models::plan::BillingPeriod;
    use crate::services::eligibility::FixedEligibility;
    use crate::services::notifier::MockNotifier;
    use time::Duration;

    fn plan(slug: &str, period: BillingPeriod, price_cents: i64, is_trial: bool) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: slug.into(),
            price_cents,
            currency: "usd".into(),
            billing_period: period,
            max_boards: if price_cents == 0 && !is_trial {
                Some(3)
            } else {
                None
            },
            max_items_per_board: None,
            can_share: price_cents > 0 || is_trial,
            is_trial,
            gateway_price_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    struct Fixture {
        db: Arc<MockDb>,
        notifier: Arc<MockNotifier>,
        free: Plan,
        trial: Plan,
        lifetime: Plan,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Arc::new(MockDb::new());
            let free = db.seed_plan(plan("free", BillingPeriod::Free, 0, false));
            let trial = db.seed_plan(plan("pro-trial", BillingPeriod::Monthly, 1000, true));
            let lifetime = db.seed_plan(plan("lifetime", BillingPeriod::Lifetime, 19900, false));
            Self {
                db,
                notifier: Arc::new(MockNotifier::new()),
                free,
                trial,
                lifetime,
            }
        }

        fn service(&self, staff: bool) -> SubscriptionService {
            SubscriptionService::new(
                self.db.clone(),
                self.db.clone(),
                Arc::new(FixedEligibility(staff)),
                self.notifier.clone(),
                self.free.clone(),
                self.trial.clone(),
                Some(self.lifetime.clone()),
            )
        }
    }

    #[tokio::test]
    async fn register_assigns_free_plan_with_no_expiry() {
        let fx = Fixture::new();
        let service = fx.service(false);
        let now = OffsetDateTime::now_utc();

        let subscriber = service.register("ana@example.com", now).await.unwrap();
        assert_eq!(subscriber.current_plan_id, Some(fx.free.id));
        assert_eq!(subscriber.plan_expires_at, None);
    }

    #[tokio::test]
    async fn eligible_subscriber_gets_lifetime_grant() {
        let fx = Fixture::new();
        let service = fx.service(true);
        let now = OffsetDateTime::now_utc();

        let subscriber = service.register("ana@clipdeck.io", now).await.unwrap();
        assert_eq!(subscriber.current_plan_id, Some(fx.lifetime.id));
        assert_eq!(subscriber.plan_expires_at, None);
    }

    #[tokio::test]
    async fn default_assignment_never_overwrites_an_existing_plan() {
        let fx = Fixture::new();
        let service = fx.service(true);
        let now = OffsetDateTime::now_utc();

        let subscriber = fx.service(false).register("ana@example.com", now).await.unwrap();
        let again = service.assign_default_plan(subscriber.clone(), now).await.unwrap();
        assert_eq!(again.current_plan_id, Some(fx.free.id));
    }

    #[tokio::test]
    async fn check_expiry_downgrades_lapsed_subscriber_once() {
        let fx = Fixture::new();
        let service = fx.service(false);
        let now = OffsetDateTime::now_utc();
        let paid = fx
            .db
            .seed_plan(plan("pro-monthly", BillingPeriod::Monthly, 1000, false));

        let mut subscriber = service.register("ana@example.com", now).await.unwrap();
        subscriber.current_plan_id = Some(paid.id);
        subscriber.plan_expires_at = Some(now - Duration::days(1));
        {
            let mut rows = fx.db.subscribers.lock().unwrap();
            rows.clear();
            rows.push(subscriber.clone());
        }

        let after = service.check_expiry(subscriber.id, now).await.unwrap();
        assert_eq!(after.current_plan_id, Some(fx.free.id));
        assert_eq!(after.plan_expires_at, None);

        // Idempotent: a second pass changes nothing.
        let again = service.check_expiry(subscriber.id, now).await.unwrap();
        assert_eq!(again.current_plan_id, Some(fx.free.id));
    }

    #[tokio::test]
    async fn check_expiry_leaves_active_and_lifetime_plans_alone() {
        let fx = Fixture::new();
        let service = fx.service(true);
        let now = OffsetDateTime::now_utc();

        let subscriber = service.register("ana@clipdeck.io", now).await.unwrap();
        let after = service.check_expiry(subscriber.id, now).await.unwrap();
        assert_eq!(after.current_plan_id, Some(fx.lifetime.id));
    }

    #[tokio::test]
    async fn trial_starts_once_and_flags_forever() {
        let fx = Fixture::new();
        let service = fx.service(false);
        let now = OffsetDateTime::now_utc();

        let subscriber = service.register("ana@example.com", now).await.unwrap();
        let on_trial = service.start_trial(subscriber.id, now).await.unwrap();
        assert_eq!(on_trial.current_plan_id, Some(fx.trial.id));
        assert!(on_trial.trial_taken);
        let expires = on_trial.plan_expires_at.expect("trial must expire");
        assert_eq!(expires, now + Duration::days(7));

        // After the trial lapses and the downgrade runs, a second trial is
        // still refused.
        let later = expires + Duration::days(1);
        let downgraded = service.check_expiry(subscriber.id, later).await.unwrap();
        assert_eq!(downgraded.current_plan_id, Some(fx.free.id));
        let err = service.start_trial(subscriber.id, later).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::Lifecycle(LifecycleError::TrialNotEligible)
        ));
    }

    #[tokio::test]
    async fn unknown_subscriber_is_reported_as_missing() {
        let fx = Fixture::new();
        let service = fx.service(false);
        let now = OffsetDateTime::now_utc();

        let err = service.check_expiry(Uuid::new_v4(), now).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::SubscriberNotFound));
    }
}
