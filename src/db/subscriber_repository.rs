use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::subscriber::Subscriber;

/// Subscriber reads plus the guarded plan mutations. Every mutation here is a
/// single conditional UPDATE so the check and the write cannot be split
/// across transactions; callers learn from the returned bool whether the
/// guard held.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber, sqlx::Error>;

    async fn find_subscriber(&self, subscriber_id: Uuid)
        -> Result<Option<Subscriber>, sqlx::Error>;

    /// Default-plan assignment on account creation. No-op (false) when a plan
    /// is already assigned.
    async fn assign_plan_if_unset(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Downgrade to the free plan, guarded on a concrete expiry in the past.
    /// Idempotent: repeated calls after the downgrade match zero rows.
    async fn downgrade_if_expired(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Trial start, guarded on `trial_taken = false` and the subscriber being
    /// on the free plan. Sets the one-way `trial_taken` flag.
    async fn begin_trial(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        trial_plan_id: Uuid,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;
}
