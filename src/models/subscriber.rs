use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// The entitlement-relevant projection of a user account.
///
/// Invariant: `plan_expires_at` is NULL iff the current plan is free or
/// lifetime; for trial and paid plans it is always a concrete instant.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    /// NULL only between account creation and default plan assignment.
    pub current_plan_id: Option<Uuid>,
    pub plan_expires_at: Option<OffsetDateTime>,
    pub plan_updated_at: Option<OffsetDateTime>,
    /// One-way flag: set when the subscriber starts their trial, never reset.
    pub trial_taken: bool,
    pub created_at: OffsetDateTime,
}

impl Subscriber {
    /// Whether a non-null expiry has passed as of `now`.
    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        matches!(self.plan_expires_at, Some(expires) if expires <= now)
    }

    /// Whether the subscriber holds `plan_id` with an unexpired period.
    pub fn holds_active(&self, plan_id: Uuid, now: OffsetDateTime) -> bool {
        self.current_plan_id == Some(plan_id)
            && matches!(self.plan_expires_at, Some(expires) if expires > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn subscriber(expires: Option<OffsetDateTime>) -> Subscriber {
        Subscriber {
            id: Uuid::new_v4(),
            email: "viewer@example.com".into(),
            current_plan_id: Some(Uuid::new_v4()),
            plan_expires_at: expires,
            plan_updated_at: None,
            trial_taken: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn null_expiry_never_counts_as_expired() {
        let now = OffsetDateTime::now_utc();
        assert!(!subscriber(None).expired_at(now));
        assert!(subscriber(Some(now - Duration::days(1))).expired_at(now));
        assert!(!subscriber(Some(now + Duration::days(1))).expired_at(now));
    }

    #[test]
    fn holds_active_requires_same_plan_and_future_expiry() {
        let now = OffsetDateTime::now_utc();
        let sub = subscriber(Some(now + Duration::days(10)));
        let plan_id = sub.current_plan_id.unwrap();
        assert!(sub.holds_active(plan_id, now));
        assert!(!sub.holds_active(Uuid::new_v4(), now));

        let lapsed = subscriber(Some(now - Duration::minutes(1)));
        assert!(!lapsed.holds_active(lapsed.current_plan_id.unwrap(), now));
    }
}
