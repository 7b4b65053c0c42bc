//! Pure state-machine core for subscriber plan transitions.
//!
//! Nothing here touches storage; the repositories call these functions inside
//! their own transactions so that the decision and its persistence cannot be
//! split across transaction boundaries.

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::payment::GrantOrigin;
use crate::models::plan::{BillingPeriod, Plan, PlanKind};
use crate::models::subscriber::Subscriber;
use crate::utils::period::{add_months, add_years};

pub const TRIAL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("subscriber is not eligible for a trial")]
    TrialNotEligible,
}

/// The fully computed effect of applying a grant to a subscriber. Produced by
/// the pure functions below, persisted by the stores in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    pub plan_id: Uuid,
    pub expires_at: Option<OffsetDateTime>,
    pub origin: GrantOrigin,
    pub is_renewal: bool,
    pub period_start: OffsetDateTime,
    /// None for lifetime grants.
    pub period_end: Option<OffsetDateTime>,
}

/// Computes the plan change for a completed payment.
///
/// `current_plan_kind` is the kind of the subscriber's plan as read in the
/// same transaction (None when no plan is assigned yet). A renewal is the same
/// plan with an expiry still on the record: when a slow gateway confirmation
/// lands after the old expiry but before the lazy downgrade has fired, the
/// period is still stitched from that stale expiry so the subscriber keeps an
/// unbroken cycle rather than a late-shifted one.
pub fn plan_change_for_completion(
    subscriber: &Subscriber,
    current_plan_kind: Option<PlanKind>,
    plan: &Plan,
    now: OffsetDateTime,
) -> Result<PlanChange, LifecycleError> {
    match plan.kind() {
        PlanKind::Free => {
            return Err(LifecycleError::InvalidTransition(format!(
                "plan '{}' is free and cannot be purchased",
                plan.slug
            )));
        }
        PlanKind::Trial => {
            return Err(LifecycleError::InvalidTransition(format!(
                "plan '{}' is the trial plan and is granted, not purchased",
                plan.slug
            )));
        }
        PlanKind::Paid(_) | PlanKind::Lifetime => {}
    }

    let same_plan = subscriber.current_plan_id == Some(plan.id);
    if !same_plan {
        // No lateral switching while another paid grant is in force; the
        // caller must cancel first.
        match current_plan_kind {
            Some(PlanKind::Lifetime) => {
                return Err(LifecycleError::InvalidTransition(
                    "subscriber already holds a lifetime plan".into(),
                ));
            }
            Some(PlanKind::Paid(_)) | Some(PlanKind::Trial)
                if !subscriber.expired_at(now) && subscriber.plan_expires_at.is_some() =>
            {
                return Err(LifecycleError::InvalidTransition(
                    "subscriber already holds a different active paid plan".into(),
                ));
            }
            _ => {}
        }
    }

    let is_renewal = same_plan && subscriber.plan_expires_at.is_some();
    let base = match subscriber.plan_expires_at {
        Some(expires) if is_renewal => expires,
        _ => now,
    };

    let period_end = match plan.billing_period {
        BillingPeriod::Monthly => Some(add_months(base, 1)),
        BillingPeriod::Yearly => Some(add_years(base, 1)),
        BillingPeriod::Lifetime => None,
        // Unreachable: free plans were rejected above.
        BillingPeriod::Free => None,
    };

    Ok(PlanChange {
        plan_id: plan.id,
        expires_at: period_end,
        origin: if is_renewal {
            GrantOrigin::Renewal
        } else {
            GrantOrigin::Purchase
        },
        is_renewal,
        period_start: base,
        period_end,
    })
}

/// Computes the plan change for a free-trial start. Allowed only from the
/// free plan and only while the one-way `trial_taken` flag is unset.
pub fn plan_change_for_trial(
    subscriber: &Subscriber,
    current_plan_kind: Option<PlanKind>,
    trial_plan: &Plan,
    now: OffsetDateTime,
) -> Result<PlanChange, LifecycleError> {
    if trial_plan.kind() != PlanKind::Trial {
        return Err(LifecycleError::InvalidTransition(format!(
            "plan '{}' is not the designated trial plan",
            trial_plan.slug
        )));
    }
    if subscriber.trial_taken || current_plan_kind != Some(PlanKind::Free) {
        return Err(LifecycleError::TrialNotEligible);
    }

    let expires_at = now + Duration::days(TRIAL_DAYS);
    Ok(PlanChange {
        plan_id: trial_plan.id,
        expires_at: Some(expires_at),
        origin: GrantOrigin::Trial,
        is_renewal: false,
        period_start: now,
        period_end: Some(expires_at),
    })
}

/// Read-time expiry check. True only for a concrete expiry in the past;
/// free and lifetime plans (NULL expiry) can never become due.
pub fn expiry_due(subscriber: &Subscriber, now: OffsetDateTime) -> bool {
    subscriber.expired_at(now)
}
