use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Slug of the canonical free plan. The service refuses to start without it.
pub const FREE_PLAN_SLUG: &str = "free";

#[derive(sqlx::Type, Debug, Deserialize, Serialize, PartialEq, Eq, Copy, Clone)]
#[sqlx(type_name = "billing_period", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
    Lifetime,
    Free,
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
            BillingPeriod::Lifetime => "lifetime",
            BillingPeriod::Free => "free",
        };
        write!(f, "{}", s)
    }
}

/// Closed classification of a plan, computed once when the row is loaded.
/// Downstream logic switches on this instead of comparing prices or slugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Free,
    Trial,
    Paid(BillingPeriod),
    Lifetime,
}

impl PlanKind {
    pub fn expires(&self) -> bool {
        matches!(self, PlanKind::Trial | PlanKind::Paid(_))
    }
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Plan {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_period: BillingPeriod,
    /// NULL means unlimited.
    pub max_boards: Option<i32>,
    pub max_items_per_board: Option<i32>,
    pub can_share: bool,
    /// Marks the designated trial plan in the catalog.
    pub is_trial: bool,
    /// Price id registered with the payment gateway; NULL for unsold plans.
    pub gateway_price_id: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Plan {
    pub fn kind(&self) -> PlanKind {
        if self.is_trial {
            return PlanKind::Trial;
        }
        match self.billing_period {
            BillingPeriod::Free => PlanKind::Free,
            BillingPeriod::Lifetime => PlanKind::Lifetime,
            period => PlanKind::Paid(period),
        }
    }

    /// Whether this plan is sold through the gateway. Derived from the kind
    /// rather than the price, so a priced trial plan is still not purchasable.
    pub fn is_paid(&self) -> bool {
        matches!(self.kind(), PlanKind::Paid(_) | PlanKind::Lifetime)
    }
}
