use serde::{Serialize, Serializer};

use crate::models::plan::Plan;

/// Canonical free-tier ceilings, as seeded into the plan catalog.
pub const FREE_MAX_BOARDS: u32 = 3;
pub const FREE_MAX_ITEMS_PER_BOARD: u32 = 6;

/// A ceiling that is either absent or concrete. Unlimited is a real variant,
/// not a large number, so nothing can silently truncate against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    AtMost(u32),
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_str("unlimited"),
            Limit::AtMost(n) => serializer.serialize_u32(*n),
        }
    }
}

impl From<Option<i32>> for Limit {
    /// Catalog column convention: NULL means unlimited.
    fn from(cap: Option<i32>) -> Self {
        match cap {
            Some(n) => Limit::AtMost(n.max(0) as u32),
            None => Limit::Unlimited,
        }
    }
}

impl Limit {
    pub fn allows(&self, current_count: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::AtMost(max) => current_count < *max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub max_boards: Limit,
    pub max_items_per_board: Limit,
    pub can_share: bool,
}

/// Feature ceilings for a plan, read from its catalog row. The seeded free
/// tier caps at 3 boards / 6 items with no sharing; trial, paid and lifetime
/// rows carry NULL ceilings and sharing enabled.
pub fn limits_for(plan: &Plan) -> PlanLimits {
    PlanLimits {
        max_boards: plan.max_boards.into(),
        max_items_per_board: plan.max_items_per_board.into(),
        can_share: plan.can_share,
    }
}

/// Server-side gate, re-checked at the moment of mutation rather than at
/// render time so concurrent requests cannot slip past the ceiling.
pub fn can_create_board(plan: &Plan, current_board_count: u32) -> bool {
    limits_for(plan).max_boards.allows(current_board_count)
}

pub fn can_add_item(plan: &Plan, current_item_count: u32) -> bool {
    limits_for(plan)
        .max_items_per_board
        .allows(current_item_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::BillingPeriod;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn catalog_plan(
        period: BillingPeriod,
        max_boards: Option<i32>,
        max_items: Option<i32>,
        can_share: bool,
    ) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            slug: "test".into(),
            name: "Test".into(),
            price_cents: 0,
            currency: "usd".into(),
            billing_period: period,
            max_boards,
            max_items_per_board: max_items,
            can_share,
            is_trial: false,
            gateway_price_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn free_plan() -> Plan {
        catalog_plan(
            BillingPeriod::Free,
            Some(FREE_MAX_BOARDS as i32),
            Some(FREE_MAX_ITEMS_PER_BOARD as i32),
            false,
        )
    }

    #[test]
    fn free_tier_caps_come_from_the_catalog_row() {
        let limits = limits_for(&free_plan());
        assert_eq!(limits.max_boards, Limit::AtMost(FREE_MAX_BOARDS));
        assert_eq!(
            limits.max_items_per_board,
            Limit::AtMost(FREE_MAX_ITEMS_PER_BOARD)
        );
        assert!(!limits.can_share);
    }

    #[test]
    fn null_ceilings_map_to_the_unlimited_sentinel() {
        for period in [
            BillingPeriod::Monthly,
            BillingPeriod::Yearly,
            BillingPeriod::Lifetime,
        ] {
            let limits = limits_for(&catalog_plan(period, None, None, true));
            assert_eq!(limits.max_boards, Limit::Unlimited);
            assert_eq!(limits.max_items_per_board, Limit::Unlimited);
            assert!(limits.can_share);
        }
    }

    #[test]
    fn board_gate_blocks_at_the_free_ceiling() {
        let free = free_plan();
        assert!(can_create_board(&free, 0));
        assert!(can_create_board(&free, FREE_MAX_BOARDS - 1));
        assert!(!can_create_board(&free, FREE_MAX_BOARDS));
        // Counts above the cap (legacy data after a downgrade) stay blocked.
        assert!(!can_create_board(&free, FREE_MAX_BOARDS + 5));

        let lifetime = catalog_plan(BillingPeriod::Lifetime, None, None, true);
        assert!(can_create_board(&lifetime, 10_000));
    }

    #[test]
    fn item_gate_blocks_at_the_free_ceiling() {
        let free = free_plan();
        assert!(can_add_item(&free, FREE_MAX_ITEMS_PER_BOARD - 1));
        assert!(!can_add_item(&free, FREE_MAX_ITEMS_PER_BOARD));

        let pro = catalog_plan(BillingPeriod::Monthly, None, None, true);
        assert!(can_add_item(&pro, 999));
    }
}
