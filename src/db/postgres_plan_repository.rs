use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::plan_repository::PlanRepository;
use crate::models::plan::Plan;

const PLAN_COLUMNS: &str = "id, slug, name, price_cents, currency, billing_period, max_boards, \
     max_items_per_board, can_share, is_trial, gateway_price_id, created_at";

pub struct PostgresPlanRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_cents ASC, slug ASC"
        ))
        .fetch_all(&self.pool)
        .await
    }
}
