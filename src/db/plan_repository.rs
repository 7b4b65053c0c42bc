use async_trait::async_trait;
use uuid::Uuid;

use crate::models::plan::Plan;

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, sqlx::Error>;
    async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>, sqlx::Error>;
    async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error>;
}
