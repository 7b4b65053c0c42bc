use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::subscriber_repository::SubscriberRepository;
use crate::models::subscriber::Subscriber;

const SUBSCRIBER_COLUMNS: &str =
    "id, email, current_plan_id, plan_expires_at, plan_updated_at, trial_taken, created_at";

pub struct PostgresSubscriberRepository {
    pub pool: PgPool,
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber, sqlx::Error> {
        sqlx::query_as::<_, Subscriber>(&format!(
            "INSERT INTO subscribers (email) VALUES ($1) RETURNING {SUBSCRIBER_COLUMNS}"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        sqlx::query_as::<_, Subscriber>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE id = $1"
        ))
        .bind(subscriber_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn assign_plan_if_unset(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET current_plan_id = $2, plan_expires_at = $3, plan_updated_at = $4
            WHERE id = $1 AND current_plan_id IS NULL
            "#,
        )
        .bind(subscriber_id)
        .bind(plan_id)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn downgrade_if_expired(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        // The WHERE clause carries the whole expiry check, so concurrent
        // callers race harmlessly: exactly one matches, the rest see 0 rows.
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET current_plan_id = $2, plan_expires_at = NULL, plan_updated_at = $3
            WHERE id = $1
              AND plan_expires_at IS NOT NULL
              AND plan_expires_at <= $3
            "#,
        )
        .bind(subscriber_id)
        .bind(free_plan_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn begin_trial(
        &self,
        subscriber_id: Uuid,
        free_plan_id: Uuid,
        trial_plan_id: Uuid,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET current_plan_id = $3,
                plan_expires_at = $4,
                plan_updated_at = $5,
                trial_taken = TRUE
            WHERE id = $1
              AND current_plan_id = $2
              AND trial_taken = FALSE
            "#,
        )
        .bind(subscriber_id)
        .bind(free_plan_id)
        .bind(trial_plan_id)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
