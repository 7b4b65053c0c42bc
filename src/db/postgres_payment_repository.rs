use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::payment_repository::{CompletionOutcome, NewPaymentRecord, PaymentRepository};
use crate::models::payment::{PaymentLookup, PaymentRecord, PaymentStatus};
use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;
use crate::services::lifecycle;

const PAYMENT_COLUMNS: &str = "id, subscriber_id, plan_id, transaction_id, \
     gateway_transaction_id, amount_cents, currency, status, checkout_url, is_renewal, origin, \
     subscription_start_date, subscription_end_date, paid_at, failure_reason, gateway_payload, \
     created_at";

pub struct PostgresPaymentRepository {
    pub pool: PgPool,
}

fn lookup_clause(lookup: &PaymentLookup) -> (&'static str, &str) {
    match lookup {
        PaymentLookup::TransactionId(id) => ("transaction_id = $1", id.as_str()),
        PaymentLookup::GatewayTransactionId(id) => ("gateway_transaction_id = $1", id.as_str()),
    }
}

async fn fetch_for_update(
    conn: &mut PgConnection,
    lookup: &PaymentLookup,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let (clause, key) = lookup_clause(lookup);
    sqlx::query_as::<_, PaymentRecord>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE {clause} FOR UPDATE"
    ))
    .bind(key)
    .fetch_optional(conn)
    .await
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_open_payment(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        created_after: OffsetDateTime,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payment_records
            WHERE subscriber_id = $1
              AND plan_id = $2
              AND status IN ('pending', 'processing')
              AND gateway_transaction_id IS NOT NULL
              AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(subscriber_id)
        .bind(plan_id)
        .bind(created_after)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_pending(&self, new: NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            INSERT INTO payment_records
                (subscriber_id, plan_id, transaction_id, amount_cents, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(new.subscriber_id)
        .bind(new.plan_id)
        .bind(&new.transaction_id)
        .bind(new.amount_cents)
        .bind(&new.currency)
        .fetch_one(&self.pool)
        .await
    }

    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        gateway_transaction_id: &str,
        checkout_url: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payment_records SET gateway_transaction_id = $2, checkout_url = $3 WHERE id = $1",
        )
        .bind(payment_id)
        .bind(gateway_transaction_id)
        .bind(checkout_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_payment(
        &self,
        lookup: &PaymentLookup,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let (clause, key) = lookup_clause(lookup);
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE {clause}"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
    }

    async fn complete_payment(
        &self,
        lookup: &PaymentLookup,
        gateway_payload: Option<serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<CompletionOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Early returns drop the transaction, which rolls back; those paths
        // only ever read.
        let record = match fetch_for_update(&mut *tx, lookup).await? {
            Some(record) => record,
            None => return Ok(CompletionOutcome::NotFound),
        };

        match record.status {
            PaymentStatus::Completed => {
                return Ok(CompletionOutcome::AlreadyCompleted { record });
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                return Ok(CompletionOutcome::AlreadyTerminal { record });
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let subscriber = sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, current_plan_id, plan_expires_at, plan_updated_at, trial_taken, \
             created_at FROM subscribers WHERE id = $1 FOR UPDATE",
        )
        .bind(record.subscriber_id)
        .fetch_one(&mut *tx)
        .await?;

        let plan = sqlx::query_as::<_, Plan>(
            "SELECT id, slug, name, price_cents, currency, billing_period, max_boards, \
             max_items_per_board, can_share, is_trial, gateway_price_id, created_at \
             FROM plans WHERE id = $1",
        )
        .bind(record.plan_id)
        .fetch_one(&mut *tx)
        .await?;

        let current_plan_kind = match subscriber.current_plan_id {
            Some(current_id) if current_id == plan.id => Some(plan.kind()),
            Some(current_id) => sqlx::query_as::<_, Plan>(
                "SELECT id, slug, name, price_cents, currency, billing_period, max_boards, \
                 max_items_per_board, can_share, is_trial, gateway_price_id, created_at \
                 FROM plans WHERE id = $1",
            )
            .bind(current_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|p| p.kind()),
            None => None,
        };

        match lifecycle::plan_change_for_completion(&subscriber, current_plan_kind, &plan, now) {
            Ok(change) => {
                let record = sqlx::query_as::<_, PaymentRecord>(&format!(
                    r#"
                    UPDATE payment_records
                    SET status = 'completed',
                        paid_at = $2,
                        is_renewal = $3,
                        origin = $4,
                        subscription_start_date = $5,
                        subscription_end_date = $6,
                        gateway_payload = COALESCE($7, gateway_payload)
                    WHERE id = $1
                    RETURNING {PAYMENT_COLUMNS}
                    "#
                ))
                .bind(record.id)
                .bind(now)
                .bind(change.is_renewal)
                .bind(change.origin)
                .bind(change.period_start)
                .bind(change.period_end)
                .bind(&gateway_payload)
                .fetch_one(&mut *tx)
                .await?;

                let subscriber = sqlx::query_as::<_, Subscriber>(
                    r#"
                    UPDATE subscribers
                    SET current_plan_id = $2, plan_expires_at = $3, plan_updated_at = $4
                    WHERE id = $1
                    RETURNING id, email, current_plan_id, plan_expires_at, plan_updated_at,
                              trial_taken, created_at
                    "#,
                )
                .bind(subscriber.id)
                .bind(change.plan_id)
                .bind(change.expires_at)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(CompletionOutcome::Applied {
                    record,
                    subscriber,
                    change,
                })
            }
            Err(err) => {
                // The charge happened; financial truth is never rolled back.
                // Record the completion and surface the rejection for manual
                // reconciliation.
                let record = sqlx::query_as::<_, PaymentRecord>(&format!(
                    r#"
                    UPDATE payment_records
                    SET status = 'completed',
                        paid_at = $2,
                        gateway_payload = COALESCE($3, gateway_payload)
                    WHERE id = $1
                    RETURNING {PAYMENT_COLUMNS}
                    "#
                ))
                .bind(record.id)
                .bind(now)
                .bind(&gateway_payload)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(CompletionOutcome::EntitlementRejected {
                    record,
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
        let (clause, key) = lookup_clause(lookup);
        let result = sqlx::query(&format!(
            r#"
            UPDATE payment_records
            SET status = 'failed', failure_reason = $2
            WHERE {clause} AND status IN ('pending', 'processing')
            "#
        ))
        .bind(key)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_cancelled(&self, lookup: &PaymentLookup) -> Result<bool, sqlx::Error> {
        let (clause, key) = lookup_clause(lookup);
        let result = sqlx::query(&format!(
            r#"
            UPDATE payment_records
            SET status = 'cancelled'
            WHERE {clause} AND status IN ('pending', 'processing')
            "#
        ))
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
