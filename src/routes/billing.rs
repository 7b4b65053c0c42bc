use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::error;

use crate::db::payment_repository::CompletionOutcome;
use crate::models::payment::PaymentLookup;
use crate::models::subscriber::Subscriber;
use crate::responses::JsonResponse;
use crate::services::ledger::LedgerError;
use crate::services::lifecycle::LifecycleError;
use crate::services::subscription::SubscriptionError;
use crate::session::AuthSubscriber;
use crate::state::AppState;
use crate::utils::plan_limits::limits_for;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub plan_slug: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub transaction_id: String,
}

fn subscriber_view(subscriber: &Subscriber) -> serde_json::Value {
    json!({
        "id": subscriber.id,
        "current_plan_id": subscriber.current_plan_id,
        "plan_expires_at": subscriber.plan_expires_at,
    })
}

async fn current_subscriber(
    state: &AppState,
    auth: &AuthSubscriber,
    now: OffsetDateTime,
) -> Result<Subscriber, axum::response::Response> {
    match state.subscription.check_expiry(auth.subscriber_id, now).await {
        Ok(subscriber) => Ok(subscriber),
        Err(SubscriptionError::SubscriberNotFound) => {
            Err(JsonResponse::not_found("Subscriber not found").into_response())
        }
        Err(err) => {
            error!(?err, "expiry check failed");
            Err(JsonResponse::server_error("Could not load subscription").into_response())
        }
    }
}

/// Current plan limits, after the lazy expiry check has run.
pub async fn get_limits(
    State(state): State<AppState>,
    auth: AuthSubscriber,
) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    let subscriber = match current_subscriber(&state, &auth, now).await {
        Ok(subscriber) => subscriber,
        Err(resp) => return resp,
    };

    let plan = match subscriber.current_plan_id {
        Some(plan_id) => match state.plans.find_plan(plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                error!(%plan_id, "subscriber references a missing plan");
                return JsonResponse::server_error("Could not load subscription").into_response();
            }
            Err(err) => {
                error!(?err, "failed to load plan");
                return JsonResponse::server_error("Could not load subscription").into_response();
            }
        },
        None => {
            return JsonResponse::server_error("Subscriber has no plan assigned").into_response();
        }
    };

    Json(json!({
        "plan": plan.slug,
        "plan_expires_at": subscriber.plan_expires_at,
        "limits": limits_for(&plan),
    }))
    .into_response()
}

/// Starts a checkout session for a paid plan.
pub async fn checkout(
    State(state): State<AppState>,
    auth: AuthSubscriber,
    Json(body): Json<CheckoutRequest>,
) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    let subscriber = match current_subscriber(&state, &auth, now).await {
        Ok(subscriber) => subscriber,
        Err(resp) => return resp,
    };

    let plan = match state.plans.find_plan_by_slug(&body.plan_slug).await {
        Ok(Some(plan)) => plan,
        Ok(None) => return JsonResponse::not_found("Unknown plan").into_response(),
        Err(err) => {
            error!(?err, "failed to load plan by slug");
            return JsonResponse::server_error("Could not start checkout").into_response();
        }
    };

    match state.ledger.initiate(&subscriber, &plan, now).await {
        Ok(intent) => Json(json!({
            "transaction_id": intent.transaction_id,
            "checkout_url": intent.checkout_url,
        }))
        .into_response(),
        Err(LedgerError::FreePlanNotPayable(_)) => {
            JsonResponse::conflict("This plan cannot be purchased").into_response()
        }
        Err(LedgerError::PlanNotPurchasable(_)) => {
            JsonResponse::conflict("This plan is not available for purchase").into_response()
        }
        Err(LedgerError::Gateway(err)) => {
            error!(?err, "gateway refused checkout creation");
            JsonResponse::server_error(
                "The payment provider is unavailable. Please try again shortly.",
            )
            .into_response()
        }
        Err(err) => {
            error!(?err, "failed to initiate checkout");
            JsonResponse::server_error("Could not start checkout").into_response()
        }
    }
}

/// Success-redirect completion. The webhook usually wins this race; the
/// ledger collapses the duplicate into an idempotent success.
pub async fn confirm(
    State(state): State<AppState>,
    auth: AuthSubscriber,
    Json(body): Json<ConfirmRequest>,
) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    if let Err(resp) = current_subscriber(&state, &auth, now).await {
        return resp;
    }

    let lookup = PaymentLookup::TransactionId(body.transaction_id.clone());
    // Confirm only your own payments.
    match state.payments.find_payment(&lookup).await {
        Ok(Some(record)) if record.subscriber_id == auth.subscriber_id => {}
        Ok(_) => return JsonResponse::not_found("Payment not found").into_response(),
        Err(err) => {
            error!(?err, "failed to load payment record");
            return JsonResponse::server_error("Could not confirm payment").into_response();
        }
    }

    match state.ledger.complete(&lookup, None, now).await {
        Ok(CompletionOutcome::Applied { subscriber, .. }) => Json(json!({
            "status": "completed",
            "subscriber": subscriber_view(&subscriber),
        }))
        .into_response(),
        Ok(CompletionOutcome::AlreadyCompleted { .. }) => Json(json!({
            "status": "completed",
            "message": "Payment was already processed",
        }))
        .into_response(),
        Ok(CompletionOutcome::EntitlementRejected { .. }) => JsonResponse::conflict(
            "Payment was recorded but the plan could not be applied; support has been notified",
        )
        .into_response(),
        Ok(CompletionOutcome::AlreadyTerminal { .. }) => {
            JsonResponse::conflict("Payment is no longer open").into_response()
        }
        Ok(CompletionOutcome::NotFound) | Err(LedgerError::PaymentNotFound) => {
            JsonResponse::not_found("Payment not found").into_response()
        }
        Err(err) => {
            error!(?err, "payment confirmation failed");
            JsonResponse::server_error("Could not confirm payment").into_response()
        }
    }
}

/// Starts the one-time free trial.
pub async fn start_trial(
    State(state): State<AppState>,
    auth: AuthSubscriber,
) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    match state.subscription.start_trial(auth.subscriber_id, now).await {
        Ok(subscriber) => Json(json!({
            "status": "trial_started",
            "subscriber": subscriber_view(&subscriber),
        }))
        .into_response(),
        Err(SubscriptionError::Lifecycle(LifecycleError::TrialNotEligible)) => {
            JsonResponse::conflict_with_code(
                "You are not eligible for a trial",
                "trial_not_eligible",
            )
            .into_response()
        }
        Err(SubscriptionError::Lifecycle(LifecycleError::InvalidTransition(msg))) => {
            JsonResponse::conflict(&msg).into_response()
        }
        Err(SubscriptionError::SubscriberNotFound) => {
            JsonResponse::not_found("Subscriber not found").into_response()
        }
        Err(err) => {
            error!(?err, "failed to start trial");
            JsonResponse::server_error("Could not start trial").into_response()
        }
    }
}
