use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use tracing::error;

use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::jwt::{create_jwt, Claims};

const TOKEN_TTL_SECONDS: u64 = 60 * 60 * 24;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

/// Registers a subscriber, assigns their default plan, and issues a bearer
/// token for the billing endpoints.
pub async fn register_subscriber(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> impl IntoResponse {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return JsonResponse::bad_request("A valid email address is required").into_response();
    }

    let now = OffsetDateTime::now_utc();
    let subscriber = match state.subscription.register(email, now).await {
        Ok(subscriber) => subscriber,
        Err(crate::services::subscription::SubscriptionError::Store(sqlx::Error::Database(
            db_err,
        ))) if db_err.is_unique_violation() => {
            return JsonResponse::conflict("This email address is already registered")
                .into_response();
        }
        Err(err) => {
            error!(?err, "failed to register subscriber");
            return JsonResponse::server_error("Could not register subscriber").into_response();
        }
    };

    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() + TOKEN_TTL_SECONDS)
        .unwrap_or(TOKEN_TTL_SECONDS) as usize;
    let claims = Claims {
        sub: subscriber.id,
        email: subscriber.email.clone(),
        exp,
    };
    let token = match create_jwt(&claims, &state.jwt_keys) {
        Ok(token) => token,
        Err(err) => {
            error!(?err, "failed to issue token for new subscriber");
            return JsonResponse::server_error("Could not register subscriber").into_response();
        }
    };

    Json(json!({
        "subscriber": {
            "id": subscriber.id,
            "email": subscriber.email,
            "current_plan_id": subscriber.current_plan_id,
            "plan_expires_at": subscriber.plan_expires_at,
        },
        "token": token,
    }))
    .into_response()
}
