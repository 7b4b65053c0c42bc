use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::models::payment::PaymentLookup;
use crate::responses::JsonResponse;
use crate::services::ledger::LedgerError;
use crate::state::AppState;

// Helper: extract a value from a nested json path
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_session_id(event: &serde_json::Value) -> Option<String> {
    // checkout.session payload shape: { data: { object: { id: "cs_..." } } }
    jget(event, &["data", "object", "id"])?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_failure_message(event: &serde_json::Value) -> Option<String> {
    if let Some(msg) = jget(event, &["data", "object", "last_payment_error", "message"]) {
        if let Some(s) = msg.as_str() {
            return Some(s.to_string());
        }
    }
    None
}

/// Gateway webhook. Signature-verified, then dispatched by event type; the
/// gateway retries on non-2xx, so every recognized outcome acknowledges with
/// 200 even when no action was taken.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let evt = match state.gateway.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "gateway webhook verification failed");
            return JsonResponse::bad_request("invalid webhook").into_response();
        }
    };

    let evt_type = evt.r#type.as_str();
    let payload = &evt.payload;
    let now = OffsetDateTime::now_utc();

    let session_id = match extract_session_id(payload) {
        Some(id) => id,
        None => {
            info!(evt_type, "gateway event without a session id acknowledged");
            return Json(json!({ "received": true })).into_response();
        }
    };
    let lookup = PaymentLookup::GatewayTransactionId(session_id.clone());

    match evt_type {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            match state
                .ledger
                .complete(&lookup, Some(payload.clone()), now)
                .await
            {
                Ok(outcome) => {
                    info!(evt_type, %session_id, ?outcome, "gateway completion processed");
                }
                Err(LedgerError::PaymentNotFound) => {
                    warn!(evt_type, %session_id, "completion for unknown payment record");
                }
                Err(err) => {
                    error!(?err, %session_id, "failed to apply gateway completion");
                    return JsonResponse::server_error("completion failed").into_response();
                }
            }
        }
        "checkout.session.async_payment_failed" => {
            let reason = extract_failure_message(payload)
                .unwrap_or_else(|| "payment failed at the gateway".to_string());
            if let Err(err) = state.ledger.fail(&lookup, &reason).await {
                error!(?err, %session_id, "failed to record payment failure");
                return JsonResponse::server_error("failure recording failed").into_response();
            }
        }
        "checkout.session.expired" => {
            if let Err(err) = state.ledger.cancel(&lookup).await {
                error!(?err, %session_id, "failed to record checkout expiry");
                return JsonResponse::server_error("cancel recording failed").into_response();
            }
        }
        _ => {
            info!(evt_type, "unhandled gateway event acknowledged");
        }
    }

    Json(json!({ "received": true })).into_response()
}
