use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::models::plan::Plan;
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::plan_limits::{limits_for, PlanLimits};

#[derive(Serialize)]
struct PlanView {
    slug: String,
    name: String,
    price_cents: i64,
    currency: String,
    billing_period: String,
    is_trial: bool,
    limits: PlanLimits,
}

impl From<&Plan> for PlanView {
    fn from(plan: &Plan) -> Self {
        PlanView {
            slug: plan.slug.clone(),
            name: plan.name.clone(),
            price_cents: plan.price_cents,
            currency: plan.currency.clone(),
            billing_period: plan.billing_period.to_string(),
            is_trial: plan.is_trial,
            limits: limits_for(plan),
        }
    }
}

pub async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    match state.plans.list_plans().await {
        Ok(plans) => {
            let views: Vec<PlanView> = plans.iter().map(PlanView::from).collect();
            Json(json!({ "plans": views })).into_response()
        }
        Err(err) => {
            error!(?err, "failed to list plans");
            JsonResponse::server_error("Could not load the plan catalog").into_response()
        }
    }
}
