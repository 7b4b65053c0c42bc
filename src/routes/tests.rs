use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::db::mock_db::MockDb;
use crate::models::plan::{BillingPeriod, Plan};
use crate::routes::billing::{checkout, confirm, get_limits, start_trial};
use crate::routes::plans::list_plans;
use crate::routes::subscribers::register_subscriber;
use crate::routes::webhook::gateway_webhook;
use crate::services::eligibility::FixedEligibility;
use crate::services::gateway::MockGateway;
use crate::services::ledger::LedgerService;
use crate::services::notifier::MockNotifier;
use crate::services::subscription::SubscriptionService;
use crate::state::AppState;
use crate::utils::jwt::{create_jwt, Claims, JwtKeys};
use crate::utils::period::add_months;

const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

fn plan(slug: &str, period: BillingPeriod, price_cents: i64, is_trial: bool) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        slug: slug.into(),
        name: slug.into(),
        price_cents,
        currency: "usd".into(),
        billing_period: period,
        max_boards: if price_cents == 0 && !is_trial {
            Some(3)
        } else {
            None
        },
        max_items_per_board: if price_cents == 0 && !is_trial {
            Some(6)
        } else {
            None
        },
        can_share: price_cents > 0 || is_trial,
        is_trial,
        gateway_price_id: if price_cents > 0 && !is_trial {
            Some(format!("price_{slug}"))
        } else {
            None
        },
        created_at: OffsetDateTime::now_utc(),
    }
}

struct Fixture {
    db: Arc<MockDb>,
    #[allow(dead_code)]
    gateway: Arc<MockGateway>,
    notifier: Arc<MockNotifier>,
    jwt_keys: Arc<JwtKeys>,
    state: AppState,
    free: Plan,
    pro: Plan,
}

impl Fixture {
    fn new() -> Self {
        let db = Arc::new(MockDb::new());
        let free = db.seed_plan(plan("free", BillingPeriod::Free, 0, false));
        let trial = db.seed_plan(plan("pro-trial", BillingPeriod::Monthly, 1000, true));
        let pro = db.seed_plan(plan("pro-monthly", BillingPeriod::Monthly, 1000, false));
        db.seed_plan(plan("pro-yearly", BillingPeriod::Yearly, 9900, false));
        let lifetime = db.seed_plan(plan("lifetime", BillingPeriod::Lifetime, 19900, false));

        let gateway = Arc::new(MockGateway::new());
        let notifier = Arc::new(MockNotifier::new());
        let jwt_keys = Arc::new(JwtKeys::from_secret(TEST_SECRET).unwrap());

        let subscription = Arc::new(SubscriptionService::new(
            db.clone(),
            db.clone(),
            Arc::new(FixedEligibility(false)),
            notifier.clone(),
            free.clone(),
            trial,
            Some(lifetime),
        ));
        let ledger = Arc::new(LedgerService::new(
            db.clone(),
            db.clone(),
            gateway.clone(),
            notifier.clone(),
            "https://clipdeck.test".into(),
        ));

        let state = AppState {
            plans: db.clone(),
            subscribers: db.clone(),
            payments: db.clone(),
            gateway: gateway.clone(),
            subscription,
            ledger,
            jwt_keys: jwt_keys.clone(),
        };

        Self {
            db,
            gateway,
            notifier,
            jwt_keys,
            state,
            free,
            pro,
        }
    }

    fn app(&self) -> Router {
        Router::new()
            .route("/api/plans", get(list_plans))
            .route("/api/subscribers", post(register_subscriber))
            .route("/api/billing/limits", get(get_limits))
            .route("/api/billing/checkout", post(checkout))
            .route("/api/billing/confirm", post(confirm))
            .route("/api/billing/trial", post(start_trial))
            .route("/api/billing/webhook", post(gateway_webhook))
            .with_state(self.state.clone())
    }

    fn expired_token_for(&self, subscriber_id: Uuid, email: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: subscriber_id,
            email: email.into(),
            exp: now.saturating_sub(3600) as usize,
        };
        create_jwt(&claims, &self.jwt_keys).unwrap()
    }

    async fn register(&self, email: &str) -> (Uuid, String) {
        let body = self
            .request_json(
                Request::post("/api/subscribers")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "email": email }).to_string()))
                    .unwrap(),
                StatusCode::OK,
            )
            .await;
        let id = Uuid::parse_str(body["subscriber"]["id"].as_str().unwrap()).unwrap();
        let token = body["token"].as_str().unwrap().to_string();
        (id, token)
    }

    async fn request_json(&self, request: Request<Body>, expect: StatusCode) -> Value {
        let response = self.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expect);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn checkout(&self, token: &str, plan_slug: &str) -> Value {
        self.request_json(
            Request::post("/api/billing/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "plan_slug": plan_slug }).to_string()))
                .unwrap(),
            StatusCode::OK,
        )
        .await
    }

    async fn deliver_completed_webhook(&self, session_id: &str) -> Value {
        let event = json!({
            "id": format!("evt_{session_id}"),
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id, "payment_status": "paid" } }
        });
        self.request_json(
            Request::post("/api/billing/webhook")
                .header("Stripe-Signature", "t=1,v1=test")
                .body(Body::from(event.to_string()))
                .unwrap(),
            StatusCode::OK,
        )
        .await
    }

    fn gateway_session_id(&self, transaction_id: &str) -> String {
        self.db
            .payment_by_transaction_id(transaction_id)
            .unwrap()
            .gateway_transaction_id
            .unwrap()
    }

    async fn limits(&self, token: &str) -> Value {
        self.request_json(
            Request::get("/api/billing/limits")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
            StatusCode::OK,
        )
        .await
    }
}

#[tokio::test]
async fn plans_endpoint_lists_catalog_with_limits() {
    let fx = Fixture::new();
    let body = fx
        .request_json(
            Request::get("/api/plans").body(Body::empty()).unwrap(),
            StatusCode::OK,
        )
        .await;
    let plans = body["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 5);
    let free = plans.iter().find(|p| p["slug"] == "free").unwrap();
    assert_eq!(free["limits"]["max_boards"], json!(3));
    assert_eq!(free["limits"]["can_share"], json!(false));
}

#[tokio::test]
async fn registration_assigns_free_plan_and_limits_reflect_it() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;
    assert_eq!(
        fx.db.subscriber(id).unwrap().current_plan_id,
        Some(fx.free.id)
    );

    let limits = fx.limits(&token).await;
    assert_eq!(limits["plan"], json!("free"));
    assert_eq!(limits["limits"]["max_items_per_board"], json!(6));
    assert!(limits["plan_expires_at"].is_null());
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let fx = Fixture::new();
    let response = fx
        .app()
        .oneshot(
            Request::get("/api/billing/limits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_tokens_are_unauthorized() {
    let fx = Fixture::new();
    let (id, _) = fx.register("ana@example.com").await;
    let stale = fx.expired_token_for(id, "ana@example.com");

    let response = fx
        .app()
        .oneshot(
            Request::get("/api/billing/limits")
                .header(header::AUTHORIZATION, format!("Bearer {stale}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_and_webhook_upgrade_the_subscriber() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let intent = fx.checkout(&token, "pro-monthly").await;
    let txn = intent["transaction_id"].as_str().unwrap().to_string();
    assert_eq!(
        intent["checkout_url"],
        json!("https://example.test/checkout")
    );

    let session_id = fx.gateway_session_id(&txn);
    let ack = fx.deliver_completed_webhook(&session_id).await;
    assert_eq!(ack["received"], json!(true));

    let subscriber = fx.db.subscriber(id).unwrap();
    assert_eq!(subscriber.current_plan_id, Some(fx.pro.id));
    let expires = subscriber.plan_expires_at.expect("paid plan must expire");
    assert!(expires > OffsetDateTime::now_utc());

    let limits = fx.limits(&token).await;
    assert_eq!(limits["plan"], json!("pro-monthly"));
    assert_eq!(limits["limits"]["max_boards"], json!("unlimited"));
    assert_eq!(limits["limits"]["can_share"], json!(true));
}

#[tokio::test]
async fn webhook_redelivery_changes_nothing() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let intent = fx.checkout(&token, "pro-monthly").await;
    let session_id = fx.gateway_session_id(intent["transaction_id"].as_str().unwrap());
    fx.deliver_completed_webhook(&session_id).await;
    let expires = fx.db.subscriber(id).unwrap().plan_expires_at;

    fx.deliver_completed_webhook(&session_id).await;
    assert_eq!(fx.db.subscriber(id).unwrap().plan_expires_at, expires);
    assert_eq!(fx.notifier.plan_changes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn renewal_stitches_the_new_period_onto_the_old_expiry() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let first = fx.checkout(&token, "pro-monthly").await;
    let first_session = fx.gateway_session_id(first["transaction_id"].as_str().unwrap());
    fx.deliver_completed_webhook(&first_session).await;
    let first_expiry = fx.db.subscriber(id).unwrap().plan_expires_at.unwrap();

    let second = fx.checkout(&token, "pro-monthly").await;
    let second_txn = second["transaction_id"].as_str().unwrap().to_string();
    assert_ne!(second_txn, first["transaction_id"].as_str().unwrap());
    let second_session = fx.gateway_session_id(&second_txn);
    fx.deliver_completed_webhook(&second_session).await;

    let renewed = fx.db.subscriber(id).unwrap().plan_expires_at.unwrap();
    assert_eq!(renewed, add_months(first_expiry, 1));

    let record = fx.db.payment_by_transaction_id(&second_txn).unwrap();
    assert!(record.is_renewal);
}

#[tokio::test]
async fn lapsed_plan_downgrades_on_the_next_limits_read() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let intent = fx.checkout(&token, "pro-monthly").await;
    let session_id = fx.gateway_session_id(intent["transaction_id"].as_str().unwrap());
    fx.deliver_completed_webhook(&session_id).await;

    // Age the entitlement past its expiry.
    {
        let mut subscribers = fx.db.subscribers.lock().unwrap();
        let row = subscribers.iter_mut().find(|s| s.id == id).unwrap();
        row.plan_expires_at = Some(OffsetDateTime::now_utc() - Duration::days(1));
    }

    let limits = fx.limits(&token).await;
    assert_eq!(limits["plan"], json!("free"));
    assert_eq!(limits["limits"]["max_boards"], json!(3));
    let subscriber = fx.db.subscriber(id).unwrap();
    assert_eq!(subscriber.current_plan_id, Some(fx.free.id));
    assert!(subscriber.plan_expires_at.is_none());
}

#[tokio::test]
async fn confirm_after_webhook_is_an_idempotent_success() {
    let fx = Fixture::new();
    let (_, token) = fx.register("ana@example.com").await;

    let intent = fx.checkout(&token, "pro-monthly").await;
    let txn = intent["transaction_id"].as_str().unwrap().to_string();
    let session_id = fx.gateway_session_id(&txn);
    fx.deliver_completed_webhook(&session_id).await;

    let body = fx
        .request_json(
            Request::post("/api/billing/confirm")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "transaction_id": txn }).to_string()))
                .unwrap(),
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["status"], json!("completed"));
}

#[tokio::test]
async fn confirm_refuses_another_subscribers_payment() {
    let fx = Fixture::new();
    let (_, ana_token) = fx.register("ana@example.com").await;
    let (_, bo_token) = fx.register("bo@example.com").await;

    let intent = fx.checkout(&ana_token, "pro-monthly").await;
    let txn = intent["transaction_id"].as_str().unwrap();

    let response = fx
        .app()
        .oneshot(
            Request::post("/api/billing/confirm")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {bo_token}"))
                .body(Body::from(json!({ "transaction_id": txn }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_for_an_unknown_plan_is_not_found() {
    let fx = Fixture::new();
    let (_, token) = fx.register("ana@example.com").await;

    let response = fx
        .app()
        .oneshot(
            Request::post("/api/billing/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "plan_slug": "platinum" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_for_the_free_plan_is_a_conflict() {
    let fx = Fixture::new();
    let (_, token) = fx.register("ana@example.com").await;

    let response = fx
        .app()
        .oneshot(
            Request::post("/api/billing/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "plan_slug": "free" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn trial_starts_once_then_conflicts() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let body = fx
        .request_json(
            Request::post("/api/billing/trial")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["status"], json!("trial_started"));
    assert!(fx.db.subscriber(id).unwrap().trial_taken);

    let response = fx
        .app()
        .oneshot(
            Request::post("/api/billing/trial")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let fx = Fixture::new();
    let response = fx
        .app()
        .oneshot(
            Request::post("/api/billing/webhook")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failure_webhook_marks_the_record_failed() {
    let fx = Fixture::new();
    let (id, token) = fx.register("ana@example.com").await;

    let intent = fx.checkout(&token, "pro-monthly").await;
    let txn = intent["transaction_id"].as_str().unwrap().to_string();
    let session_id = fx.gateway_session_id(&txn);

    let event = json!({
        "id": "evt_fail_1",
        "type": "checkout.session.async_payment_failed",
        "data": { "object": {
            "id": session_id,
            "last_payment_error": { "message": "card declined" }
        } }
    });
    let ack = fx
        .request_json(
            Request::post("/api/billing/webhook")
                .header("Stripe-Signature", "t=1,v1=test")
                .body(Body::from(event.to_string()))
                .unwrap(),
            StatusCode::OK,
        )
        .await;
    assert_eq!(ack["received"], json!(true));

    let record = fx.db.payment_by_transaction_id(&txn).unwrap();
    assert_eq!(
        record.status,
        crate::models::payment::PaymentStatus::Failed
    );
    assert_eq!(record.failure_reason.as_deref(), Some("card declined"));
    // The subscriber never left the free plan.
    assert_eq!(fx.db.subscriber(id).unwrap().current_plan_id, Some(fx.free.id));
}
