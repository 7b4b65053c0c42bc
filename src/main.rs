use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::http::Method;
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use clipdeck_billing::config::Config;
use clipdeck_billing::db::plan_repository::PlanRepository;
use clipdeck_billing::db::postgres_payment_repository::PostgresPaymentRepository;
use clipdeck_billing::db::postgres_plan_repository::PostgresPlanRepository;
use clipdeck_billing::db::postgres_subscriber_repository::PostgresSubscriberRepository;
use clipdeck_billing::models::plan::FREE_PLAN_SLUG;
use clipdeck_billing::responses::JsonResponse;
use clipdeck_billing::routes::billing::{checkout, confirm, get_limits, start_trial};
use clipdeck_billing::routes::plans::list_plans;
use clipdeck_billing::routes::subscribers::register_subscriber;
use clipdeck_billing::routes::webhook::gateway_webhook;
use clipdeck_billing::services::eligibility::StaffDomainEligibility;
use clipdeck_billing::services::gateway::LiveStripeGateway;
use clipdeck_billing::services::ledger::LedgerService;
use clipdeck_billing::services::notifier::SmtpNotifier;
use clipdeck_billing::services::subscription::SubscriptionService;
use clipdeck_billing::state::AppState;
use clipdeck_billing::utils::jwt::JwtKeys;

async fn root() -> impl IntoResponse {
    JsonResponse::success("clipdeck-billing is running")
}

async fn establish_connection(database_url: &str) -> PgPool {
    PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database")
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Stricter limiter for checkout and trial starts
    let billing_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(5)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Background task to cleanup old IPs
    let governor_limiter = global_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Config::from_env();
    let jwt_keys = JwtKeys::from_env().expect("JWT_SECRET must be a strong secret");

    let pg_pool = establish_connection(&config.database_url).await;
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .expect("Failed to run database migrations");

    let plan_repo = Arc::new(PostgresPlanRepository {
        pool: pg_pool.clone(),
    });
    let subscriber_repo = Arc::new(PostgresSubscriberRepository {
        pool: pg_pool.clone(),
    });
    let payment_repo = Arc::new(PostgresPaymentRepository {
        pool: pg_pool.clone(),
    });

    // The canonical plans are configuration; refusing to start beats running
    // with a catalog that cannot satisfy default assignment or trials.
    let free_plan = plan_repo
        .find_plan_by_slug(FREE_PLAN_SLUG)
        .await
        .expect("Failed to query the plan catalog")
        .expect("The canonical free plan is missing from the catalog");
    let trial_plan = plan_repo
        .find_plan_by_slug(&config.trial_plan_slug)
        .await
        .expect("Failed to query the plan catalog")
        .expect("The designated trial plan is missing from the catalog");
    let lifetime_plan = match &config.lifetime_plan_slug {
        Some(slug) => Some(
            plan_repo
                .find_plan_by_slug(slug)
                .await
                .expect("Failed to query the plan catalog")
                .expect("The configured lifetime plan is missing from the catalog"),
        ),
        None => None,
    };

    let gateway = Arc::new(LiveStripeGateway::from_settings(&config.stripe));
    let notifier = Arc::new(SmtpNotifier::new().expect("Failed to initialize notifier"));
    let eligibility = Arc::new(StaffDomainEligibility::from_env());

    let subscription = Arc::new(SubscriptionService::new(
        subscriber_repo.clone(),
        plan_repo.clone(),
        eligibility,
        notifier.clone(),
        free_plan,
        trial_plan,
        lifetime_plan,
    ));
    let ledger = Arc::new(LedgerService::new(
        payment_repo.clone(),
        plan_repo.clone(),
        gateway.clone(),
        notifier.clone(),
        config.frontend_origin.clone(),
    ));

    let state = AppState {
        plans: plan_repo,
        subscribers: subscriber_repo,
        payments: payment_repo,
        gateway,
        subscription,
        ledger,
        jwt_keys: Arc::new(jwt_keys),
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let billing_routes = Router::new()
        .route("/limits", get(get_limits))
        .route("/checkout", post(checkout))
        .route("/confirm", post(confirm))
        .route("/trial", post(start_trial))
        .layer(GovernorLayer {
            config: billing_governor_conf.clone(),
        });

    // Public webhook route (no auth; signature-verified in the handler)
    let webhook_routes = Router::new().route("/webhook", post(gateway_webhook));

    let app = Router::new()
        .route("/", get(root))
        .route("/api/plans", get(list_plans))
        .route("/api/subscribers", post(register_subscriber))
        .nest("/api/billing", billing_routes.merge(webhook_routes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: global_governor_conf.clone(),
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await.unwrap();
    info!("Listening on http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}
