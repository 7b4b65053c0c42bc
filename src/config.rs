use std::env;

pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub stripe: StripeSettings,
    pub trial_plan_slug: String,
    pub lifetime_plan_slug: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
        };

        let trial_plan_slug =
            env::var("TRIAL_PLAN_SLUG").unwrap_or_else(|_| "pro-trial".to_string());
        let lifetime_plan_slug = env::var("LIFETIME_PLAN_SLUG").ok().filter(|s| !s.is_empty());

        Config {
            database_url,
            frontend_origin,
            stripe,
            trial_plan_slug,
            lifetime_plan_slug,
        }
    }
}
