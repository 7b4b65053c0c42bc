use crate::db::{
    payment_repository::PaymentRepository, plan_repository::PlanRepository,
    subscriber_repository::SubscriberRepository,
};
use crate::services::gateway::PaymentGateway;
use crate::services::ledger::LedgerService;
use crate::services::subscription::SubscriptionService;
use crate::utils::jwt::JwtKeys;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub plans: Arc<dyn PlanRepository>,
    pub subscribers: Arc<dyn SubscriberRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub subscription: Arc<SubscriptionService>,
    pub ledger: Arc<LedgerService>,
    pub jwt_keys: Arc<JwtKeys>,
}
