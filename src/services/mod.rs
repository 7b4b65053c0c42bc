pub mod eligibility;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod notifier;
pub mod subscription;
