use async_trait::async_trait;
use std::fmt;

use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;

#[derive(Debug)]
#[allow(dead_code)]
pub enum NotifyError {
    Other(String),
    InvalidEmailAddress(String),
    SendError(String),
    EnvVarMissing(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Other(e) => write!(f, "Error: {}", e),
            NotifyError::InvalidEmailAddress(e) => write!(f, "Invalid Address: {}", e),
            NotifyError::SendError(e) => write!(f, "Send error: {}", e),
            NotifyError::EnvVarMissing(e) => write!(f, "Env Var Missing: {}", e),
        }
    }
}

impl std::error::Error for NotifyError {}

use lettre::address::AddressError;
use lettre::transport::smtp::Error as SmtpError;

impl From<SmtpError> for NotifyError {
    fn from(err: SmtpError) -> Self {
        NotifyError::SendError(err.to_string())
    }
}

impl From<std::env::VarError> for NotifyError {
    fn from(err: std::env::VarError) -> Self {
        NotifyError::EnvVarMissing(err.to_string())
    }
}

impl From<lettre::error::Error> for NotifyError {
    fn from(err: lettre::error::Error) -> Self {
        NotifyError::SendError(err.to_string())
    }
}

impl From<AddressError> for NotifyError {
    fn from(e: AddressError) -> Self {
        NotifyError::InvalidEmailAddress(e.to_string())
    }
}

/// Outbound email seam. Notifications are best-effort: callers log failures
/// and move on, entitlements never depend on a send succeeding.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_plan_changed(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
        is_renewal: bool,
    ) -> Result<(), NotifyError>;

    async fn notify_trial_started(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
    ) -> Result<(), NotifyError>;

    /// Alerts the operations inbox that a completed charge could not be
    /// matched to an entitlement and needs a human.
    async fn notify_reconciliation_required(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> Result<(), NotifyError>;
}

mod mock;
mod smtp;

#[allow(unused_imports)]
pub use mock::MockNotifier;
pub use smtp::SmtpNotifier;
