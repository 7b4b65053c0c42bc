#![allow(dead_code)]
use async_trait::async_trait;
use std::sync::Mutex;

use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;

use super::{Notifier, NotifyError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPlanChange {
    pub email: String,
    pub plan_slug: String,
    pub is_renewal: bool,
}

/// Records notifications for assertions in tests.
#[derive(Debug, Default)]
pub struct MockNotifier {
    pub plan_changes: Mutex<Vec<RecordedPlanChange>>,
    pub trial_starts: Mutex<Vec<(String, String)>>,
    pub reconciliation_alerts: Mutex<Vec<(String, String)>>,
    pub fail_send: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify_plan_changed(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
        is_renewal: bool,
    ) -> Result<(), NotifyError> {
        if self.fail_send {
            return Err(NotifyError::Other("mock failure".into()));
        }
        self.plan_changes.lock().unwrap().push(RecordedPlanChange {
            email: subscriber.email.clone(),
            plan_slug: plan.slug.clone(),
            is_renewal,
        });
        Ok(())
    }

    async fn notify_trial_started(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
    ) -> Result<(), NotifyError> {
        if self.fail_send {
            return Err(NotifyError::Other("mock failure".into()));
        }
        self.trial_starts
            .lock()
            .unwrap()
            .push((subscriber.email.clone(), plan.slug.clone()));
        Ok(())
    }

    async fn notify_reconciliation_required(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> Result<(), NotifyError> {
        if self.fail_send {
            return Err(NotifyError::Other("mock failure".into()));
        }
        self.reconciliation_alerts
            .lock()
            .unwrap()
            .push((transaction_id.to_string(), reason.to_string()));
        Ok(())
    }
}
