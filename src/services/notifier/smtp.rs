use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::models::plan::Plan;
use crate::models::subscriber::Subscriber;

use super::{Notifier, NotifyError};

#[derive(Clone)]
pub struct SmtpNotifier {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Mailbox,
    ops_inbox: String,
}

impl SmtpNotifier {
    pub fn new() -> Result<Self, anyhow::Error> {
        let host = std::env::var("SMTP_HOST")?;
        let username = std::env::var("SMTP_USERNAME")?;
        let password = std::env::var("SMTP_PASSWORD")?;
        let from = std::env::var("SMTP_FROM")?.parse()?;
        let port: u16 = std::env::var("SMTP_PORT")?.parse()?;
        let ops_inbox = std::env::var("OPS_ALERT_EMAIL")?;

        let disabled_tls = std::env::var("SMTP_TLS_DISABLED")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        let transport = if disabled_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
                .port(port)
                .build()
        } else {
            let creds = Credentials::new(username, password);
            let tls = TlsParameters::new(host.clone())?;

            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)?
                .port(port)
                .tls(Tls::Required(tls))
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport: Arc::new(transport),
            sender: from,
            ops_inbox,
        })
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.sender.clone())
            .to(to
                .parse()
                .map_err(|e: AddressError| NotifyError::InvalidEmailAddress(e.to_string()))?)
            .subject(subject)
            .body(body.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.into())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_plan_changed(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
        is_renewal: bool,
    ) -> Result<(), NotifyError> {
        let (subject, lead) = if is_renewal {
            ("Your plan has been renewed", "Thanks for renewing!")
        } else {
            ("Your plan is active", "Thanks for your purchase!")
        };

        let expiry_line = match subscriber.plan_expires_at {
            Some(expires) => format!("Your {} plan is active until {}.", plan.name, expires),
            None => format!("Your {} plan does not expire.", plan.name),
        };
        let body = format!("{}\n\n{}", lead, expiry_line);

        self.send_email(&subscriber.email, subject, &body).await
    }

    async fn notify_trial_started(
        &self,
        subscriber: &Subscriber,
        plan: &Plan,
    ) -> Result<(), NotifyError> {
        let expiry_line = match subscriber.plan_expires_at {
            Some(expires) => format!("Your trial runs until {}.", expires),
            None => String::new(),
        };
        let body = format!("Your {} trial has started.\n\n{}", plan.name, expiry_line);

        self.send_email(&subscriber.email, "Your trial has started", &body)
            .await
    }

    async fn notify_reconciliation_required(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> Result<(), NotifyError> {
        let body = format!(
            "A completed charge could not be applied to a subscription.\n\n\
             Transaction: {}\nReason: {}\n\n\
             The payment record is marked completed; the subscriber's plan was \
             not changed. Manual review required.",
            transaction_id, reason
        );

        self.send_email(
            &self.ops_inbox,
            "Payment reconciliation required",
            &body,
        )
        .await
    }
}
