use super::{ChargeSession, CreateChargeRequest, GatewayEvent, GatewayError, PaymentGateway};
use async_trait::async_trait;

pub struct LiveStripeGateway {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeGateway {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

#[async_trait]
impl PaymentGateway for LiveStripeGateway {
    async fn create_charge(
        &self,
        req: CreateChargeRequest,
    ) -> Result<ChargeSession, GatewayError> {
        let mut params = stripe::CreateCheckoutSession::new();
        // Plans are sold as one-time charges; renewals go through a fresh
        // checkout rather than a gateway-side subscription.
        params.mode = Some(stripe::CheckoutSessionMode::Payment);
        params.success_url = Some(&req.success_url);
        params.cancel_url = Some(&req.cancel_url);
        params.client_reference_id = Some(&req.client_reference_id);
        if !req.metadata.is_empty() {
            let mut m = std::collections::HashMap::new();
            for (k, v) in req.metadata.iter() {
                m.insert(k.clone(), v.clone());
            }
            params.metadata = Some(m);
        }
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(req.price_id.clone()),
            quantity: Some(req.quantity),
            ..Default::default()
        }]);

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(ChargeSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| GatewayError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| GatewayError::Serde(e.to_string()))?;
        Ok(GatewayEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }
}
