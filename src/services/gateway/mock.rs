#![allow(dead_code)]
use super::{ChargeSession, CreateChargeRequest, GatewayEvent, GatewayError, PaymentGateway};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockGateway {
    pub charge_requests: Arc<Mutex<Vec<CreateChargeRequest>>>,
    pub created_sessions: Arc<Mutex<Vec<ChargeSession>>>,
    pub events: Arc<Mutex<Vec<GatewayEvent>>>,
    pub fail_charges: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.fail_charges = true;
        self
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn make_id(prefix: &str) -> String {
    format!("{}_{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_charge(
        &self,
        req: CreateChargeRequest,
    ) -> Result<ChargeSession, GatewayError> {
        if self.fail_charges {
            return Err(GatewayError::Api("simulated gateway outage".into()));
        }
        self.charge_requests.lock().unwrap().push(req.clone());

        let session = ChargeSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        };
        self.created_sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        let val: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| GatewayError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let evt = GatewayEvent {
            id,
            r#type: ty,
            payload: val,
        };
        self.events.lock().unwrap().push(evt.clone());
        Ok(evt)
    }
}
