use crate::{
    errors::ServiceError,
    events::{Event, EventSender, PaymentProvider},
    services::orders::OrderService,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_SUCCEEDED: [&str; 2] = ["checkout.session.completed", "payment_intent.succeeded"];
const HELEKET_PAID: [&str; 2] = ["paid", "paid_over"];

/// Signature material taken from webhook request headers.
#[derive(Debug, Clone, Default)]
pub struct WebhookSignature {
    /// `Stripe-Signature` header
    pub stripe: Option<String>,
    /// `x-timestamp` header
    pub timestamp: Option<String>,
    /// `x-signature` header
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub provider: PaymentProvider,
    pub event_type: String,
    pub order_id: Option<Uuid>,
    pub order_confirmed: bool,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn within_tolerance(timestamp: &str, now: i64, tolerance_secs: u64) -> bool {
    timestamp
        .trim()
        .parse::<i64>()
        .map(|ts| (now - ts).unsigned_abs() <= tolerance_secs)
        .unwrap_or(false)
}

fn invalid_signature() -> ServiceError {
    ServiceError::Unauthorized("Invalid webhook signature".to_string())
}

/// Verifies a `Stripe-Signature: t=<ts>,v1=<hex>` header. Any matching `v1` entry is accepted.
pub fn verify_stripe_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), ServiceError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(invalid_signature)?;
    if candidates.is_empty() || !within_tolerance(timestamp, now, tolerance_secs) {
        return Err(invalid_signature());
    }

    let expected = sign(secret, timestamp, payload)?;
    if candidates.iter().any(|c| constant_time_eq(&expected, c)) {
        Ok(())
    } else {
        Err(invalid_signature())
    }
}

/// Verifies `x-timestamp` / `x-signature` HMAC-SHA256 headers.
pub fn verify_timestamped_signature(
    timestamp: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), ServiceError> {
    if !within_tolerance(timestamp, now, tolerance_secs) {
        return Err(invalid_signature());
    }
    let expected = sign(secret, timestamp.trim(), payload)?;
    if constant_time_eq(&expected, signature.trim()) {
        Ok(())
    } else {
        Err(invalid_signature())
    }
}

fn parse_order_id(value: Option<&Value>) -> Option<Uuid> {
    value
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Event type and, for payment-succeeded events, the order id.
fn stripe_event(json: &Value) -> (String, Option<Uuid>) {
    let event_type = json
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let order_id = if STRIPE_SUCCEEDED.contains(&event_type.as_str()) {
        parse_order_id(json.pointer("/data/object/metadata/order_id"))
    } else {
        None
    };
    (event_type, order_id)
}

fn heleket_event(json: &Value) -> (String, Option<Uuid>) {
    let status = json
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let order_id = if HELEKET_PAID.contains(&status.as_str()) {
        parse_order_id(json.get("order_id"))
    } else {
        None
    };
    (status, order_id)
}

/// Authenticates and records payment-provider callbacks.
#[derive(Clone)]
pub struct PaymentService {
    orders: OrderService,
    event_sender: Arc<EventSender>,
    stripe_secret: Option<String>,
    heleket_secret: Option<String>,
    tolerance_secs: u64,
}

impl PaymentService {
    pub fn new(
        orders: OrderService,
        event_sender: Arc<EventSender>,
        stripe_secret: Option<String>,
        heleket_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            orders,
            event_sender,
            stripe_secret: stripe_secret.filter(|s| !s.is_empty()),
            heleket_secret: heleket_secret.filter(|s| !s.is_empty()),
            tolerance_secs,
        }
    }

    fn verify(
        &self,
        provider: PaymentProvider,
        signature: &WebhookSignature,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let now = Utc::now().timestamp();
        match provider {
            PaymentProvider::Stripe => match &self.stripe_secret {
                Some(secret) => {
                    let header = signature.stripe.as_deref().ok_or_else(invalid_signature)?;
                    verify_stripe_signature(header, payload, secret, self.tolerance_secs, now)
                }
                None => Ok(()),
            },
            PaymentProvider::Heleket => match &self.heleket_secret {
                Some(secret) => {
                    let (Some(ts), Some(sig)) = (&signature.timestamp, &signature.signature)
                    else {
                        return Err(invalid_signature());
                    };
                    verify_timestamped_signature(
                        ts,
                        sig,
                        payload,
                        secret,
                        self.tolerance_secs,
                        now,
                    )
                }
                None => Ok(()),
            },
        }
    }

    /// Verifies, parses and applies a webhook delivery.
    #[instrument(skip(self, signature, payload), fields(%provider, bytes = payload.len()))]
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        signature: &WebhookSignature,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        if let Err(e) = self.verify(provider, signature, payload) {
            warn!("webhook signature verification failed");
            return Err(e);
        }

        let json: Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid JSON payload: {}", e)))?;

        let (event_type, order_id) = match provider {
            PaymentProvider::Stripe => stripe_event(&json),
            PaymentProvider::Heleket => heleket_event(&json),
        };

        // A failed write must surface as 5xx so the provider redelivers.
        let order_confirmed = match order_id {
            Some(id) => self.orders.confirm_if_pending(id).await.map_err(|e| {
                error!(order_id = %id, error = %e, "could not confirm order from webhook");
                e
            })?,
            None => false,
        };

        self.event_sender
            .send_or_log(Event::PaymentWebhookReceived {
                provider,
                event_type: event_type.clone(),
                order_id,
                received_at: Utc::now(),
            })
            .await;

        info!(%event_type, order_id = ?order_id, order_confirmed, "webhook processed");
        Ok(WebhookOutcome {
            provider,
            event_type,
            order_id,
            order_confirmed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn stripe_signature_round_trip() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let sig = sign(SECRET, &NOW.to_string(), body).unwrap();
        let header = format!("t={},v1={}", NOW, sig);
        assert!(verify_stripe_signature(&header, body, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn stripe_signature_accepts_any_v1_entry() {
        let body = b"{}";
        let sig = sign(SECRET, &NOW.to_string(), body).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", NOW, sig);
        assert!(verify_stripe_signature(&header, body, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn stripe_signature_rejects_forged_and_stale() {
        let body = b"{}";
        let sig = sign(SECRET, &NOW.to_string(), body).unwrap();
        let forged = format!("t={},v1={}", NOW, sign("other", &NOW.to_string(), body).unwrap());
        assert!(verify_stripe_signature(&forged, body, SECRET, 300, NOW).is_err());

        let stale = format!("t={},v1={}", NOW, sig);
        assert!(verify_stripe_signature(&stale, body, SECRET, 300, NOW + 301).is_err());

        assert!(verify_stripe_signature("v1=abc", body, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn timestamped_signature_checks_body_and_clock() {
        let body = br#"{"status":"paid"}"#;
        let ts = NOW.to_string();
        let sig = sign(SECRET, &ts, body).unwrap();
        assert!(verify_timestamped_signature(&ts, &sig, body, SECRET, 300, NOW).is_ok());
        assert!(
            verify_timestamped_signature(&ts, &sig, br#"{"status":"fail"}"#, SECRET, 300, NOW)
                .is_err()
        );
        assert!(verify_timestamped_signature("soon", &sig, body, SECRET, 300, NOW).is_err());
        assert!(verify_timestamped_signature(&ts, &sig, body, SECRET, 300, NOW - 1000).is_err());
    }

    #[test]
    fn stripe_event_extracts_order_only_for_success() {
        let id = Uuid::new_v4();
        let paid = json!({
            "type": "checkout.session.completed",
            "data": {"object": {"metadata": {"order_id": id.to_string()}}}
        });
        assert_eq!(
            stripe_event(&paid),
            ("checkout.session.completed".to_string(), Some(id))
        );

        let failed = json!({
            "type": "payment_intent.payment_failed",
            "data": {"object": {"metadata": {"order_id": id.to_string()}}}
        });
        assert_eq!(stripe_event(&failed).1, None);
    }

    #[test]
    fn heleket_event_reads_status_and_order() {
        let id = Uuid::new_v4();
        let paid_over = json!({"status": "paid_over", "order_id": id.to_string()});
        assert_eq!(heleket_event(&paid_over), ("paid_over".to_string(), Some(id)));

        let pending = json!({"status": "check", "order_id": id.to_string()});
        assert_eq!(heleket_event(&pending), ("check".to_string(), None));

        let garbage = json!({"status": "paid", "order_id": "not-a-uuid"});
        assert_eq!(heleket_event(&garbage).1, None);
    }
}
