//! Stripe-format webhook signatures and event payloads.
//!
//! The `Stripe-Signature` header has the form `t=<unix ts>,v1=<hex hmac>[,v1=...]`. The HMAC is
//! SHA-256 keyed with the endpoint secret over `"{t}.{raw body}"`. Deliveries older than five
//! minutes, or more than a minute in the future, are rejected.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use super::{PaidInvoice, PaymentError, Result, SubscriptionInfo, WebhookEvent, WebhookEventKind};
use crate::billingo::BillingCustomer;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a delivery
pub const TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for deliveries stamped in the future
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PaymentError::InvalidSignature(format!("invalid secret: {e}")))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a `Stripe-Signature` header value for `payload`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Result<String> {
    Ok(format!("t={timestamp},v1={}", hex::encode(compute_signature(secret, timestamp, payload)?)))
}

/// Check a `Stripe-Signature` header against `payload` at time `now`.
pub fn verify_signature(secret: &str, header: &str, payload: &str, now: i64) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(PaymentError::InvalidSignature("malformed header".to_string()));
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_string()))?,
                )
            }
            // Undecodable candidates cannot match; skip them
            "v1" => signatures.extend(hex::decode(value).ok()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".to_string()));
    }

    let Some(age) = now.checked_sub(timestamp) else {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".to_string()));
    };
    if age > TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".to_string()));
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(PaymentError::InvalidSignature("timestamp in the future".to_string()));
    }

    let expected = compute_signature(secret, timestamp, payload)?;
    let matched = signatures
        .iter()
        .any(|candidate| candidate.len() == expected.len() && bool::from(candidate.ct_eq(&expected)));

    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("signature mismatch".to_string()))
    }
}

/// Verify the delivery's signature header, then parse its body.
pub fn verify_and_parse(secret: &str, headers: &HeaderMap, body: &str) -> Result<WebhookEvent> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature header".to_string()))?;

    verify_signature(secret, header, body, Utc::now().timestamp())?;
    parse_event(body)
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    client_reference_id: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub current_period_end: Option<i64>,
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItem {
    pub current_period_end: Option<i64>,
}

impl From<SubscriptionObject> for SubscriptionInfo {
    fn from(object: SubscriptionObject) -> Self {
        // Newer API versions report the period on the subscription item
        let period_end = object.current_period_end.or_else(|| {
            object
                .items
                .as_ref()
                .and_then(|items| items.data.iter().find_map(|item| item.current_period_end))
        });

        Self {
            id: object.id,
            status: object.status,
            current_period_end: period_end.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    subscription: Option<String>,
    parent: Option<InvoiceParent>,
    #[serde(default)]
    amount_paid: i64,
    tax: Option<i64>,
    #[serde(default)]
    currency: String,
    customer_email: Option<String>,
    customer_name: Option<String>,
    customer_address: Option<InvoiceAddress>,
    #[serde(default)]
    customer_tax_ids: Vec<InvoiceTaxId>,
}

#[derive(Debug, Deserialize)]
struct InvoiceParent {
    subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct InvoiceSubscriptionDetails {
    subscription: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceAddress {
    country: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    line1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceTaxId {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRef {
    subscription: Option<String>,
}

fn object_as<T: serde::de::DeserializeOwned>(event_type: &str, object: Value) -> Result<T> {
    serde_json::from_value(object).map_err(|e| PaymentError::InvalidData(format!("invalid {event_type} object: {e}")))
}

impl InvoiceObject {
    fn subscription_id(&self) -> Option<String> {
        self.subscription.clone().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.subscription_details.as_ref())
                .and_then(|details| details.subscription.clone())
        })
    }

    fn into_paid_invoice(self) -> PaidInvoice {
        let subscription_id = self.subscription_id();
        let address = self.customer_address.unwrap_or_default();
        let email = self.customer_email.unwrap_or_default();

        PaidInvoice {
            invoice_id: self.id,
            subscription_id,
            amount_paid: Decimal::new(self.amount_paid, 2),
            tax: Decimal::new(self.tax.unwrap_or(0), 2),
            currency: self.currency.to_ascii_uppercase(),
            customer: BillingCustomer {
                name: self.customer_name.filter(|name| !name.is_empty()).unwrap_or_else(|| email.clone()),
                email,
                country: address.country.unwrap_or_default(),
                postal_code: address.postal_code.unwrap_or_default(),
                city: address.city.unwrap_or_default(),
                line1: address.line1.unwrap_or_default(),
                vat_number: self.customer_tax_ids.into_iter().find_map(|tax_id| tax_id.value),
            },
        }
    }
}

/// Parse a Stripe-format event body.
pub fn parse_event(body: &str) -> Result<WebhookEvent> {
    let envelope: EventEnvelope =
        serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("invalid event payload: {e}")))?;
    let event_type = envelope.event_type;
    let object = envelope.data.object;

    let kind = match event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = object_as(&event_type, object)?;
            let user_id = session
                .client_reference_id
                .as_deref()
                .or_else(|| session.metadata.get("user_id").map(String::as_str))
                .and_then(|id| id.parse().ok());
            WebhookEventKind::CheckoutCompleted {
                user_id,
                subscription_id: session.subscription,
            }
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let subscription: SubscriptionObject = object_as(&event_type, object)?;
            WebhookEventKind::SubscriptionChanged(subscription.into())
        }
        "customer.subscription.deleted" => {
            let subscription: SubscriptionObject = object_as(&event_type, object)?;
            WebhookEventKind::SubscriptionDeleted {
                subscription_id: subscription.id,
            }
        }
        "invoice.payment_succeeded" => {
            let invoice: InvoiceObject = object_as(&event_type, object)?;
            WebhookEventKind::PaymentSucceeded(invoice.into_paid_invoice())
        }
        "invoice.payment_failed" => {
            let invoice: SubscriptionRef = object_as(&event_type, object)?;
            WebhookEventKind::PaymentFailed {
                subscription_id: invoice.subscription,
            }
        }
        _ => WebhookEventKind::Ignored,
    };

    Ok(WebhookEvent {
        id: envelope.id,
        event_type,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_signature_round_trip() {
        let now = Utc::now().timestamp();
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign_payload(SECRET, now, payload).unwrap();
        assert!(verify_signature(SECRET, &header, payload, now).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let now = Utc::now().timestamp();
        let header = sign_payload(SECRET, now, r#"{"id":"evt_1"}"#).unwrap();
        assert!(verify_signature(SECRET, &header, r#"{"id":"evt_2"}"#, now).is_err());
        assert!(verify_signature("whsec_other", &header, r#"{"id":"evt_1"}"#, now).is_err());
    }

    #[test]
    fn test_signature_timestamp_window() {
        let now = Utc::now().timestamp();
        let payload = "{}";

        let stale = sign_payload(SECRET, now - TOLERANCE_SECS - 1, payload).unwrap();
        assert!(verify_signature(SECRET, &stale, payload, now).is_err());

        let edge = sign_payload(SECRET, now - TOLERANCE_SECS, payload).unwrap();
        assert!(verify_signature(SECRET, &edge, payload, now).is_ok());

        let future = sign_payload(SECRET, now + MAX_CLOCK_SKEW_SECS + 1, payload).unwrap();
        assert!(verify_signature(SECRET, &future, payload, now).is_err());
    }

    #[test]
    fn test_signature_extreme_timestamps_are_rejected() {
        let now = 1_700_000_000;
        for header in [format!("t={},v1=00", i64::MIN), format!("t={},v1=00", i64::MAX)] {
            let result = verify_signature(SECRET, &header, "{}", now);
            assert!(matches!(result, Err(PaymentError::InvalidSignature(_))), "{header}: {result:?}");
        }
    }

    #[test]
    fn test_signature_accepts_any_matching_v1() {
        let now = Utc::now().timestamp();
        let payload = "{}";
        let good = sign_payload(SECRET, now, payload).unwrap();
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={now},v1=deadbeef,v1={good_sig},v0=ignored");
        assert!(verify_signature(SECRET, &header, payload, now).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        let now = Utc::now().timestamp();
        assert!(verify_signature(SECRET, "garbage", "{}", now).is_err());
        assert!(verify_signature(SECRET, &format!("t={now}"), "{}", now).is_err());
        assert!(verify_signature(SECRET, "v1=abcd", "{}", now).is_err());
    }

    #[test]
    fn test_verify_and_parse_requires_header() {
        let err = verify_and_parse(SECRET, &HeaderMap::new(), "{}").unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn test_parse_checkout_completed() {
        let user_id = uuid::Uuid::new_v4();
        let body = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"client_reference_id": user_id.to_string(), "subscription": "sub_1", "metadata": {}}}
        });

        let event = parse_event(&body.to_string()).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        match event.kind {
            WebhookEventKind::CheckoutCompleted {
                user_id: parsed,
                subscription_id,
            } => {
                assert_eq!(parsed, Some(user_id));
                assert_eq!(subscription_id.as_deref(), Some("sub_1"));
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn test_parse_checkout_falls_back_to_metadata() {
        let user_id = uuid::Uuid::new_v4();
        let body = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"subscription": "sub_1", "metadata": {"user_id": user_id.to_string()}}}
        });

        match parse_event(&body.to_string()).unwrap().kind {
            WebhookEventKind::CheckoutCompleted { user_id: parsed, .. } => assert_eq!(parsed, Some(user_id)),
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn test_parse_subscription_period_from_items() {
        let body = json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "data": {"object": {"id": "sub_1", "status": "past_due", "items": {"data": [{"current_period_end": 1_800_000_000}]}}}
        });

        match parse_event(&body.to_string()).unwrap().kind {
            WebhookEventKind::SubscriptionChanged(info) => {
                assert_eq!(info.status, "past_due");
                assert!(!info.is_active());
                assert_eq!(info.current_period_end.unwrap().timestamp(), 1_800_000_000);
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn test_parse_invoice_payment_succeeded() {
        let body = json!({
            "id": "evt_3",
            "type": "invoice.payment_succeeded",
            "data": {"object": {
                "id": "in_1",
                "parent": {"subscription_details": {"subscription": "sub_9"}},
                "amount_paid": 127,
                "tax": 27,
                "currency": "eur",
                "customer_email": "payer@example.com",
                "customer_name": null,
                "customer_address": {"country": "HU", "postal_code": "1051", "city": "Budapest", "line1": "Main 1"},
                "customer_tax_ids": [{"value": "HU12345678"}]
            }}
        });

        match parse_event(&body.to_string()).unwrap().kind {
            WebhookEventKind::PaymentSucceeded(invoice) => {
                assert_eq!(invoice.subscription_id.as_deref(), Some("sub_9"));
                assert_eq!(invoice.amount_paid, Decimal::new(127, 2));
                assert_eq!(invoice.tax, Decimal::new(27, 2));
                assert_eq!(invoice.currency, "EUR");
                assert_eq!(invoice.customer.name, "payer@example.com");
                assert_eq!(invoice.customer.country, "HU");
                assert_eq!(invoice.customer.vat_number.as_deref(), Some("HU12345678"));
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let body = json!({"id": "evt_4", "type": "customer.created", "data": {"object": {"id": "cus_1"}}});
        assert!(matches!(parse_event(&body.to_string()).unwrap().kind, WebhookEventKind::Ignored));
    }

    #[test]
    fn test_malformed_known_event_is_rejected() {
        let body = json!({"id": "evt_5", "type": "customer.subscription.deleted", "data": {"object": {"status": "canceled"}}});
        assert!(matches!(parse_event(&body.to_string()), Err(PaymentError::InvalidData(_))));
    }
}
