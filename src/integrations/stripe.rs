use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ensure_success, require_key, IntegrationError};
use crate::config::IntegrationsConfig;
use crate::security::secrets::verify_hex_signature;

const SERVICE: &str = "Stripe";
const API_BASE: &str = "https://api.stripe.com/v1";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct IdAndUrl {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub number: Option<String>,
    pub status: Option<String>,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: String,
    pub created: i64,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceList {
    data: Vec<Invoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, config: &IntegrationsConfig) -> Self {
        Self {
            http,
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
        }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(&self, path: &str, form: &[(&str, String)]) -> Result<T, IntegrationError> {
        require_key(SERVICE, &self.secret_key)?;
        let response = self
            .http
            .post(format!("{}{}", API_BASE, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Ok(ensure_success(SERVICE, response).await?.json().await?)
    }

    pub async fn create_customer(&self, email: &str, company_name: &str, company_id: Uuid) -> Result<String, IntegrationError> {
        let customer: IdAndUrl = self
            .post_form(
                "/customers",
                &[
                    ("email", email.to_string()),
                    ("name", company_name.to_string()),
                    ("metadata[company_id]", company_id.to_string()),
                ],
            )
            .await?;
        Ok(customer.id)
    }

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        plan: &str,
        company_id: Uuid,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, IntegrationError> {
        let session: IdAndUrl = self
            .post_form(
                "/checkout/sessions",
                &[
                    ("mode", "subscription".to_string()),
                    ("customer", customer_id.to_string()),
                    ("line_items[0][price]", price_id.to_string()),
                    ("line_items[0][quantity]", "1".to_string()),
                    ("client_reference_id", company_id.to_string()),
                    ("metadata[plan]", plan.to_string()),
                    ("subscription_data[metadata][plan]", plan.to_string()),
                    ("subscription_data[metadata][company_id]", company_id.to_string()),
                    ("success_url", success_url.to_string()),
                    ("cancel_url", cancel_url.to_string()),
                ],
            )
            .await?;
        session.url.ok_or(IntegrationError::InvalidResponse {
            service: SERVICE,
            message: format!("checkout session {} has no url", session.id),
        })
    }

    pub async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, IntegrationError> {
        let session: IdAndUrl = self
            .post_form(
                "/billing_portal/sessions",
                &[("customer", customer_id.to_string()), ("return_url", return_url.to_string())],
            )
            .await?;
        session.url.ok_or(IntegrationError::InvalidResponse {
            service: SERVICE,
            message: format!("portal session {} has no url", session.id),
        })
    }

    pub async fn list_invoices(&self, customer_id: &str, limit: u32) -> Result<Vec<Invoice>, IntegrationError> {
        require_key(SERVICE, &self.secret_key)?;
        let response = self
            .http
            .get(format!("{}/invoices", API_BASE))
            .bearer_auth(&self.secret_key)
            .query(&[("customer", customer_id.to_string()), ("limit", limit.min(100).to_string())])
            .send()
            .await?;
        let list: InvoiceList = ensure_success(SERVICE, response).await?.json().await?;
        Ok(list.data)
    }

    /// Verify a `Stripe-Signature` header and parse the event
    pub fn construct_event(&self, payload: &[u8], signature_header: &str) -> Result<StripeEvent, IntegrationError> {
        require_key(SERVICE, &self.webhook_secret)?;
        verify_stripe_signature(&self.webhook_secret, payload, signature_header, Utc::now())?;
        serde_json::from_slice(payload).map_err(|e| IntegrationError::InvalidResponse {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

/// `t=<unix>,v1=<hex>[,v1=<hex>...]`, HMAC-SHA256 over `"{t}.{payload}"`
pub fn verify_stripe_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: DateTime<Utc>,
) -> Result<(), IntegrationError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(IntegrationError::InvalidSignature)?;
    let skew = now
        .timestamp()
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .ok_or(IntegrationError::InvalidSignature)?;
    if skew > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(IntegrationError::InvalidSignature);
    }

    if signatures
        .iter()
        .any(|sig| verify_hex_signature(secret, timestamp, payload, sig))
    {
        Ok(())
    } else {
        Err(IntegrationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::secrets::sign_payload;

    fn header_for(secret: &str, t: i64, payload: &[u8]) -> String {
        let sig = sign_payload(secret, t, payload).unwrap();
        format!("t={},v1={}", t, sig.trim_start_matches("sha256="))
    }

    #[test]
    fn accepts_valid_signature_within_tolerance() {
        let now = Utc::now();
        let payload = br#"{"id":"evt_1"}"#;
        let header = header_for("whsec_test", now.timestamp() - 10, payload);
        assert!(verify_stripe_signature("whsec_test", payload, &header, now).is_ok());
    }

    #[test]
    fn rejects_stale_or_forged_signatures() {
        let now = Utc::now();
        let payload = br#"{"id":"evt_1"}"#;

        let stale = header_for("whsec_test", now.timestamp() - 3600, payload);
        assert!(verify_stripe_signature("whsec_test", payload, &stale, now).is_err());

        let forged = header_for("whsec_other", now.timestamp(), payload);
        assert!(verify_stripe_signature("whsec_test", payload, &forged, now).is_err());

        assert!(verify_stripe_signature("whsec_test", payload, "v1=abc", now).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let now = Utc::now();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", t);
            assert!(matches!(
                verify_stripe_signature("whsec_test", b"{}", &header, now),
                Err(IntegrationError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let now = Utc::now();
        let payload = b"{}";
        let valid = header_for("whsec_test", now.timestamp(), payload);
        let header = format!("{},v1=deadbeef", valid);
        assert!(verify_stripe_signature("whsec_test", payload, &header, now).is_ok());
    }

    #[test]
    fn event_shape_deserializes() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_1","type":"customer.subscription.updated","data":{"object":{"status":"active"}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "customer.subscription.updated");
        assert_eq!(event.data.object["status"], "active");
    }
}
