//! Outbound webhooks: registration, signed delivery and the delivery log.
//!
//! Each delivery is a single POST bounded by the webhook's `timeout_ms`.
//! `retry_count` is stored with the webhook but no retry loop runs.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{Webhook, WebhookDelivery};
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::security::secrets::{generate_webhook_secret, sign_payload};
use crate::validation::{self, FieldErrors, Validate};

pub mod events {
    pub const TENDER_CREATED: &str = "tender.created";
    pub const TENDER_UPDATED: &str = "tender.updated";
    pub const TENDER_STATUS_CHANGED: &str = "tender.status_changed";
    pub const TENDER_DELETED: &str = "tender.deleted";
    pub const DOCUMENT_CREATED: &str = "document.created";
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    pub const APPROVAL_APPROVED: &str = "approval.approved";
    pub const APPROVAL_REJECTED: &str = "approval.rejected";
    pub const APPROVAL_CANCELLED: &str = "approval.cancelled";
    pub const WEBHOOK_TEST: &str = "webhook.test";

    pub const SUBSCRIBABLE: &[&str] = &[
        "*",
        TENDER_CREATED,
        TENDER_UPDATED,
        TENDER_STATUS_CHANGED,
        TENDER_DELETED,
        DOCUMENT_CREATED,
        APPROVAL_REQUESTED,
        APPROVAL_APPROVED,
        APPROVAL_REJECTED,
        APPROVAL_CANCELLED,
    ];
}

const MIN_TIMEOUT_MS: i32 = 1_000;
const MAX_TIMEOUT_MS: i32 = 30_000;
const MAX_RETRY_COUNT: i32 = 10;
const ERROR_SNIPPET_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub retry_count: Option<i32>,
    pub timeout_ms: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub retry_count: Option<i32>,
    pub timeout_ms: Option<i32>,
}

fn check_events(events: &[String]) -> Result<(), String> {
    if events.is_empty() {
        return Err("Subscribe to at least one event".to_string());
    }
    match events.iter().find(|e| !events::SUBSCRIBABLE.contains(&e.as_str())) {
        Some(unknown) => Err(format!("Unknown event '{}'", unknown)),
        None => Ok(()),
    }
}

fn check_limits(errors: &mut FieldErrors, retry_count: Option<i32>, timeout_ms: Option<i32>) {
    if let Some(retries) = retry_count {
        if !(0..=MAX_RETRY_COUNT).contains(&retries) {
            errors.add("retry_count", format!("Must be between 0 and {}", MAX_RETRY_COUNT));
        }
    }
    if let Some(timeout) = timeout_ms {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout) {
            errors.add("timeout_ms", format!("Must be between {} and {}", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS));
        }
    }
}

impl Validate for CreateWebhookRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name, 120));
        errors.check("url", validation::http_url(&self.url, false));
        errors.check("events", check_events(&self.events));
        check_limits(&mut errors, self.retry_count, self.timeout_ms);
        errors.into_result()
    }
}

impl Validate for UpdateWebhookRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            errors.check("name", validation::required(name, 120));
        }
        if let Some(url) = &self.url {
            errors.check("url", validation::http_url(url, false));
        }
        if let Some(events) = &self.events {
            errors.check("events", check_events(events));
        }
        check_limits(&mut errors, self.retry_count, self.timeout_ms);
        errors.into_result()
    }
}

/// Returned once at creation; the plaintext secret is never shown again
#[derive(Debug, Serialize)]
pub struct WebhookCreated {
    pub webhook: Webhook,
    pub secret: String,
}

/// `{"event", "timestamp", "data"}`
pub fn build_payload(event: &str, data: &Value, now: DateTime<Utc>) -> Value {
    json!({
        "event": event,
        "timestamp": now.to_rfc3339(),
        "data": data,
    })
}

/// Event, unix timestamp and `sha256=` signature headers for one body
pub fn delivery_headers(secret_hash: &str, event: &str, timestamp: i64, body: &[u8]) -> Option<Vec<(&'static str, String)>> {
    let signature = sign_payload(secret_hash, timestamp, body)?;
    Some(vec![
        ("X-Webhook-Event", event.to_string()),
        ("X-Webhook-Timestamp", timestamp.to_string()),
        ("X-Webhook-Signature", signature),
    ])
}

struct Outcome {
    status_code: Option<i32>,
    success: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    http: reqwest::Client,
}

impl WebhookService {
    pub fn new(pool: PgPool, http: reqwest::Client) -> Self {
        Self { pool, http }
    }

    fn repository(&self) -> Repository<Webhook> {
        Repository::new("webhooks", self.pool.clone())
    }

    pub async fn list(&self, company_id: Uuid, page: Page) -> Result<Vec<Webhook>, ApiError> {
        Ok(self.repository().select_page(company_id, page).await?)
    }

    pub async fn get(&self, company_id: Uuid, id: Uuid) -> Result<Webhook, ApiError> {
        Ok(self.repository().select_404(company_id, id).await?)
    }

    pub async fn create(&self, company_id: Uuid, created_by: Uuid, request: CreateWebhookRequest) -> Result<WebhookCreated, ApiError> {
        let secret = generate_webhook_secret();
        let webhook: Webhook = sqlx::query_as(
            r#"
            INSERT INTO webhooks (id, company_id, name, url, events, secret_hash, retry_count, timeout_ms, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 3), COALESCE($8, 5000), $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(request.name.trim())
        .bind(&request.url)
        .bind(&request.events)
        .bind(&secret.hash)
        .bind(request.retry_count)
        .bind(request.timeout_ms)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(company_id = %company_id, webhook_id = %webhook.id, "Webhook registered");
        Ok(WebhookCreated { webhook, secret: secret.plaintext })
    }

    pub async fn update(&self, company_id: Uuid, id: Uuid, request: UpdateWebhookRequest) -> Result<Webhook, ApiError> {
        sqlx::query_as(
            r#"
            UPDATE webhooks SET
                name = COALESCE($3, name),
                url = COALESCE($4, url),
                events = COALESCE($5, events),
                is_active = COALESCE($6, is_active),
                retry_count = COALESCE($7, retry_count),
                timeout_ms = COALESCE($8, timeout_ms),
                failure_count = CASE WHEN $6 IS TRUE AND NOT is_active THEN 0 ELSE failure_count END,
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.url)
        .bind(request.events)
        .bind(request.is_active)
        .bind(request.retry_count)
        .bind(request.timeout_ms)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Webhook not found"))
    }

    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        Ok(self.repository().delete(company_id, id).await?)
    }

    pub async fn deliveries(&self, company_id: Uuid, id: Uuid, page: Page) -> Result<Vec<WebhookDelivery>, ApiError> {
        self.get(company_id, id).await?;
        let deliveries = sqlx::query_as(
            "SELECT * FROM webhook_deliveries WHERE webhook_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(deliveries)
    }

    /// Deliver a `webhook.test` event to one webhook, active or not
    pub async fn send_test(&self, company_id: Uuid, id: Uuid) -> Result<WebhookDelivery, ApiError> {
        let webhook = self.get(company_id, id).await?;
        let data = json!({ "message": "Test delivery", "webhook_id": webhook.id });
        self.deliver(&webhook, events::WEBHOOK_TEST, &data).await
    }

    /// Deliver `event` to every active, subscribed webhook of the company concurrently
    pub async fn dispatch(&self, company_id: Uuid, event: &str, data: &Value) -> Result<Vec<WebhookDelivery>, ApiError> {
        let webhooks: Vec<Webhook> = sqlx::query_as("SELECT * FROM webhooks WHERE company_id = $1 AND is_active")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;

        let targets: Vec<&Webhook> = webhooks.iter().filter(|w| w.subscribes_to(event)).collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(targets.into_iter().map(|w| self.deliver(w, event, data))).await;
        let mut deliveries = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => tracing::error!(company_id = %company_id, event, "Webhook delivery not recorded: {}", e),
            }
        }
        Ok(deliveries)
    }

    /// Fire-and-forget dispatch for use after a mutation commits
    pub fn emit(&self, company_id: Uuid, event: &'static str, data: Value) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.dispatch(company_id, event, &data).await {
                tracing::error!(company_id = %company_id, event, "Webhook dispatch failed: {}", e);
            }
        });
    }

    async fn deliver(&self, webhook: &Webhook, event: &str, data: &Value) -> Result<WebhookDelivery, ApiError> {
        let now = Utc::now();
        let payload = build_payload(event, data, now);
        let body = serde_json::to_vec(&payload)?;
        let headers = delivery_headers(&webhook.secret_hash, event, now.timestamp(), &body)
            .ok_or_else(|| ApiError::internal("Failed to sign webhook payload"))?;

        let mut request = self
            .http
            .post(&webhook.url)
            .timeout(Duration::from_millis(webhook.timeout_ms.max(1) as u64))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let started = Instant::now();
        let outcome = match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    Outcome { status_code: Some(status.as_u16() as i32), success: true, error: None }
                } else {
                    let text = response.text().await.unwrap_or_default();
                    Outcome {
                        status_code: Some(status.as_u16() as i32),
                        success: false,
                        error: Some(format!("HTTP {}: {}", status.as_u16(), text.chars().take(ERROR_SNIPPET_LEN).collect::<String>())),
                    }
                }
            }
            Err(e) if e.is_timeout() => Outcome {
                status_code: None,
                success: false,
                error: Some(format!("Timed out after {} ms", webhook.timeout_ms)),
            },
            Err(e) => Outcome { status_code: None, success: false, error: Some(e.to_string()) },
        };
        let duration_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;

        if !outcome.success {
            tracing::warn!(webhook_id = %webhook.id, event, error = ?outcome.error, "Webhook delivery failed");
        }

        let mut tx = self.pool.begin().await?;
        let delivery: WebhookDelivery = sqlx::query_as(
            r#"
            INSERT INTO webhook_deliveries (id, webhook_id, event, payload, status_code, success, error, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(webhook.id)
        .bind(event)
        .bind(&payload)
        .bind(outcome.status_code)
        .bind(outcome.success)
        .bind(&outcome.error)
        .bind(duration_ms)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE webhooks SET
                last_triggered_at = now(),
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END
            WHERE id = $1
            "#,
        )
        .bind(webhook.id)
        .bind(outcome.success)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::secrets::{sha256_hex, verify_hex_signature};

    #[test]
    fn payload_envelope() {
        let now = Utc::now();
        let payload = build_payload(events::TENDER_CREATED, &json!({"id": 1}), now);
        assert_eq!(payload["event"], "tender.created");
        assert_eq!(payload["timestamp"], now.to_rfc3339());
        assert_eq!(payload["data"]["id"], 1);
    }

    #[test]
    fn receivers_can_verify_with_hashed_secret() {
        let secret = generate_webhook_secret();
        let body = br#"{"event":"tender.created"}"#;
        let headers = delivery_headers(&secret.hash, "tender.created", 1_700_000_000, body).unwrap();

        let signature = &headers.iter().find(|(name, _)| *name == "X-Webhook-Signature").unwrap().1;
        assert!(signature.starts_with("sha256="));

        // Receiver side: derive the key from the plaintext secret it was given
        let key = sha256_hex(&secret.plaintext);
        assert!(verify_hex_signature(&key, 1_700_000_000, body, signature));
        assert!(!verify_hex_signature(&key, 1_700_000_001, body, signature));
    }

    #[test]
    fn event_subscriptions_are_checked() {
        assert!(check_events(&["*".to_string()]).is_ok());
        assert!(check_events(&["tender.created".to_string(), "approval.approved".to_string()]).is_ok());
        assert!(check_events(&[]).is_err());
        assert!(check_events(&["tender.exploded".to_string()]).is_err());
    }

    #[test]
    fn create_request_limits() {
        let request = CreateWebhookRequest {
            name: "CRM".to_string(),
            url: "https://crm.example.com/hooks".to_string(),
            events: vec!["*".to_string()],
            retry_count: Some(50),
            timeout_ms: Some(100),
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("retry_count").is_some());
        assert!(body["field_errors"].get("timeout_ms").is_some());
        assert!(body["field_errors"].get("url").is_none());
    }
}
