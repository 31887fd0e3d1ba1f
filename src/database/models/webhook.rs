use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Webhook {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub is_active: bool,
    pub retry_count: i32,
    pub timeout_ms: i32,
    pub failure_count: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// `*` subscribes to every event
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == "*" || e == event)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub rate_limit_per_minute: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(events: &[&str]) -> Webhook {
        let now = Utc::now();
        Webhook {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            name: "crm".to_string(),
            url: "https://example.com/hook".to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            secret_hash: String::new(),
            is_active: true,
            retry_count: 3,
            timeout_ms: 5000,
            failure_count: 0,
            last_triggered_at: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn wildcard_subscribes_to_everything() {
        assert!(webhook(&["*"]).subscribes_to("tender.created"));
        assert!(webhook(&["tender.created"]).subscribes_to("tender.created"));
        assert!(!webhook(&["tender.created"]).subscribes_to("tender.deleted"));
        assert!(!webhook(&[]).subscribes_to("tender.created"));
    }
}
