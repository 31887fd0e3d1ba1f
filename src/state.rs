use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::cache::Cache;
use crate::config::AppConfig;
use crate::integrations::Integrations;
use crate::security::RateLimiter;
use crate::services::{AnalyticsService, ApprovalService, DocumentService, TenderService, WebhookService};

/// Shared handles cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: Cache,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<AppConfig>,
    pub integrations: Integrations,
}

impl AppState {
    pub fn new(pool: PgPool, cache: Cache, config: AppConfig, integrations: Integrations) -> Self {
        Self {
            pool,
            cache,
            rate_limiter: Arc::new(RateLimiter::new()),
            config: Arc::new(config),
            integrations,
        }
    }
}

// Per-request service handles; all share the pooled connections above
impl AppState {
    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(self.pool.clone(), self.integrations.webhook_http.clone())
    }

    pub fn tenders(&self) -> TenderService {
        TenderService::new(self.pool.clone(), self.cache.clone(), self.webhooks())
    }

    pub fn documents(&self) -> DocumentService {
        DocumentService::new(self.pool.clone(), self.webhooks())
    }

    pub fn approvals(&self) -> ApprovalService {
        ApprovalService::new(
            self.pool.clone(),
            self.webhooks(),
            self.integrations.email.clone(),
            self.config.integrations.app_url.clone(),
        )
    }

    pub fn analytics(&self) -> AnalyticsService {
        AnalyticsService::new(
            self.pool.clone(),
            self.cache.clone(),
            Duration::from_secs(self.config.cache.dashboard_ttl_secs),
        )
    }
}
