//! Clients for third-party APIs. Each call is a single attempt bounded by the
//! shared HTTP timeout; failures surface as `EXTERNAL_API_ERROR`.

pub mod email;
pub mod google_calendar;
pub mod openai;
pub mod stripe;

use std::time::Duration;

use reqwest::Response;
use thiserror::Error;

use crate::config::IntegrationsConfig;

pub use email::EmailClient;
pub use google_calendar::GoogleCalendarClient;
pub use openai::OpenAiClient;
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from {service}: {message}")]
    InvalidResponse { service: &'static str, message: String },

    #[error("Invalid signature")]
    InvalidSignature,
}

/// All outbound clients, cloned into request handlers through `AppState`
#[derive(Clone)]
pub struct Integrations {
    /// Shared client without a global timeout; callers set one per request
    pub webhook_http: reqwest::Client,
    pub stripe: StripeClient,
    pub openai: OpenAiClient,
    pub email: EmailClient,
    pub google: GoogleCalendarClient,
}

impl Integrations {
    pub fn from_config(config: &IntegrationsConfig) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("tenderdesk-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            stripe: StripeClient::new(http.clone(), config),
            openai: OpenAiClient::new(http.clone(), config),
            email: EmailClient::new(http.clone(), config),
            google: GoogleCalendarClient::new(http, config),
            webhook_http: reqwest::Client::builder()
                .user_agent(concat!("tenderdesk-webhooks/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }
}

/// Turn a non-2xx response into `IntegrationError::Api`, keeping the provider's message
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error_description"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    Err(IntegrationError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}

pub(crate) fn require_key(service: &'static str, key: &str) -> Result<(), IntegrationError> {
    if key.is_empty() {
        return Err(IntegrationError::NotConfigured(service));
    }
    Ok(())
}
