use serde::Deserialize;
use serde_json::json;

use super::{ensure_success, require_key, IntegrationError};
use crate::config::IntegrationsConfig;

const SERVICE: &str = "Resend";
const API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl EmailClient {
    pub fn new(http: reqwest::Client, config: &IntegrationsConfig) -> Self {
        Self {
            http,
            api_key: config.resend_api_key.clone(),
            from: config.email_from.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, IntegrationError> {
        require_key(SERVICE, &self.api_key)?;
        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;
        let sent: SendResponse = ensure_success(SERVICE, response).await?.json().await?;
        Ok(sent.id)
    }
}

/// Minimal HTML escaping for values interpolated into email bodies
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub fn invitation_email(company_name: &str, role: &str, accept_url: &str) -> (String, String) {
    let subject = format!("Invitation à rejoindre {} sur TenderDesk", company_name);
    let html = format!(
        "<p>Vous avez été invité(e) à rejoindre <strong>{}</strong> en tant que {}.</p>\
         <p><a href=\"{}\">Accepter l'invitation</a></p>",
        escape_html(company_name),
        escape_html(role),
        escape_html(accept_url),
    );
    (subject, html)
}

pub fn approval_email(request_title: &str, step_name: &str, review_url: &str) -> (String, String) {
    let subject = format!("Validation requise : {}", request_title);
    let html = format!(
        "<p>La demande <strong>{}</strong> attend votre validation (étape : {}).</p>\
         <p><a href=\"{}\">Consulter la demande</a></p>",
        escape_html(request_title),
        escape_html(step_name),
        escape_html(review_url),
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<b>\"R&D\"</b>"), "&lt;b&gt;&quot;R&amp;D&quot;&lt;/b&gt;");
    }

    #[test]
    fn invitation_body_contains_escaped_company() {
        let (subject, html) = invitation_email("Dupont & Fils", "admin", "https://app.example.com/accept?token=x");
        assert!(subject.contains("Dupont & Fils"));
        assert!(html.contains("Dupont &amp; Fils"));
        assert!(html.contains("https://app.example.com/accept?token=x"));
    }
}
