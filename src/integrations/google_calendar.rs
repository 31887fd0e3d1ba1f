use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::{ensure_success, require_key, IntegrationError};
use crate::config::IntegrationsConfig;
use crate::database::models::CalendarEvent;
use crate::security::secrets::{sign_payload, verify_hex_signature};

const SERVICE: &str = "Google Calendar";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
const STATE_MAX_AGE_SECS: i64 = 600;

#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Debug, Serialize)]
struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, config: &IntegrationsConfig) -> Self {
        Self {
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_uri: config.google_redirect_uri.clone(),
        }
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, IntegrationError> {
        require_key(SERVICE, &self.client_id)?;
        let url = Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| IntegrationError::InvalidResponse {
            service: SERVICE,
            message: e.to_string(),
        })?;
        Ok(url.into())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, IntegrationError> {
        require_key(SERVICE, &self.client_secret)?;
        let response = self.http.post(TOKEN_URL).form(form).send().await?;
        Ok(ensure_success(SERVICE, response).await?.json().await?)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, IntegrationError> {
        self.token_request(&[
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IntegrationError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    /// Push one event; returns the provider's event id
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<String, IntegrationError> {
        let (start, end) = event_times(event);
        let body = EventBody {
            summary: &event.title,
            description: event.description.as_deref(),
            location: event.location.as_deref(),
            start,
            end,
        };

        let response = self
            .http
            .post(format!("{}/calendars/{}/events", CALENDAR_API, calendar_id))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let inserted: InsertedEvent = ensure_success(SERVICE, response).await?.json().await?;
        Ok(inserted.id)
    }
}

fn event_times(event: &CalendarEvent) -> (EventTime, EventTime) {
    if event.all_day {
        let start = event.start_at.date_naive();
        let end = event
            .end_at
            .map(|e| e.date_naive())
            .filter(|e| *e > start)
            .unwrap_or_else(|| start + Duration::days(1));
        (
            EventTime { date: Some(start.to_string()), date_time: None },
            EventTime { date: Some(end.to_string()), date_time: None },
        )
    } else {
        let end = event.end_at.unwrap_or(event.start_at + Duration::hours(1));
        (
            EventTime { date: None, date_time: Some(event.start_at.to_rfc3339()) },
            EventTime { date: None, date_time: Some(end.to_rfc3339()) },
        )
    }
}

/// OAuth `state` binding the callback to the user who started the flow:
/// `{user_id}.{timestamp}.{hmac}`
pub fn oauth_state(user_id: Uuid, secret: &str, now: DateTime<Utc>) -> Option<String> {
    let ts = now.timestamp();
    let sig = sign_payload(secret, ts, user_id.to_string().as_bytes())?;
    Some(format!("{}.{}.{}", user_id, ts, sig.trim_start_matches("sha256=")))
}

pub fn verify_oauth_state(state: &str, user_id: Uuid, secret: &str, now: DateTime<Utc>) -> bool {
    let mut parts = state.splitn(3, '.');
    let (Some(uid), Some(ts), Some(sig)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let Ok(ts) = ts.parse::<i64>() else {
        return false;
    };
    uid == user_id.to_string()
        && now
            .timestamp()
            .checked_sub(ts)
            .is_some_and(|age| age <= STATE_MAX_AGE_SECS)
        && verify_hex_signature(secret, ts, uid.as_bytes(), sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_binds_user_and_expires() {
        let user = Uuid::new_v4();
        let now = Utc::now();
        let state = oauth_state(user, "secret", now).unwrap();

        assert!(verify_oauth_state(&state, user, "secret", now));
        assert!(!verify_oauth_state(&state, Uuid::new_v4(), "secret", now));
        assert!(!verify_oauth_state(&state, user, "other", now));
        assert!(!verify_oauth_state(&state, user, "secret", now + Duration::seconds(STATE_MAX_AGE_SECS + 1)));
        assert!(!verify_oauth_state("garbage", user, "secret", now));
    }

    #[test]
    fn state_with_extreme_timestamp_is_refused() {
        let user = Uuid::new_v4();
        let now = Utc::now();
        for ts in [i64::MIN, i64::MAX] {
            let state = format!("{}.{}.00", user, ts);
            assert!(!verify_oauth_state(&state, user, "secret", now));
        }
    }

    #[test]
    fn all_day_events_default_to_next_day() {
        let now = Utc::now();
        let event = CalendarEvent {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            tender_id: None,
            title: "Dépôt".to_string(),
            description: None,
            location: None,
            event_type: "deadline".to_string(),
            start_at: now,
            end_at: None,
            all_day: true,
            reminder_minutes: None,
            external_id: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        let (start, end) = event_times(&event);
        assert_eq!(start.date, Some(now.date_naive().to_string()));
        assert_eq!(end.date, Some((now.date_naive() + Duration::days(1)).to_string()));
        assert!(start.date_time.is_none());
    }
}
