use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{CalendarEvent, CalendarSync};
use crate::database::Repository;
use crate::error::ApiError;
use crate::format::events_to_ics;
use crate::integrations::google_calendar::TokenResponse;
use crate::integrations::GoogleCalendarClient;
use crate::validation::{self, FieldErrors, Validate};

const GOOGLE: &str = "google";
const EVENT_TYPES: &[&str] = &["deadline", "meeting", "site_visit", "submission", "reminder", "other"];
const MAX_REMINDER_MINUTES: i32 = 40_320;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tender_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    pub reminder_minutes: Option<i32>,
    pub tender_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    pub reminder_minutes: Option<i32>,
}

fn check_event_fields(
    errors: &mut FieldErrors,
    event_type: Option<&str>,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    reminder_minutes: Option<i32>,
) {
    if let Some(kind) = event_type {
        if !EVENT_TYPES.contains(&kind) {
            errors.add("event_type", format!("Must be one of {}", EVENT_TYPES.join(", ")));
        }
    }
    if let (Some(start), Some(end)) = (start_at, end_at) {
        if end < start {
            errors.add("end_at", "Must not be before start_at");
        }
    }
    if let Some(minutes) = reminder_minutes {
        if !(0..=MAX_REMINDER_MINUTES).contains(&minutes) {
            errors.add("reminder_minutes", format!("Must be between 0 and {}", MAX_REMINDER_MINUTES));
        }
    }
}

impl Validate for CreateEventRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("title", validation::required(&self.title, 300));
        errors.check("description", validation::optional(self.description.as_deref(), 5_000));
        errors.check("location", validation::optional(self.location.as_deref(), 500));
        check_event_fields(
            &mut errors,
            self.event_type.as_deref(),
            Some(self.start_at),
            self.end_at,
            self.reminder_minutes,
        );
        errors.into_result()
    }
}

impl Validate for UpdateEventRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(title) = &self.title {
            errors.check("title", validation::required(title, 300));
        }
        errors.check("description", validation::optional(self.description.as_deref(), 5_000));
        errors.check("location", validation::optional(self.location.as_deref(), 500));
        check_event_fields(&mut errors, self.event_type.as_deref(), self.start_at, self.end_at, self.reminder_minutes);
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub failed: usize,
    pub last_synced_at: DateTime<Utc>,
}

pub struct CalendarService {
    pool: PgPool,
}

impl CalendarService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, company_id: Uuid, filter: &EventFilter) -> Result<Vec<CalendarEvent>, ApiError> {
        let events = sqlx::query_as(
            r#"
            SELECT * FROM calendar_events
            WHERE company_id = $1
              AND ($2::timestamptz IS NULL OR start_at >= $2)
              AND ($3::timestamptz IS NULL OR start_at <= $3)
              AND ($4::uuid IS NULL OR tender_id = $4)
            ORDER BY start_at
            "#,
        )
        .bind(company_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.tender_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn create(&self, company_id: Uuid, created_by: Uuid, request: CreateEventRequest) -> Result<CalendarEvent, ApiError> {
        if let Some(tender_id) = request.tender_id {
            let tender: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenders WHERE id = $1 AND company_id = $2")
                .bind(tender_id)
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;
            if tender.is_none() {
                return Err(ApiError::invalid_field("tender_id", "Tender not found"));
            }
        }

        let event = sqlx::query_as(
            r#"
            INSERT INTO calendar_events (
                id, company_id, tender_id, title, description, location, event_type,
                start_at, end_at, all_day, reminder_minutes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'meeting'), $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(request.tender_id)
        .bind(request.title.trim())
        .bind(request.description)
        .bind(request.location)
        .bind(request.event_type)
        .bind(request.start_at)
        .bind(request.end_at)
        .bind(request.all_day)
        .bind(request.reminder_minutes)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    pub async fn update(&self, company_id: Uuid, id: Uuid, request: UpdateEventRequest) -> Result<CalendarEvent, ApiError> {
        sqlx::query_as(
            r#"
            UPDATE calendar_events SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                location = COALESCE($5, location),
                event_type = COALESCE($6, event_type),
                start_at = COALESCE($7, start_at),
                end_at = COALESCE($8, end_at),
                all_day = COALESCE($9, all_day),
                reminder_minutes = COALESCE($10, reminder_minutes),
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(request.title.as_deref().map(str::trim))
        .bind(request.description)
        .bind(request.location)
        .bind(request.event_type)
        .bind(request.start_at)
        .bind(request.end_at)
        .bind(request.all_day)
        .bind(request.reminder_minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Calendar event not found"))
    }

    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        Ok(Repository::<CalendarEvent>::new("calendar_events", self.pool.clone())
            .delete(company_id, id)
            .await?)
    }

    /// Every event of the company as an iCalendar document
    pub async fn export_ics(&self, company_id: Uuid) -> Result<String, ApiError> {
        let events = self.list(company_id, &EventFilter::default()).await?;
        let name: (String,) = sqlx::query_as("SELECT name FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(events_to_ics(&events, &name.0, Utc::now()))
    }

    pub async fn save_google_tokens(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        tokens: &TokenResponse,
    ) -> Result<CalendarSync, ApiError> {
        let sync = sqlx::query_as(
            r#"
            INSERT INTO calendar_syncs (id, company_id, user_id, provider, access_token, refresh_token, token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                company_id = EXCLUDED.company_id,
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, calendar_syncs.refresh_token),
                token_expires_at = EXCLUDED.token_expires_at,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(user_id)
        .bind(GOOGLE)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(user_id = %user_id, "Google Calendar connected");
        Ok(sync)
    }

    async fn google_sync(&self, user_id: Uuid) -> Result<CalendarSync, ApiError> {
        sqlx::query_as("SELECT * FROM calendar_syncs WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(GOOGLE)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::validation("Google Calendar is not connected"))
    }

    /// A usable access token, refreshed when expired or about to expire
    async fn access_token(&self, google: &GoogleCalendarClient, sync: &CalendarSync) -> Result<String, ApiError> {
        let expiring = sync
            .token_expires_at
            .is_some_and(|at| at <= Utc::now() + chrono::Duration::seconds(60));
        if !expiring {
            return Ok(sync.access_token.clone());
        }

        let refresh_token = sync
            .refresh_token
            .as_deref()
            .ok_or_else(|| ApiError::validation("Google Calendar access expired; reconnect the calendar"))?;
        let tokens = google.refresh(refresh_token).await?;
        sqlx::query("UPDATE calendar_syncs SET access_token = $2, token_expires_at = $3, updated_at = now() WHERE id = $1")
            .bind(sync.id)
            .bind(&tokens.access_token)
            .bind(tokens.expires_at(Utc::now()))
            .execute(&self.pool)
            .await?;
        tracing::debug!(user_id = %sync.user_id, "Google access token refreshed");
        Ok(tokens.access_token)
    }

    /// Push company events that have no external id yet to the user's calendar
    pub async fn sync_google(
        &self,
        google: &GoogleCalendarClient,
        company_id: Uuid,
        user_id: Uuid,
    ) -> Result<SyncReport, ApiError> {
        let sync = self.google_sync(user_id).await?;
        let token = self.access_token(google, &sync).await?;

        let pending: Vec<CalendarEvent> = sqlx::query_as(
            "SELECT * FROM calendar_events WHERE company_id = $1 AND external_id IS NULL ORDER BY start_at",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        let mut report = SyncReport { pushed: 0, failed: 0, last_synced_at: Utc::now() };
        for event in &pending {
            match google.insert_event(&token, &sync.calendar_id, event).await {
                Ok(external_id) => {
                    sqlx::query("UPDATE calendar_events SET external_id = $2, updated_at = now() WHERE id = $1")
                        .bind(event.id)
                        .bind(external_id)
                        .execute(&self.pool)
                        .await?;
                    report.pushed += 1;
                }
                Err(e) => {
                    tracing::warn!(event_id = %event.id, "Google Calendar push failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        sqlx::query("UPDATE calendar_syncs SET last_synced_at = $2, updated_at = now() WHERE id = $1")
            .bind(sync.id)
            .bind(report.last_synced_at)
            .execute(&self.pool)
            .await?;
        tracing::info!(user_id = %user_id, pushed = report.pushed, failed = report.failed, "Google Calendar synced");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn end_must_follow_start() {
        let start = Utc::now();
        let request = CreateEventRequest {
            title: "Visite de site".to_string(),
            description: None,
            location: Some("Lyon".to_string()),
            event_type: Some("site_visit".to_string()),
            start_at: start,
            end_at: Some(start - Duration::hours(1)),
            all_day: false,
            reminder_minutes: Some(30),
            tender_id: None,
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("end_at").is_some());
        assert!(body["field_errors"].get("event_type").is_none());
    }

    #[test]
    fn unknown_event_type_rejected() {
        let request = UpdateEventRequest {
            title: None,
            description: None,
            location: None,
            event_type: Some("party".to_string()),
            start_at: None,
            end_at: None,
            all_day: None,
            reminder_minutes: Some(-5),
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("event_type").is_some());
        assert!(body["field_errors"].get("reminder_minutes").is_some());
    }
}
