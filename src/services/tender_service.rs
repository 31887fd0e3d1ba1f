use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::cache::{keys, Cache};
use crate::database::models::{Tender, TenderStatus};
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::services::team_service::TeamService;
use crate::services::webhook_service::{events, WebhookService};
use crate::validation::{self, FieldErrors, Validate};

#[derive(Debug, Default, Deserialize)]
pub struct TenderFilter {
    pub status: Option<TenderStatus>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
    pub deadline_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TenderFilter {
    fn page(&self) -> Page {
        Page { limit: self.limit, offset: self.offset }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTenderRequest {
    pub title: String,
    pub reference: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_reference: Option<String>,
    pub description: Option<String>,
    pub status: Option<TenderStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_value: Option<Decimal>,
    pub currency: Option<String>,
    pub source_url: Option<String>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTenderRequest {
    pub title: Option<String>,
    pub reference: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_reference: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "validation::nullable")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "validation::nullable")]
    pub estimated_value: Option<Option<Decimal>>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "validation::nullable")]
    pub source_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "validation::nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TenderStatus,
}

impl Validate for UpdateStatusRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn check_optional_fields(
    errors: &mut FieldErrors,
    reference: Option<&str>,
    buyer_name: Option<&str>,
    buyer_reference: Option<&str>,
    description: Option<&str>,
    estimated_value: Option<Decimal>,
    currency: Option<&str>,
    source_url: Option<&str>,
) {
    errors.check("reference", validation::optional(reference, 100));
    errors.check("buyer_name", validation::optional(buyer_name, 200));
    errors.check("buyer_reference", validation::optional(buyer_reference, 100));
    errors.check("description", validation::optional(description, 20_000));
    if estimated_value.is_some_and(|v| v.is_sign_negative()) {
        errors.add("estimated_value", "Must not be negative");
    }
    if let Some(code) = currency {
        errors.check("currency", validation::currency_code(code));
    }
    if let Some(url) = source_url {
        errors.check("source_url", validation::http_url(url, true));
    }
}

impl Validate for CreateTenderRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("title", validation::required(&self.title, 300));
        check_optional_fields(
            &mut errors,
            self.reference.as_deref(),
            self.buyer_name.as_deref(),
            self.buyer_reference.as_deref(),
            self.description.as_deref(),
            self.estimated_value,
            self.currency.as_deref(),
            self.source_url.as_deref(),
        );
        errors.into_result()
    }
}

impl Validate for UpdateTenderRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(title) = &self.title {
            errors.check("title", validation::required(title, 300));
        }
        check_optional_fields(
            &mut errors,
            self.reference.as_deref(),
            self.buyer_name.as_deref(),
            self.buyer_reference.as_deref(),
            self.description.as_deref(),
            self.estimated_value.flatten(),
            self.currency.as_deref(),
            self.source_url.as_ref().and_then(Option::as_deref),
        );
        errors.into_result()
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub struct TenderService {
    pool: PgPool,
    cache: Cache,
    webhooks: WebhookService,
}

impl TenderService {
    pub fn new(pool: PgPool, cache: Cache, webhooks: WebhookService) -> Self {
        Self { pool, cache, webhooks }
    }

    fn repository(&self) -> Repository<Tender> {
        Repository::new("tenders", self.pool.clone())
    }

    async fn invalidate_analytics(&self, company_id: Uuid) {
        self.cache.invalidate_pattern(&keys::company_analytics(company_id)).await;
    }

    async fn ensure_assignee(&self, company_id: Uuid, assignee: Option<Uuid>) -> Result<(), ApiError> {
        if let Some(user_id) = assignee {
            if !TeamService::new(self.pool.clone()).is_member(company_id, user_id).await? {
                return Err(ApiError::invalid_field("assigned_to", "Assignee is not a member of this company"));
            }
        }
        Ok(())
    }

    pub async fn list(&self, company_id: Uuid, filter: &TenderFilter) -> Result<Vec<Tender>, ApiError> {
        let page = filter.page();
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM tenders WHERE company_id = ");
        query.push_bind(company_id);

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(assignee) = filter.assigned_to {
            query.push(" AND assigned_to = ").push_bind(assignee);
        }
        if let Some(before) = filter.deadline_before {
            query.push(" AND deadline <= ").push_bind(before);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(search);
            query
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR reference ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR buyer_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query
            .push(" ORDER BY deadline ASC NULLS LAST, created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let tenders = query.build_query_as::<Tender>().fetch_all(&self.pool).await?;
        Ok(tenders)
    }

    pub async fn get(&self, company_id: Uuid, id: Uuid) -> Result<Tender, ApiError> {
        self.repository()
            .select_one(company_id, id)
            .await?
            .ok_or_else(|| ApiError::not_found("Tender not found"))
    }

    pub async fn create(&self, company_id: Uuid, created_by: Uuid, request: CreateTenderRequest) -> Result<Tender, ApiError> {
        self.ensure_assignee(company_id, request.assigned_to).await?;
        let status = request.status.unwrap_or(TenderStatus::Draft);

        let tender: Tender = sqlx::query_as(
            r#"
            INSERT INTO tenders (
                id, company_id, title, reference, buyer_name, buyer_reference, description, status,
                deadline, estimated_value, currency, source_url, assigned_to, created_by, submitted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, 'EUR'), $12, $13, $14,
                    CASE WHEN $8 = 'submitted' THEN now() END)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(request.title.trim())
        .bind(request.reference)
        .bind(request.buyer_name)
        .bind(request.buyer_reference)
        .bind(request.description)
        .bind(status.as_str())
        .bind(request.deadline)
        .bind(request.estimated_value)
        .bind(request.currency)
        .bind(request.source_url)
        .bind(request.assigned_to)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(company_id = %company_id, tender_id = %tender.id, "Tender created");
        self.invalidate_analytics(company_id).await;
        self.webhooks.emit(company_id, events::TENDER_CREATED, json!(tender));
        Ok(tender)
    }

    pub async fn update(&self, company_id: Uuid, id: Uuid, request: UpdateTenderRequest) -> Result<Tender, ApiError> {
        self.ensure_assignee(company_id, request.assigned_to.flatten()).await?;

        // Clearable columns take a "present" flag so an explicit null can unset them
        let tender: Tender = sqlx::query_as(
            r#"
            UPDATE tenders SET
                title = COALESCE($3, title),
                reference = COALESCE($4, reference),
                buyer_name = COALESCE($5, buyer_name),
                buyer_reference = COALESCE($6, buyer_reference),
                description = COALESCE($7, description),
                deadline = CASE WHEN $13 THEN $8 ELSE deadline END,
                estimated_value = CASE WHEN $14 THEN $9 ELSE estimated_value END,
                currency = COALESCE($10, currency),
                source_url = CASE WHEN $15 THEN $11 ELSE source_url END,
                assigned_to = CASE WHEN $16 THEN $12 ELSE assigned_to END,
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(request.title.as_deref().map(str::trim))
        .bind(request.reference)
        .bind(request.buyer_name)
        .bind(request.buyer_reference)
        .bind(request.description)
        .bind(request.deadline.flatten())
        .bind(request.estimated_value.flatten())
        .bind(request.currency)
        .bind(request.source_url.clone().flatten())
        .bind(request.assigned_to.flatten())
        .bind(request.deadline.is_some())
        .bind(request.estimated_value.is_some())
        .bind(request.source_url.is_some())
        .bind(request.assigned_to.is_some())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Tender not found"))?;

        self.invalidate_analytics(company_id).await;
        self.webhooks.emit(company_id, events::TENDER_UPDATED, json!(tender));
        Ok(tender)
    }

    /// Any status may be written over any other; `submitted_at` is stamped on first submission
    pub async fn update_status(&self, company_id: Uuid, id: Uuid, status: TenderStatus) -> Result<Tender, ApiError> {
        let previous = self.get(company_id, id).await?;

        let tender: Tender = sqlx::query_as(
            r#"
            UPDATE tenders SET
                status = $3,
                submitted_at = CASE WHEN $3 = 'submitted' AND submitted_at IS NULL THEN now() ELSE submitted_at END,
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Tender not found"))?;

        tracing::info!(
            tender_id = %id,
            from = %previous.status,
            to = %status,
            "Tender status changed"
        );
        self.invalidate_analytics(company_id).await;
        self.webhooks.emit(
            company_id,
            events::TENDER_STATUS_CHANGED,
            json!({ "tender": tender, "previous_status": previous.status }),
        );
        Ok(tender)
    }

    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        self.repository().delete(company_id, id).await?;
        self.invalidate_analytics(company_id).await;
        self.webhooks.emit(company_id, events::TENDER_DELETED, json!({ "id": id }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn search_patterns_escape_wildcards() {
        assert_eq!(like_pattern(" voirie "), "%voirie%");
        assert_eq!(like_pattern("100%_lot"), "%100\\%\\_lot%");
    }

    #[test]
    fn create_validation() {
        let request = CreateTenderRequest {
            title: "Réfection voirie".to_string(),
            reference: Some("2025-VOI-01".to_string()),
            buyer_name: Some("Mairie de Lyon".to_string()),
            buyer_reference: None,
            description: None,
            status: None,
            deadline: None,
            estimated_value: Some(Decimal::from_str("-1").unwrap()),
            currency: Some("eur".to_string()),
            source_url: None,
            assigned_to: None,
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("estimated_value").is_some());
        assert!(body["field_errors"].get("currency").is_some());
        assert!(body["field_errors"].get("title").is_none());
    }

    #[test]
    fn patch_distinguishes_null_from_missing() {
        let unassign: UpdateTenderRequest =
            serde_json::from_str(r#"{"assigned_to":null,"estimated_value":null}"#).unwrap();
        assert_eq!(unassign.assigned_to, Some(None));
        assert_eq!(unassign.estimated_value, Some(None));
        assert_eq!(unassign.deadline, None);
        assert!(unassign.validate().is_ok());

        let untouched: UpdateTenderRequest = serde_json::from_str(r#"{"title":"Lot 2"}"#).unwrap();
        assert!(untouched.assigned_to.is_none());
        assert!(untouched.source_url.is_none());

        let user = Uuid::new_v4();
        let assign: UpdateTenderRequest =
            serde_json::from_str(&format!(r#"{{"assigned_to":"{}","source_url":"ftp://x"}}"#, user)).unwrap();
        assert_eq!(assign.assigned_to, Some(Some(user)));
        let body = assign.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("source_url").is_some());
    }

    #[test]
    fn status_request_parses_snake_case() {
        let request: UpdateStatusRequest = serde_json::from_str(r#"{"status":"in_progress"}"#).unwrap();
        assert_eq!(request.status, TenderStatus::InProgress);
        assert!(serde_json::from_str::<UpdateStatusRequest>(r#"{"status":"archived"}"#).is_err());
    }
}
