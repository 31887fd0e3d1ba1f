use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::ResponseDocument;
use crate::database::Repository;
use crate::error::ApiError;
use crate::services::webhook_service::{events, WebhookService};
use crate::validation::{self, FieldErrors, Validate};

const MAX_CONTENT_CHARS: usize = 200_000;

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub section: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl Validate for CreateDocumentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("section", validation::required(&self.section, 64));
        errors.check("title", validation::required(&self.title, 300));
        errors.check("content", validation::optional(Some(&self.content), MAX_CONTENT_CHARS));
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub section: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl Validate for UpdateDocumentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(section) = &self.section {
            errors.check("section", validation::required(section, 64));
        }
        if let Some(title) = &self.title {
            errors.check("title", validation::required(title, 300));
        }
        errors.check("content", validation::optional(self.content.as_deref(), MAX_CONTENT_CHARS));
        errors.into_result()
    }
}

/// Fields of a new response section, however it was written
pub struct NewDocument<'a> {
    pub section: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub generated_by_ai: bool,
}

pub struct DocumentService {
    pool: PgPool,
    webhooks: WebhookService,
}

impl DocumentService {
    pub fn new(pool: PgPool, webhooks: WebhookService) -> Self {
        Self { pool, webhooks }
    }

    async fn ensure_tender(&self, company_id: Uuid, tender_id: Uuid) -> Result<(), ApiError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenders WHERE id = $1 AND company_id = $2")
            .bind(tender_id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|_| ()).ok_or_else(|| ApiError::not_found("Tender not found"))
    }

    pub async fn list(&self, company_id: Uuid, tender_id: Uuid) -> Result<Vec<ResponseDocument>, ApiError> {
        self.ensure_tender(company_id, tender_id).await?;
        let documents = sqlx::query_as(
            "SELECT * FROM tender_documents WHERE tender_id = $1 AND company_id = $2 ORDER BY created_at",
        )
        .bind(tender_id)
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    pub async fn create(
        &self,
        company_id: Uuid,
        tender_id: Uuid,
        created_by: Uuid,
        document: NewDocument<'_>,
    ) -> Result<ResponseDocument, ApiError> {
        self.ensure_tender(company_id, tender_id).await?;
        let created: ResponseDocument = sqlx::query_as(
            r#"
            INSERT INTO tender_documents (id, company_id, tender_id, section, title, content, generated_by_ai, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(tender_id)
        .bind(document.section.trim())
        .bind(document.title.trim())
        .bind(document.content)
        .bind(document.generated_by_ai)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        self.webhooks.emit(company_id, events::DOCUMENT_CREATED, json!(created));
        Ok(created)
    }

    pub async fn update(&self, company_id: Uuid, id: Uuid, request: UpdateDocumentRequest) -> Result<ResponseDocument, ApiError> {
        sqlx::query_as(
            r#"
            UPDATE tender_documents SET
                section = COALESCE($3, section),
                title = COALESCE($4, title),
                content = COALESCE($5, content),
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(request.section.as_deref().map(str::trim))
        .bind(request.title.as_deref().map(str::trim))
        .bind(request.content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))
    }

    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        Ok(Repository::<ResponseDocument>::new("tender_documents", self.pool.clone())
            .delete(company_id, id)
            .await?)
    }
}
