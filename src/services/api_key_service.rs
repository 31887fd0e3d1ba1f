use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::ApiKey;
use crate::error::ApiError;
use crate::security::secrets::{generate_api_key, sha256_hex, API_KEY_PREFIX};
use crate::validation::{self, FieldErrors, Validate};

pub const SCOPE_READ: &str = "read";
pub const SCOPE_WRITE: &str = "write";
const DEFAULT_RATE_LIMIT_PER_MINUTE: i32 = 60;
const MAX_RATE_LIMIT_PER_MINUTE: i32 = 10_000;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub rate_limit_per_minute: Option<i32>,
}

impl Validate for CreateApiKeyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name, 120));
        if let Some(unknown) = self.scopes.iter().find(|s| *s != SCOPE_READ && *s != SCOPE_WRITE) {
            errors.add("scopes", format!("Unknown scope '{}'", unknown));
        }
        if let Some(limit) = self.rate_limit_per_minute {
            if !(1..=MAX_RATE_LIMIT_PER_MINUTE).contains(&limit) {
                errors.add("rate_limit_per_minute", format!("Must be between 1 and {}", MAX_RATE_LIMIT_PER_MINUTE));
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiKeyCreated {
    pub api_key: ApiKey,
    /// Shown once
    pub key: String,
}

/// `read` covers safe methods, `write` covers everything
pub fn scope_allows(scopes: &[String], method: &axum::http::Method) -> bool {
    if scopes.iter().any(|s| s == SCOPE_WRITE) {
        return true;
    }
    method.is_safe() && scopes.iter().any(|s| s == SCOPE_READ)
}

pub struct ApiKeyService {
    pool: PgPool,
}

impl ApiKeyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, company_id: Uuid) -> Result<Vec<ApiKey>, ApiError> {
        let keys = sqlx::query_as("SELECT * FROM api_keys WHERE company_id = $1 ORDER BY created_at DESC")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    pub async fn create(&self, company_id: Uuid, created_by: Uuid, request: CreateApiKeyRequest) -> Result<ApiKeyCreated, ApiError> {
        let generated = generate_api_key();
        let scopes = if request.scopes.is_empty() {
            vec![SCOPE_READ.to_string()]
        } else {
            request.scopes
        };

        let api_key: ApiKey = sqlx::query_as(
            r#"
            INSERT INTO api_keys (id, company_id, name, key_prefix, key_hash, scopes, rate_limit_per_minute, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(request.name.trim())
        .bind(&generated.display_prefix)
        .bind(&generated.hash)
        .bind(&scopes)
        .bind(request.rate_limit_per_minute.unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE))
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(company_id = %company_id, key_id = %api_key.id, "API key created");
        Ok(ApiKeyCreated { api_key, key: generated.plaintext })
    }

    pub async fn revoke(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND company_id = $2 AND revoked_at IS NULL")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("API key not found"));
        }
        tracing::info!(company_id = %company_id, key_id = %id, "API key revoked");
        Ok(())
    }

    /// Resolve a presented key to its active row and stamp `last_used_at`
    pub async fn authenticate(&self, presented: &str) -> Result<Option<ApiKey>, ApiError> {
        if !presented.starts_with(API_KEY_PREFIX) {
            return Ok(None);
        }
        let key = sqlx::query_as(
            "UPDATE api_keys SET last_used_at = now() WHERE key_hash = $1 AND revoked_at IS NULL RETURNING *",
        )
        .bind(sha256_hex(presented))
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn read_scope_only_allows_safe_methods() {
        let read = vec![SCOPE_READ.to_string()];
        assert!(scope_allows(&read, &Method::GET));
        assert!(!scope_allows(&read, &Method::POST));
        assert!(!scope_allows(&read, &Method::DELETE));

        let write = vec![SCOPE_WRITE.to_string()];
        assert!(scope_allows(&write, &Method::PATCH));
        assert!(!scope_allows(&[], &Method::GET));
    }

    #[test]
    fn request_validation() {
        let request = CreateApiKeyRequest {
            name: "ERP".to_string(),
            scopes: vec!["admin".to_string()],
            rate_limit_per_minute: Some(0),
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("scopes").is_some());
        assert!(body["field_errors"].get("rate_limit_per_minute").is_some());
    }
}
