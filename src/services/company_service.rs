use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{Company, MemberRole, Membership};
use crate::error::ApiError;
use crate::validation::{self, FieldErrors, Validate};

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub siret: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub siret: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
}

/// SIRET: 14 digits, spaces tolerated
fn siret(value: &str) -> Result<(), String> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() == 14 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err("SIRET must contain 14 digits".to_string())
    }
}

fn check_company_fields(
    errors: &mut FieldErrors,
    siret_value: Option<&str>,
    address: Option<&str>,
    website: Option<&str>,
) {
    if let Some(value) = siret_value {
        errors.check("siret", siret(value));
    }
    errors.check("address", validation::optional(address, 500));
    if let Some(url) = website {
        errors.check("website", validation::http_url(url, true));
    }
}

impl Validate for CreateCompanyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name, 200));
        check_company_fields(&mut errors, self.siret.as_deref(), self.address.as_deref(), self.website.as_deref());
        errors.into_result()
    }
}

impl Validate for UpdateCompanyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            errors.check("name", validation::required(name, 200));
        }
        check_company_fields(&mut errors, self.siret.as_deref(), self.address.as_deref(), self.website.as_deref());
        errors.into_result()
    }
}

pub struct CompanyService {
    pool: PgPool,
}

impl CompanyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The caller's membership, if any. A user belongs to at most one company.
    pub async fn membership_for_user(&self, user_id: Uuid) -> Result<Option<Membership>, ApiError> {
        let membership = sqlx::query_as("SELECT * FROM company_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(membership)
    }

    pub async fn create(&self, owner_id: Uuid, request: CreateCompanyRequest) -> Result<Company, ApiError> {
        if self.membership_for_user(owner_id).await?.is_some() {
            return Err(ApiError::validation("You already belong to a company"));
        }

        let mut tx = self.pool.begin().await?;
        let company: Company = sqlx::query_as(
            "INSERT INTO companies (id, name, siret, address, website) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(request.siret)
        .bind(request.address)
        .bind(request.website)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO company_members (id, company_id, user_id, role) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(company.id)
            .bind(owner_id)
            .bind(MemberRole::Owner.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(company_id = %company.id, owner_id = %owner_id, "Company created");
        Ok(company)
    }

    pub async fn get(&self, company_id: Uuid) -> Result<Company, ApiError> {
        sqlx::query_as("SELECT * FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Company not found"))
    }

    pub async fn update(&self, company_id: Uuid, request: UpdateCompanyRequest) -> Result<Company, ApiError> {
        sqlx::query_as(
            r#"
            UPDATE companies SET
                name = COALESCE($2, name),
                siret = COALESCE($3, siret),
                address = COALESCE($4, address),
                website = COALESCE($5, website),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.siret)
        .bind(request.address)
        .bind(request.website)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))
    }

    pub async fn find_by_stripe_customer(&self, customer_id: &str) -> Result<Option<Company>, ApiError> {
        let company = sqlx::query_as("SELECT * FROM companies WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siret_rules() {
        assert!(siret("732 829 320 00074").is_ok());
        assert!(siret("73282932000074").is_ok());
        assert!(siret("7328293200007").is_err());
        assert!(siret("7328293200007A").is_err());
    }

    #[test]
    fn company_name_required() {
        let request = CreateCompanyRequest {
            name: " ".to_string(),
            siret: None,
            address: None,
            website: Some("https://dupont-btp.fr".to_string()),
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("name").is_some());
        assert!(body["field_errors"].get("website").is_none());
    }
}
