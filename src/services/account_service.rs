use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{self, JwtError};
use crate::config::SecurityConfig;
use crate::database::models::{Company, Membership, Profile, User};
use crate::error::ApiError;
use crate::validation::{self, FieldErrors, Validate};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("email", validation::email(&self.email));
        errors.check("password", validation::password(&self.password));
        errors.check("full_name", validation::optional(self.full_name.as_deref(), 120));
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("email", validation::email(&self.email));
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub avatar_url: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("full_name", validation::optional(self.full_name.as_deref(), 120));
        errors.check("phone", validation::optional(self.phone.as_deref(), 32));
        errors.check("locale", validation::optional(self.locale.as_deref(), 16));
        if let Some(url) = &self.avatar_url {
            errors.check("avatar_url", validation::http_url(url, true));
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub user: User,
    pub profile: Option<Profile>,
    pub membership: Option<Membership>,
    pub company: Option<Company>,
}

pub struct AccountService {
    pool: PgPool,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// bcrypt is CPU-bound
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("Password verification task failed: {}", e)))
}

impl AccountService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn session_for(&self, user: User, security: &SecurityConfig) -> Result<Session, JwtError> {
        let token = auth::issue_session(user.id, &user.email, security)?;
        let expires_at = Utc::now() + chrono::Duration::hours(security.jwt_expiry_hours as i64);
        Ok(Session { token, expires_at, user })
    }

    pub async fn register(&self, request: RegisterRequest, security: &SecurityConfig) -> Result<Session, ApiError> {
        let email = normalize_email(&request.email);

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(ApiError::invalid_field("email", "Email is already registered"));
        }

        let password_hash = hash_password(request.password).await?;

        let mut tx = self.pool.begin().await?;
        let user: User = sqlx::query_as(
            "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO profiles (user_id, full_name) VALUES ($1, $2)")
            .bind(user.id)
            .bind(request.full_name.as_deref().map(str::trim))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(self.session_for(user, security)?)
    }

    pub async fn login(&self, request: LoginRequest, security: &SecurityConfig) -> Result<Session, ApiError> {
        let email = normalize_email(&request.email);
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(user) = user else {
            tracing::warn!("Login attempt for unknown email");
            return Err(ApiError::authentication("Invalid email or password"));
        };

        if !verify_password(request.password, user.password_hash.clone()).await? {
            tracing::warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(ApiError::authentication("Invalid email or password"));
        }

        let user: User = sqlx::query_as("UPDATE users SET last_login_at = now() WHERE id = $1 RETURNING *")
            .bind(user.id)
            .fetch_one(&self.pool)
            .await?;

        Ok(self.session_for(user, security)?)
    }

    pub async fn user(&self, user_id: Uuid) -> Result<User, ApiError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::authentication("User no longer exists"))
    }

    pub async fn whoami(&self, user_id: Uuid) -> Result<WhoAmI, ApiError> {
        let user = self.user(user_id).await?;
        let profile: Option<Profile> = sqlx::query_as("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let membership: Option<Membership> = sqlx::query_as("SELECT * FROM company_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let company = match &membership {
            Some(m) => sqlx::query_as("SELECT * FROM companies WHERE id = $1")
                .bind(m.company_id)
                .fetch_optional(&self.pool)
                .await?,
            None => None,
        };

        Ok(WhoAmI { user, profile, membership, company })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile, ApiError> {
        sqlx::query_as("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Profile not found"))
    }

    pub async fn update_profile(&self, user_id: Uuid, request: UpdateProfileRequest) -> Result<Profile, ApiError> {
        let profile: Option<Profile> = sqlx::query_as(
            r#"
            UPDATE profiles SET
                full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                locale = COALESCE($4, locale),
                avatar_url = COALESCE($5, avatar_url),
                updated_at = now()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.full_name)
        .bind(request.phone)
        .bind(request.locale)
        .bind(request.avatar_url)
        .fetch_optional(&self.pool)
        .await?;

        profile.ok_or_else(|| ApiError::not_found("Profile not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_email_and_password() {
        let request = LoginRequest { email: String::new(), password: String::new() };
        let err = request.validate().unwrap_err();
        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["field_errors"].get("email").is_some());
        assert!(body["field_errors"].get("password").is_some());
    }

    #[test]
    fn register_enforces_password_length() {
        let request = RegisterRequest {
            email: "marie@example.fr".to_string(),
            password: "short".to_string(),
            full_name: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Marie@Example.FR "), "marie@example.fr");
    }
}
