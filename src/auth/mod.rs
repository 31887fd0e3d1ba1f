use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            email: email.into(),
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
    #[error("Invalid session token: {0}")]
    Invalid(String),
    #[error("Password hashing error: {0}")]
    Hashing(String),
}

/// Issue a signed session token for a user
pub fn issue_session(user_id: Uuid, email: &str, security: &SecurityConfig) -> Result<String, JwtError> {
    let claims = Claims::new(user_id, email, security.jwt_expiry_hours);
    generate_jwt(&claims, &security.jwt_secret)
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Validate signature and expiry, returning the claims
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::Invalid(e.to_string()))
}

pub fn hash_password(password: &str) -> Result<String, JwtError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| JwtError::Hashing(e.to_string()))
}

/// A malformed stored hash counts as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip_preserves_subject() {
        let user_id = Uuid::new_v4();
        let token = generate_jwt(&Claims::new(user_id, "a@b.fr", 1), SECRET).unwrap();
        let claims = validate_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@b.fr");
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let token = generate_jwt(&Claims::new(Uuid::new_v4(), "a@b.fr", 1), SECRET).unwrap();
        assert!(matches!(validate_jwt(&token, "other"), Err(JwtError::Invalid(_))));

        let mut expired = Claims::new(Uuid::new_v4(), "a@b.fr", 1);
        expired.exp = Utc::now().timestamp() - 3600;
        let token = generate_jwt(&expired, SECRET).unwrap();
        assert!(matches!(validate_jwt(&token, SECRET), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn empty_secret_is_refused() {
        let claims = Claims::new(Uuid::new_v4(), "a@b.fr", 1);
        assert!(matches!(generate_jwt(&claims, ""), Err(JwtError::InvalidSecret)));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }
}
