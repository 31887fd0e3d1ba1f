use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::validate_jwt;
use crate::error::ApiError;
use crate::services::ApiKeyService;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Company-scoped credential resolved from `X-Api-Key`
#[derive(Clone, Debug)]
pub struct ApiKeyPrincipal {
    pub key_id: Uuid,
    pub company_id: Uuid,
    pub scopes: Vec<String>,
    pub rate_limit_per_minute: u32,
}

/// Authenticated caller. API-key callers act as the user who created the key.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub api_key: Option<ApiKeyPrincipal>,
}

/// Session token from `Authorization: Bearer` or, failing that, the session cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty()) {
            return Some(token.to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn session_user(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
    let security = &state.config.security;
    let Some(token) = extract_session_token(headers, &security.session_cookie_name) else {
        return Ok(None);
    };
    let claims = validate_jwt(&token, &security.jwt_secret)?;
    Ok(Some(AuthUser { user_id: claims.sub, api_key: None }))
}

/// Session-only authentication
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = session_user(&state, request.headers())?.ok_or_else(|| {
        tracing::warn!(path = %request.uri().path(), "Missing session");
        ApiError::authentication("Authentication required")
    })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Session or API-key authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user) = session_user(&state, request.headers())? {
        request.extensions_mut().insert(user);
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let Some(presented) = presented else {
        tracing::warn!(path = %request.uri().path(), "Missing credentials");
        return Err(ApiError::authentication("Authentication required"));
    };

    let key = ApiKeyService::new(state.pool.clone())
        .authenticate(&presented)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Rejected unknown or revoked API key");
            ApiError::authentication("Invalid API key")
        })?;

    request.extensions_mut().insert(AuthUser {
        user_id: key.created_by,
        api_key: Some(ApiKeyPrincipal {
            key_id: key.id,
            company_id: key.company_id,
            scopes: key.scopes,
            rate_limit_per_minute: key.rate_limit_per_minute.max(1) as u32,
        }),
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=zzz"));
        assert_eq!(extract_session_token(&headers, "session").as_deref(), Some("abc.def"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=tok123; lang=fr"));
        assert_eq!(extract_session_token(&headers, "session").as_deref(), Some("tok123"));
        assert_eq!(extract_session_token(&headers, "other"), None);
    }

    #[test]
    fn malformed_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_session_token(&headers, "session"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_session_token(&headers, "session"), None);
    }
}
