use axum::{extract::State, http::header, response::IntoResponse};
use serde_json::json;

use crate::config::SecurityConfig;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ValidJson};
use crate::services::account_service::{LoginRequest, RegisterRequest};
use crate::services::AccountService;
use crate::state::AppState;

/// `Set-Cookie` value carrying the session token; an empty token expires the cookie
pub fn session_cookie(security: &SecurityConfig, token: &str) -> String {
    let max_age = if token.is_empty() { 0 } else { security.jwt_expiry_hours * 3600 };
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        security.session_cookie_name, token, max_age
    );
    if security.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

/// POST /auth/register - Create an account and open a session
pub async fn register(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let security = &state.config.security;
    let session = AccountService::new(state.pool.clone()).register(request, security).await?;
    let cookie = session_cookie(security, &session.token);
    Ok(([(header::SET_COOKIE, cookie)], ApiResponse::created(session)))
}

/// POST /auth/login - Exchange credentials for a session token
pub async fn login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let security = &state.config.security;
    let session = AccountService::new(state.pool.clone()).login(request, security).await?;
    let cookie = session_cookie(security, &session.token);
    Ok(([(header::SET_COOKIE, cookie)], ApiResponse::success(session)))
}

/// POST /auth/logout - Expire the session cookie
///
/// Tokens are stateless, so a bearer token stays valid until it expires.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = session_cookie(&state.config.security, "");
    ([(header::SET_COOKIE, cookie)], ApiResponse::success(json!({ "logged_out": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn cookie_attributes() {
        let mut security = AppConfig::development().security;
        security.session_cookie_name = "td_session".to_string();
        security.jwt_expiry_hours = 2;
        security.secure_cookies = false;

        let cookie = session_cookie(&security, "tok");
        assert_eq!(cookie, "td_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=7200");

        security.secure_cookies = true;
        let cleared = session_cookie(&security, "");
        assert!(cleared.starts_with("td_session=; "));
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.ends_with("; Secure"));
    }
}
