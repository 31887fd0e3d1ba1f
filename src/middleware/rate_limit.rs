use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::auth::AuthUser;
use crate::config::{ApiConfig, RateLimitRule};
use crate::error::ApiError;
use crate::state::AppState;

/// User id, then API key id, then the first forwarded address, then `anonymous`
pub fn rate_limit_identifier(user: Option<&AuthUser>, headers: &HeaderMap) -> String {
    if let Some(user) = user {
        return match &user.api_key {
            Some(key) => format!("key:{}", key.key_id),
            None => format!("user:{}", user.user_id),
        };
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|ip| format!("ip:{}", ip))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// The rule for an endpoint; API-key callers use their key's per-minute limit
pub fn rule_for(api: &ApiConfig, endpoint: &str, user: Option<&AuthUser>) -> RateLimitRule {
    if let Some(key) = user.and_then(|u| u.api_key.as_ref()) {
        return RateLimitRule::new(key.rate_limit_per_minute, 60);
    }
    if endpoint.starts_with("/auth/") {
        api.auth_rate_limit
    } else if endpoint.starts_with("/api/ai/") {
        api.ai_rate_limit
    } else {
        api.default_rate_limit
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api = &state.config.api;
    if !api.enable_rate_limiting {
        return Ok(next.run(request).await);
    }

    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let user = request.extensions().get::<AuthUser>();
    let identifier = rate_limit_identifier(user, request.headers());
    let rule = rule_for(api, &endpoint, user);

    let status = state.rate_limiter.check(&identifier, &endpoint, rule)?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(status.reset_after_secs));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::middleware::auth::ApiKeyPrincipal;
    use uuid::Uuid;

    #[test]
    fn identifier_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(rate_limit_identifier(None, &headers), "anonymous");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(rate_limit_identifier(None, &headers), "ip:203.0.113.7");

        let user = AuthUser { user_id: Uuid::nil(), api_key: None };
        assert_eq!(rate_limit_identifier(Some(&user), &headers), format!("user:{}", Uuid::nil()));

        let key_id = Uuid::new_v4();
        let keyed = AuthUser {
            user_id: Uuid::nil(),
            api_key: Some(ApiKeyPrincipal { key_id, company_id: Uuid::nil(), scopes: vec![], rate_limit_per_minute: 5 }),
        };
        assert_eq!(rate_limit_identifier(Some(&keyed), &headers), format!("key:{}", key_id));
    }

    #[test]
    fn rules_by_endpoint() {
        let api = AppConfig::development().api;
        assert_eq!(rule_for(&api, "/auth/login", None), api.auth_rate_limit);
        assert_eq!(rule_for(&api, "/api/ai/generate", None), api.ai_rate_limit);
        assert_eq!(rule_for(&api, "/api/tenders", None), api.default_rate_limit);

        let keyed = AuthUser {
            user_id: Uuid::nil(),
            api_key: Some(ApiKeyPrincipal { key_id: Uuid::nil(), company_id: Uuid::nil(), scopes: vec![], rate_limit_per_minute: 7 }),
        };
        assert_eq!(rule_for(&api, "/api/tenders", Some(&keyed)), RateLimitRule::new(7, 60));
    }
}
