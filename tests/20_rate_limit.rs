mod common;

use anyhow::Result;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};
use tenderdesk_api::config::RateLimitRule;

#[tokio::test]
async fn auth_endpoints_return_429_after_budget() -> Result<()> {
    let mut config = common::test_config();
    config.api.enable_rate_limiting = true;
    config.api.auth_rate_limit = RateLimitRule::new(3, 60);
    let server = common::spawn_server(config).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/auth/login", server.base_url);

    // Rejected by validation before any database access, but still counted
    for remaining in (0..3).rev() {
        let res = client.post(&url).json(&json!({ "email": "", "password": "" })).send().await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], remaining.to_string().as_str());
    }

    let res = client.post(&url).json(&json!({ "email": "", "password": "" })).send().await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(header::RETRY_AFTER));

    let body: Value = res.json().await?;
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert!(body["retry_after"].as_u64().is_some_and(|secs| secs <= 60));
    Ok(())
}

#[tokio::test]
async fn clients_are_limited_independently() -> Result<()> {
    let mut config = common::test_config();
    config.api.enable_rate_limiting = true;
    config.api.auth_rate_limit = RateLimitRule::new(1, 60);
    let server = common::spawn_server(config).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/auth/logout", server.base_url);

    let first = client.post(&url).header("x-forwarded-for", "198.51.100.1").send().await?;
    assert_eq!(first.status(), StatusCode::OK);
    let second = client.post(&url).header("x-forwarded-for", "198.51.100.1").send().await?;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = client.post(&url).header("x-forwarded-for", "198.51.100.2").send().await?;
    assert_eq!(other.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn disabled_limiter_adds_no_headers() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::get(format!("{}/", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key("x-ratelimit-limit"));
    Ok(())
}
