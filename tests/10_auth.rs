mod common;

use anyhow::Result;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn root_describes_service() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::get(format!("{}/", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "TenderDesk API");
    Ok(())
}

#[tokio::test]
async fn company_routes_require_credentials() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::get(format!("{}/api/tenders", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "AUTHENTICATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn forged_tokens_are_rejected() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/analytics/dashboard", server.base_url);

    let bearer = client.get(&url).bearer_auth("not.a.jwt").send().await?;
    assert_eq!(bearer.status(), StatusCode::UNAUTHORIZED);

    let cookie = client
        .get(&url)
        .header(header::COOKIE, "tenderdesk_session=garbage")
        .send()
        .await?;
    assert_eq!(cookie.status(), StatusCode::UNAUTHORIZED);

    // Not a TenderDesk key, so no lookup happens
    let api_key = client.get(&url).header("x-api-key", "sk_live_other").send().await?;
    assert_eq!(api_key.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_routes_ignore_api_keys() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::Client::new()
        .get(format!("{}/api/auth/whoami", server.base_url))
        .header("x-api-key", "tdk_0123456789abcdef")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn register_reports_field_errors() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::Client::new()
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({ "email": "not-an-email", "password": "short" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = res.json().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field_errors"]["email"], "Invalid email format");
    assert_eq!(body["field_errors"]["password"], "Password must be at least 8 characters");
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::Client::new()
        .post(format!("{}/auth/login", server.base_url))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{\"email\": ")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = res.json().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn logout_expires_cookie() -> Result<()> {
    let server = common::spawn_server(common::test_config()).await?;

    let res = reqwest::Client::new()
        .post(format!("{}/auth/logout", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("tenderdesk_session=;"), "unexpected cookie: {}", cookie);
    assert!(cookie.contains("Max-Age=0"));
    Ok(())
}
