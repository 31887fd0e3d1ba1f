mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;
use tenderdesk_api::security::secrets::sign_payload;

const SECRET: &str = "whsec_integration";

fn signature_header(payload: &[u8]) -> String {
    let t = chrono::Utc::now().timestamp();
    let sig = sign_payload(SECRET, t, payload).unwrap_or_default();
    format!("t={},v1={}", t, sig.trim_start_matches("sha256="))
}

#[tokio::test]
async fn unsigned_events_are_rejected() -> Result<()> {
    let mut config = common::test_config();
    config.integrations.stripe_webhook_secret = SECRET.to_string();
    let server = common::spawn_server(config).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/webhooks/stripe", server.base_url);

    let missing = client.post(&url).body("{}").send().await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let forged = client
        .post(&url)
        .header("stripe-signature", format!("t={},v1=deadbeef", chrono::Utc::now().timestamp()))
        .body("{}")
        .send()
        .await?;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
    let body: Value = forged.json().await?;
    assert_eq!(body["message"], "Invalid webhook signature");
    Ok(())
}

#[tokio::test]
async fn unrelated_events_are_acknowledged() -> Result<()> {
    let mut config = common::test_config();
    config.integrations.stripe_webhook_secret = SECRET.to_string();
    let server = common::spawn_server(config).await?;

    let payload = br#"{"id":"evt_1","type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;
    let res = reqwest::Client::new()
        .post(format!("{}/webhooks/stripe", server.base_url))
        .header("stripe-signature", signature_header(payload))
        .body(payload.to_vec())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["data"]["received"], true);
    assert_eq!(body["data"]["applied"], false);
    Ok(())
}
