use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::BillingService;
use crate::state::AppState;

/// POST /webhooks/stripe - Signed subscription events from Stripe
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Value> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation("Missing Stripe-Signature header"))?;

    let stripe = &state.integrations.stripe;
    let event = stripe.construct_event(&body, signature)?;
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Stripe event received");

    let applied = BillingService::new(state.pool.clone(), stripe, &state.config.integrations)
        .apply_event(&event)
        .await?;

    Ok(ApiResponse::success(json!({ "received": true, "applied": applied })))
}
