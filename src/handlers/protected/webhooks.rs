use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::{MemberRole, Webhook, WebhookDelivery};
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::webhook_service::{CreateWebhookRequest, UpdateWebhookRequest, WebhookCreated};
use crate::state::AppState;

pub async fn webhook_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Vec<Webhook>> {
    ctx.require(MemberRole::Admin)?;
    let Query(page) = page?;
    let webhooks = state.webhooks().list(ctx.company_id, page).await?;
    Ok(ApiResponse::success(webhooks))
}

/// POST /api/webhooks - The signing secret is only returned here
pub async fn webhook_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateWebhookRequest>,
) -> ApiResult<WebhookCreated> {
    ctx.require(MemberRole::Admin)?;
    let created = state.webhooks().create(ctx.company_id, ctx.user_id, request).await?;
    Ok(ApiResponse::created(created))
}

pub async fn webhook_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateWebhookRequest>,
) -> ApiResult<Webhook> {
    ctx.require(MemberRole::Admin)?;
    let webhook = state.webhooks().update(ctx.company_id, id, request).await?;
    Ok(ApiResponse::success(webhook))
}

pub async fn webhook_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(MemberRole::Admin)?;
    state.webhooks().delete(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}

/// POST /api/webhooks/:id/test - Deliver a `webhook.test` event and report the outcome
pub async fn webhook_test(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<WebhookDelivery> {
    ctx.require(MemberRole::Admin)?;
    let delivery = state.webhooks().send_test(ctx.company_id, id).await?;
    Ok(ApiResponse::success(delivery))
}

pub async fn webhook_deliveries(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Vec<WebhookDelivery>> {
    ctx.require(MemberRole::Admin)?;
    let Query(page) = page?;
    let deliveries = state.webhooks().deliveries(ctx.company_id, id, page).await?;
    Ok(ApiResponse::success(deliveries))
}
