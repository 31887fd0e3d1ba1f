use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::{ApiKey, MemberRole};
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::api_key_service::{ApiKeyCreated, CreateApiKeyRequest};
use crate::services::ApiKeyService;
use crate::state::AppState;

pub async fn api_key_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> ApiResult<Vec<ApiKey>> {
    ctx.require(MemberRole::Admin)?;
    let keys = ApiKeyService::new(state.pool.clone()).list(ctx.company_id).await?;
    Ok(ApiResponse::success(keys))
}

/// POST /api/api-keys - The plaintext key is shown once
pub async fn api_key_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateApiKeyRequest>,
) -> ApiResult<ApiKeyCreated> {
    ctx.require(MemberRole::Admin)?;
    let created = ApiKeyService::new(state.pool.clone())
        .create(ctx.company_id, ctx.user_id, request)
        .await?;
    Ok(ApiResponse::created(created))
}

pub async fn api_key_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(MemberRole::Admin)?;
    ApiKeyService::new(state.pool.clone()).revoke(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}
