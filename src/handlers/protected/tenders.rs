use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::Tender;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::tender_service::{CreateTenderRequest, TenderFilter, UpdateStatusRequest, UpdateTenderRequest};
use crate::state::AppState;

/// GET /api/tenders - Filter by status, assignee, deadline or free text
pub async fn tender_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    filter: Result<Query<TenderFilter>, QueryRejection>,
) -> ApiResult<Vec<Tender>> {
    let Query(filter) = filter?;
    let tenders = state.tenders().list(ctx.company_id, &filter).await?;
    Ok(ApiResponse::success(tenders))
}

/// POST /api/tenders
pub async fn tender_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateTenderRequest>,
) -> ApiResult<Tender> {
    let tender = state.tenders().create(ctx.company_id, ctx.user_id, request).await?;
    Ok(ApiResponse::created(tender))
}

/// GET /api/tenders/:id
pub async fn tender_get(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Tender> {
    let tender = state.tenders().get(ctx.company_id, id).await?;
    Ok(ApiResponse::success(tender))
}

/// PATCH /api/tenders/:id
pub async fn tender_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateTenderRequest>,
) -> ApiResult<Tender> {
    let tender = state.tenders().update(ctx.company_id, id, request).await?;
    Ok(ApiResponse::success(tender))
}

/// PATCH /api/tenders/:id/status
pub async fn tender_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateStatusRequest>,
) -> ApiResult<Tender> {
    let tender = state.tenders().update_status(ctx.company_id, id, request.status).await?;
    Ok(ApiResponse::success(tender))
}

/// DELETE /api/tenders/:id
pub async fn tender_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.tenders().delete(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}
