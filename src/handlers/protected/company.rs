use axum::{extract::State, Extension};

use crate::database::models::{Company, MemberRole};
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::company_service::UpdateCompanyRequest;
use crate::services::CompanyService;
use crate::state::AppState;

/// GET /api/company
pub async fn company_get(State(state): State<AppState>, Extension(ctx): Extension<CompanyContext>) -> ApiResult<Company> {
    let company = CompanyService::new(state.pool.clone()).get(ctx.company_id).await?;
    Ok(ApiResponse::success(company))
}

/// PATCH /api/company - Admins only
pub async fn company_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<UpdateCompanyRequest>,
) -> ApiResult<Company> {
    ctx.require(MemberRole::Admin)?;
    let company = CompanyService::new(state.pool.clone()).update(ctx.company_id, request).await?;
    Ok(ApiResponse::success(company))
}
