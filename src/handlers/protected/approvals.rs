use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::{ApprovalRequest, ApprovalWorkflow, MemberRole};
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::approval_service::{
    CreateApprovalRequest, CreateWorkflowRequest, DecisionRequest, RequestDetail, RequestFilter, WorkflowDetail,
};
use crate::state::AppState;

/// GET /api/approvals/workflows
pub async fn workflow_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Vec<ApprovalWorkflow>> {
    let Query(page) = page?;
    let workflows = state.approvals().workflows(ctx.company_id, page).await?;
    Ok(ApiResponse::success(workflows))
}

/// POST /api/approvals/workflows - Admins define the ordered steps
pub async fn workflow_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateWorkflowRequest>,
) -> ApiResult<WorkflowDetail> {
    ctx.require(MemberRole::Admin)?;
    let workflow = state.approvals().create_workflow(ctx.company_id, ctx.user_id, request).await?;
    Ok(ApiResponse::created(workflow))
}

/// GET /api/approvals/workflows/:id
pub async fn workflow_get(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkflowDetail> {
    let workflow = state.approvals().workflow_detail(ctx.company_id, id).await?;
    Ok(ApiResponse::success(workflow))
}

/// DELETE /api/approvals/workflows/:id
pub async fn workflow_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(MemberRole::Admin)?;
    state.approvals().delete_workflow(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}

/// GET /api/approvals/requests
pub async fn request_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    filter: Result<Query<RequestFilter>, QueryRejection>,
) -> ApiResult<Vec<ApprovalRequest>> {
    let Query(filter) = filter?;
    let requests = state.approvals().requests(ctx.company_id, &filter).await?;
    Ok(ApiResponse::success(requests))
}

/// POST /api/approvals/requests - Start a workflow for a tender
pub async fn request_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateApprovalRequest>,
) -> ApiResult<ApprovalRequest> {
    let created = state.approvals().create_request(ctx.company_id, ctx.user_id, request).await?;
    Ok(ApiResponse::created(created))
}

/// GET /api/approvals/requests/:id - Request with steps, decisions and audit trail
pub async fn request_get(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestDetail> {
    let detail = state.approvals().request_detail(ctx.company_id, id).await?;
    Ok(ApiResponse::success(detail))
}

/// POST /api/approvals/requests/:id/decision
pub async fn request_decide(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(decision): ValidJson<DecisionRequest>,
) -> ApiResult<ApprovalRequest> {
    let request = state
        .approvals()
        .decide(ctx.company_id, id, ctx.user_id, ctx.role, decision)
        .await?;
    Ok(ApiResponse::success(request))
}

/// POST /api/approvals/requests/:id/cancel
pub async fn request_cancel(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApprovalRequest> {
    let request = state.approvals().cancel(ctx.company_id, id, ctx.user_id, ctx.role).await?;
    Ok(ApiResponse::success(request))
}
