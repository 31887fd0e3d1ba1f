use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::ResponseDocument;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::document_service::{CreateDocumentRequest, NewDocument, UpdateDocumentRequest};
use crate::state::AppState;

/// GET /api/tenders/:id/documents
pub async fn document_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(tender_id): Path<Uuid>,
) -> ApiResult<Vec<ResponseDocument>> {
    let documents = state.documents().list(ctx.company_id, tender_id).await?;
    Ok(ApiResponse::success(documents))
}

/// POST /api/tenders/:id/documents - A hand-written response section
pub async fn document_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(tender_id): Path<Uuid>,
    ValidJson(request): ValidJson<CreateDocumentRequest>,
) -> ApiResult<ResponseDocument> {
    let new_document = NewDocument {
        section: request.section.trim(),
        title: request.title.trim(),
        content: &request.content,
        generated_by_ai: false,
    };
    let document = state
        .documents()
        .create(ctx.company_id, tender_id, ctx.user_id, new_document)
        .await?;
    Ok(ApiResponse::created(document))
}

/// PATCH /api/documents/:id
pub async fn document_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateDocumentRequest>,
) -> ApiResult<ResponseDocument> {
    let document = state.documents().update(ctx.company_id, id, request).await?;
    Ok(ApiResponse::success(document))
}

/// DELETE /api/documents/:id
pub async fn document_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.documents().delete(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}
