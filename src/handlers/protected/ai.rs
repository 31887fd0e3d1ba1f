use axum::{extract::State, Extension};

use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::ai_service::{GenerateImageRequest, GenerateSectionRequest, GeneratedImage, GeneratedSection};
use crate::services::AiService;
use crate::state::AppState;

/// POST /api/ai/generate - Draft a response section, optionally saving it as a document
pub async fn generate_section(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<GenerateSectionRequest>,
) -> ApiResult<GeneratedSection> {
    let generated = AiService::new(&state.integrations.openai)
        .generate_section(&state.tenders(), &state.documents(), ctx.company_id, ctx.user_id, request)
        .await?;
    Ok(ApiResponse::success(generated))
}

/// POST /api/ai/image
pub async fn generate_image(
    State(state): State<AppState>,
    Extension(_ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<GenerateImageRequest>,
) -> ApiResult<GeneratedImage> {
    let image = AiService::new(&state.integrations.openai).generate_image(request).await?;
    Ok(ApiResponse::success(image))
}
