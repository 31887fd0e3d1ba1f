use axum::{extract::State, Extension};

use crate::middleware::{ApiResponse, ApiResult, CompanyContext};
use crate::services::analytics_service::Dashboard;
use crate::state::AppState;

/// GET /api/analytics/dashboard - Served from cache until a tender changes
pub async fn dashboard(State(state): State<AppState>, Extension(ctx): Extension<CompanyContext>) -> ApiResult<Dashboard> {
    let dashboard = state.analytics().dashboard(ctx.company_id).await?;
    Ok(ApiResponse::success(dashboard))
}
