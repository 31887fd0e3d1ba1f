use axum::{extract::State, Extension};

use crate::database::models::MemberRole;
use crate::integrations::stripe::Invoice;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::billing_service::{CheckoutRequest, RedirectUrl};
use crate::services::{AccountService, BillingService};
use crate::state::AppState;

/// POST /api/billing/checkout - Owner only; creates the Stripe customer on first use
pub async fn checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CheckoutRequest>,
) -> ApiResult<RedirectUrl> {
    ctx.require(MemberRole::Owner)?;
    let owner = AccountService::new(state.pool.clone()).user(ctx.user_id).await?;
    let redirect = BillingService::new(state.pool.clone(), &state.integrations.stripe, &state.config.integrations)
        .checkout(ctx.company_id, &owner.email, request.plan.trim())
        .await?;
    Ok(ApiResponse::success(redirect))
}

/// POST /api/billing/portal - Owner only
pub async fn portal(State(state): State<AppState>, Extension(ctx): Extension<CompanyContext>) -> ApiResult<RedirectUrl> {
    ctx.require(MemberRole::Owner)?;
    let redirect = BillingService::new(state.pool.clone(), &state.integrations.stripe, &state.config.integrations)
        .portal(ctx.company_id)
        .await?;
    Ok(ApiResponse::success(redirect))
}

/// GET /api/billing/invoices
pub async fn invoices(State(state): State<AppState>, Extension(ctx): Extension<CompanyContext>) -> ApiResult<Vec<Invoice>> {
    let invoices = BillingService::new(state.pool.clone(), &state.integrations.stripe, &state.config.integrations)
        .invoices(ctx.company_id)
        .await?;
    Ok(ApiResponse::success(invoices))
}
