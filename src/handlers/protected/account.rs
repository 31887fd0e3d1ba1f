use axum::{
    extract::{Query, State},
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::{Company, Membership, Profile};
use crate::error::ApiError;
use crate::integrations::google_calendar::verify_oauth_state;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ValidJson};
use crate::services::account_service::{UpdateProfileRequest, WhoAmI};
use crate::services::company_service::CreateCompanyRequest;
use crate::services::team_service::AcceptInvitationRequest;
use crate::services::{AccountService, CalendarService, CompanyService, TeamService};
use crate::state::AppState;

/// GET /api/auth/whoami - Current user with profile, membership and company
pub async fn whoami(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<WhoAmI> {
    let whoami = AccountService::new(state.pool.clone()).whoami(user.user_id).await?;
    Ok(ApiResponse::success(whoami))
}

/// GET /api/profile
pub async fn profile_get(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Profile> {
    let profile = AccountService::new(state.pool.clone()).profile(user.user_id).await?;
    Ok(ApiResponse::success(profile))
}

/// PATCH /api/profile
pub async fn profile_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(request): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Profile> {
    let profile = AccountService::new(state.pool.clone())
        .update_profile(user.user_id, request)
        .await?;
    Ok(ApiResponse::success(profile))
}

/// POST /api/companies - Create a company owned by the caller
pub async fn company_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(request): ValidJson<CreateCompanyRequest>,
) -> ApiResult<Company> {
    let company = CompanyService::new(state.pool.clone()).create(user.user_id, request).await?;
    Ok(ApiResponse::created(company))
}

/// POST /api/team/invitations/accept - Join the inviting company
pub async fn invitation_accept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(request): ValidJson<AcceptInvitationRequest>,
) -> ApiResult<Membership> {
    let account = AccountService::new(state.pool.clone()).user(user.user_id).await?;
    let membership = TeamService::new(state.pool.clone())
        .accept(user.user_id, &account.email, &request.token)
        .await?;
    Ok(ApiResponse::success(membership))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
    pub state: String,
}

/// GET /api/calendar/google/callback - Finish the Google OAuth consent
pub async fn google_callback(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(callback): Query<OAuthCallback>,
) -> ApiResult<Value> {
    if !verify_oauth_state(&callback.state, user.user_id, &state.config.security.jwt_secret, Utc::now()) {
        tracing::warn!(user_id = %user.user_id, "Rejected OAuth state");
        return Err(ApiError::invalid_field("state", "Invalid or expired OAuth state"));
    }

    let membership = CompanyService::new(state.pool.clone())
        .membership_for_user(user.user_id)
        .await?
        .ok_or_else(|| ApiError::authorization("You are not a member of any company"))?;

    let tokens = state.integrations.google.exchange_code(&callback.code).await?;
    let sync = CalendarService::new(state.pool.clone())
        .save_google_tokens(membership.company_id, user.user_id, &tokens)
        .await?;

    Ok(ApiResponse::success(json!({
        "connected": true,
        "provider": sync.provider,
        "calendar_id": sync.calendar_id,
    })))
}
