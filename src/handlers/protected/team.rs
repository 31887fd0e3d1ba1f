use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::{Invitation, MemberRole, Membership, TeamMember};
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::team_service::{InvitationCreated, InviteRequest, UpdateMemberRequest};
use crate::services::TeamService;
use crate::state::AppState;

/// GET /api/team/members
pub async fn member_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> ApiResult<Vec<TeamMember>> {
    let members = TeamService::new(state.pool.clone()).members(ctx.company_id).await?;
    Ok(ApiResponse::success(members))
}

/// PATCH /api/team/members/:user_id - Admins only; the owner's role is fixed
pub async fn member_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(user_id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateMemberRequest>,
) -> ApiResult<Membership> {
    ctx.require(MemberRole::Admin)?;
    let membership = TeamService::new(state.pool.clone())
        .update_role(ctx.company_id, ctx.user_id, user_id, request.role)
        .await?;
    Ok(ApiResponse::success(membership))
}

/// DELETE /api/team/members/:user_id
pub async fn member_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(MemberRole::Admin)?;
    TeamService::new(state.pool.clone())
        .remove(ctx.company_id, ctx.user_id, user_id)
        .await?;
    Ok(ApiResponse::<()>::no_content())
}

/// GET /api/team/invitations - Pending invitations
pub async fn invitation_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> ApiResult<Vec<Invitation>> {
    ctx.require(MemberRole::Admin)?;
    let invitations = TeamService::new(state.pool.clone())
        .pending_invitations(ctx.company_id)
        .await?;
    Ok(ApiResponse::success(invitations))
}

/// POST /api/team/invitations - Invite by email; the link is returned even if mailing fails
pub async fn invitation_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<InviteRequest>,
) -> ApiResult<InvitationCreated> {
    ctx.require(MemberRole::Admin)?;
    let created = TeamService::new(state.pool.clone())
        .invite(
            ctx.company_id,
            ctx.user_id,
            request,
            state.config.security.invitation_expiry_days,
            &state.config.integrations.app_url,
            &state.integrations.email,
        )
        .await?;
    Ok(ApiResponse::created(created))
}

/// DELETE /api/team/invitations/:id
pub async fn invitation_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(MemberRole::Admin)?;
    TeamService::new(state.pool.clone())
        .revoke_invitation(ctx.company_id, id)
        .await?;
    Ok(ApiResponse::<()>::no_content())
}
