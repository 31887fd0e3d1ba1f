use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::database::models::{MemberRole, Membership};
use crate::error::ApiError;
use crate::services::api_key_service::scope_allows;
use crate::state::AppState;

/// Company scope for a request, injected after authentication
#[derive(Clone, Debug)]
pub struct CompanyContext {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
}

impl CompanyContext {
    pub fn require(&self, role: MemberRole) -> Result<(), ApiError> {
        if self.role.at_least(role) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, role = %self.role, required = %role, "Insufficient role");
            Err(ApiError::authorization(format!("This action requires the {} role", role)))
        }
    }
}

/// Resolve the caller's company membership; 403 when there is none
pub async fn company_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::authentication("Authentication required"))?;

    let membership: Option<Membership> = sqlx::query_as("SELECT * FROM company_members WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_optional(&state.pool)
        .await?;
    let membership = membership.ok_or_else(|| ApiError::authorization("You are not a member of any company"))?;

    if let Some(key) = &user.api_key {
        // The key's creator must still belong to the key's company
        if membership.company_id != key.company_id {
            return Err(ApiError::authorization("API key owner no longer belongs to this company"));
        }
        if !scope_allows(&key.scopes, request.method()) {
            return Err(ApiError::authorization("API key scope does not allow this method"));
        }
    }

    request.extensions_mut().insert(CompanyContext {
        company_id: membership.company_id,
        user_id: user.user_id,
        role: membership.role,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_checks_role_rank() {
        let ctx = CompanyContext { company_id: Uuid::new_v4(), user_id: Uuid::new_v4(), role: MemberRole::Admin };
        assert!(ctx.require(MemberRole::Member).is_ok());
        assert!(ctx.require(MemberRole::Admin).is_ok());
        let err = ctx.require(MemberRole::Owner).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
