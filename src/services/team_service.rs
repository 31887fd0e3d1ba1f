use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{Invitation, MemberRole, Membership, TeamMember};
use crate::error::ApiError;
use crate::integrations::email::{invitation_email, EmailClient};
use crate::security::secrets::{generate_invitation_token, sha256_hex};
use crate::validation::{self, FieldErrors, Validate};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: MemberRole,
}

impl Validate for InviteRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("email", validation::email(&self.email));
        if self.role == MemberRole::Owner {
            errors.add("role", "Invitations cannot grant the owner role");
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: MemberRole,
}

impl Validate for UpdateMemberRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.role == MemberRole::Owner {
            return Err(ApiError::invalid_field("role", "Ownership cannot be assigned"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

impl Validate for AcceptInvitationRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.token, 200).map_err(|reason| ApiError::invalid_field("token", reason))
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationCreated {
    pub invitation: Invitation,
    pub accept_url: String,
    pub email_sent: bool,
}

pub struct TeamService {
    pool: PgPool,
}

/// Owners are immutable through team management; nobody edits their own role
fn ensure_member_editable(actor_id: Uuid, target: &Membership) -> Result<(), ApiError> {
    if target.role == MemberRole::Owner {
        return Err(ApiError::authorization("The company owner cannot be modified"));
    }
    if target.user_id == actor_id {
        return Err(ApiError::authorization("You cannot change your own membership"));
    }
    Ok(())
}

impl TeamService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn members(&self, company_id: Uuid) -> Result<Vec<TeamMember>, ApiError> {
        let members = sqlx::query_as(
            r#"
            SELECT m.user_id, u.email, p.full_name, m.role, m.created_at AS joined_at
            FROM company_members m
            JOIN users u ON u.id = m.user_id
            LEFT JOIN profiles p ON p.user_id = m.user_id
            WHERE m.company_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn membership(&self, company_id: Uuid, user_id: Uuid) -> Result<Membership, ApiError> {
        sqlx::query_as("SELECT * FROM company_members WHERE company_id = $1 AND user_id = $2")
            .bind(company_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Team member not found"))
    }

    pub async fn is_member(&self, company_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM company_members WHERE company_id = $1 AND user_id = $2")
            .bind(company_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn update_role(
        &self,
        company_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: MemberRole,
    ) -> Result<Membership, ApiError> {
        let target = self.membership(company_id, target_user_id).await?;
        ensure_member_editable(actor_id, &target)?;

        let updated = sqlx::query_as("UPDATE company_members SET role = $3 WHERE company_id = $1 AND user_id = $2 RETURNING *")
            .bind(company_id)
            .bind(target_user_id)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(company_id = %company_id, user_id = %target_user_id, role = %role, "Member role updated");
        Ok(updated)
    }

    pub async fn remove(&self, company_id: Uuid, actor_id: Uuid, target_user_id: Uuid) -> Result<(), ApiError> {
        let target = self.membership(company_id, target_user_id).await?;
        ensure_member_editable(actor_id, &target)?;

        sqlx::query("DELETE FROM company_members WHERE company_id = $1 AND user_id = $2")
            .bind(company_id)
            .bind(target_user_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(company_id = %company_id, user_id = %target_user_id, "Member removed");
        Ok(())
    }

    pub async fn pending_invitations(&self, company_id: Uuid) -> Result<Vec<Invitation>, ApiError> {
        let invitations = sqlx::query_as(
            "SELECT * FROM company_invitations WHERE company_id = $1 AND accepted_at IS NULL ORDER BY created_at DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(invitations)
    }

    /// Create an invitation and email its link. Email failure is reported, not fatal.
    pub async fn invite(
        &self,
        company_id: Uuid,
        invited_by: Uuid,
        request: InviteRequest,
        expiry_days: i64,
        app_url: &str,
        email: &EmailClient,
    ) -> Result<InvitationCreated, ApiError> {
        let address = request.email.trim().to_lowercase();

        let already_member: Option<(Uuid,)> = sqlx::query_as(
            "SELECT u.id FROM users u JOIN company_members m ON m.user_id = u.id WHERE u.email = $1",
        )
        .bind(&address)
        .fetch_optional(&self.pool)
        .await?;
        if already_member.is_some() {
            return Err(ApiError::invalid_field("email", "This user already belongs to a company"));
        }

        let token = generate_invitation_token();
        let invitation: Invitation = sqlx::query_as(
            r#"
            INSERT INTO company_invitations (id, company_id, email, role, token_hash, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(&address)
        .bind(request.role.as_str())
        .bind(&token.hash)
        .bind(invited_by)
        .bind(Utc::now() + Duration::days(expiry_days))
        .fetch_one(&self.pool)
        .await?;

        let company_name: (String,) = sqlx::query_as("SELECT name FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;

        let accept_url = format!("{}/invitations/accept?token={}", app_url.trim_end_matches('/'), token.plaintext);
        let (subject, html) = invitation_email(&company_name.0, request.role.as_str(), &accept_url);
        let email_sent = match email.send(&address, &subject, &html).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(invitation_id = %invitation.id, "Invitation email not sent: {}", e);
                false
            }
        };

        Ok(InvitationCreated { invitation, accept_url, email_sent })
    }

    pub async fn revoke_invitation(&self, company_id: Uuid, invitation_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM company_invitations WHERE id = $1 AND company_id = $2 AND accepted_at IS NULL")
            .bind(invitation_id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Invitation not found"));
        }
        Ok(())
    }

    /// Join the inviting company. The invitation must match the caller's email.
    pub async fn accept(&self, user_id: Uuid, user_email: &str, token: &str) -> Result<Membership, ApiError> {
        let invitation: Invitation = sqlx::query_as(
            "SELECT * FROM company_invitations WHERE token_hash = $1 AND accepted_at IS NULL AND expires_at > now()",
        )
        .bind(sha256_hex(token.trim()))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found or expired"))?;

        if !invitation.email.eq_ignore_ascii_case(user_email) {
            return Err(ApiError::authorization("This invitation was sent to another email address"));
        }

        let mut tx = self.pool.begin().await?;
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM company_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(ApiError::validation("You already belong to a company"));
        }

        let membership: Membership = sqlx::query_as(
            "INSERT INTO company_members (id, company_id, user_id, role) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(invitation.company_id)
        .bind(user_id)
        .bind(invitation.role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE company_invitations SET accepted_at = now() WHERE id = $1")
            .bind(invitation.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(company_id = %invitation.company_id, user_id = %user_id, "Invitation accepted");
        Ok(membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(role: MemberRole) -> Membership {
        Membership {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn owner_and_self_are_not_editable() {
        let owner = membership(MemberRole::Owner);
        assert!(ensure_member_editable(Uuid::new_v4(), &owner).is_err());

        let member = membership(MemberRole::Member);
        assert!(ensure_member_editable(member.user_id, &member).is_err());
        assert!(ensure_member_editable(Uuid::new_v4(), &member).is_ok());
    }

    #[test]
    fn invitations_cannot_grant_ownership() {
        let request = InviteRequest { email: "paul@example.fr".to_string(), role: MemberRole::Owner };
        assert!(request.validate().is_err());

        let request = InviteRequest { email: "paul@example.fr".to_string(), role: MemberRole::Admin };
        assert!(request.validate().is_ok());
    }
}
