use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::{text_enum, MemberRole};

text_enum! {
    pub enum ApprovalStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum DecisionKind {
        Approve => "approve",
        Reject => "reject",
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalWorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_order: i32,
    pub name: String,
    pub approver_user_id: Option<Uuid>,
    pub approver_role: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalWorkflowStep {
    /// Minimum role allowed to decide this step; unknown values are ignored
    pub fn required_role(&self) -> Option<MemberRole> {
        self.approver_role.as_deref().and_then(|r| r.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub tender_id: Uuid,
    pub workflow_id: Uuid,
    pub current_step_id: Option<Uuid>,
    pub title: String,
    pub comment: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ApprovalStatus,
    pub requested_by: Uuid,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalDecision {
    pub id: Uuid,
    pub request_id: Uuid,
    pub step_id: Uuid,
    pub decided_by: Uuid,
    #[sqlx(try_from = "String")]
    pub decision: DecisionKind,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApprovalAuditLog {
    pub id: Uuid,
    pub request_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
