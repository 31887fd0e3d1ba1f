//! Multi-step approval workflows.
//!
//! A request points at the current step of its workflow. Each decision either
//! rejects the request outright or advances it to the next step by
//! `step_order`; approving the last step approves the request. Advancement is
//! read-then-write with no row lock, so two approvers acting on the same step
//! at the same moment can both succeed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::models::{
    ApprovalAuditLog, ApprovalDecision, ApprovalRequest, ApprovalStatus, ApprovalWorkflow, ApprovalWorkflowStep,
    DecisionKind, MemberRole,
};
use crate::database::Page;
use crate::error::ApiError;
use crate::integrations::email::{approval_email, EmailClient};
use crate::services::webhook_service::{events, WebhookService};
use crate::validation::{self, FieldErrors, Validate};

const MAX_STEPS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct StepInput {
    pub name: String,
    pub approver_user_id: Option<Uuid>,
    pub approver_role: Option<MemberRole>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

impl Validate for CreateWorkflowRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name, 200));
        errors.check("description", validation::optional(self.description.as_deref(), 2_000));
        if self.steps.len() > MAX_STEPS {
            errors.add("steps", format!("At most {} steps", MAX_STEPS));
        }
        for (i, step) in self.steps.iter().enumerate() {
            errors.check(&format!("steps[{}].name", i), validation::required(&step.name, 200));
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateApprovalRequest {
    pub tender_id: Uuid,
    pub workflow_id: Uuid,
    pub title: String,
    pub comment: Option<String>,
}

impl Validate for CreateApprovalRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("title", validation::required(&self.title, 300));
        errors.check("comment", validation::optional(self.comment.as_deref(), 4_000));
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: DecisionKind,
    pub comment: Option<String>,
}

impl Validate for DecisionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::optional(self.comment.as_deref(), 4_000).map_err(|reason| ApiError::invalid_field("comment", reason))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<ApprovalStatus>,
    pub tender_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: ApprovalWorkflow,
    pub steps: Vec<ApprovalWorkflowStep>,
}

#[derive(Debug, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: ApprovalRequest,
    pub steps: Vec<ApprovalWorkflowStep>,
    pub decisions: Vec<ApprovalDecision>,
    pub audit_log: Vec<ApprovalAuditLog>,
}

/// The lowest-ordered step; a workflow without steps cannot start a request
pub fn first_step(steps: &[ApprovalWorkflowStep]) -> Result<&ApprovalWorkflowStep, ApiError> {
    steps
        .iter()
        .min_by_key(|s| s.step_order)
        .ok_or_else(|| ApiError::validation("Workflow has no steps configured"))
}

/// The step following `current` by `step_order`, or `None` when `current` is last
pub fn next_step(steps: &[ApprovalWorkflowStep], current: Uuid) -> Option<&ApprovalWorkflowStep> {
    let order = steps.iter().find(|s| s.id == current)?.step_order;
    steps.iter().filter(|s| s.step_order > order).min_by_key(|s| s.step_order)
}

/// A named approver must decide in person; otherwise the step's role (admin by default) applies
pub fn can_decide(step: &ApprovalWorkflowStep, actor_id: Uuid, actor_role: MemberRole) -> bool {
    match (step.approver_user_id, step.required_role()) {
        (Some(user_id), _) => user_id == actor_id,
        (None, Some(role)) => actor_role.at_least(role),
        (None, None) => actor_role.at_least(MemberRole::Admin),
    }
}

pub struct ApprovalService {
    pool: PgPool,
    webhooks: WebhookService,
    email: EmailClient,
    app_url: String,
}

async fn append_audit(
    tx: &mut Transaction<'_, Postgres>,
    request_id: Uuid,
    actor_id: Uuid,
    action: &str,
    details: Value,
) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO approval_audit_logs (id, request_id, actor_id, action, details) VALUES ($1, $2, $3, $4, $5)")
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(actor_id)
        .bind(action)
        .bind(details)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl ApprovalService {
    pub fn new(pool: PgPool, webhooks: WebhookService, email: EmailClient, app_url: impl Into<String>) -> Self {
        Self { pool, webhooks, email, app_url: app_url.into() }
    }

    // Workflows

    pub async fn workflows(&self, company_id: Uuid, page: Page) -> Result<Vec<ApprovalWorkflow>, ApiError> {
        let workflows = sqlx::query_as(
            "SELECT * FROM approval_workflows WHERE company_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(company_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(workflows)
    }

    async fn workflow(&self, company_id: Uuid, id: Uuid) -> Result<ApprovalWorkflow, ApiError> {
        sqlx::query_as("SELECT * FROM approval_workflows WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Workflow not found"))
    }

    async fn steps(&self, workflow_id: Uuid) -> Result<Vec<ApprovalWorkflowStep>, ApiError> {
        let steps = sqlx::query_as("SELECT * FROM approval_workflow_steps WHERE workflow_id = $1 ORDER BY step_order")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(steps)
    }

    pub async fn workflow_detail(&self, company_id: Uuid, id: Uuid) -> Result<WorkflowDetail, ApiError> {
        let workflow = self.workflow(company_id, id).await?;
        let steps = self.steps(workflow.id).await?;
        Ok(WorkflowDetail { workflow, steps })
    }

    pub async fn create_workflow(
        &self,
        company_id: Uuid,
        created_by: Uuid,
        request: CreateWorkflowRequest,
    ) -> Result<WorkflowDetail, ApiError> {
        for (i, step) in request.steps.iter().enumerate() {
            if let Some(user_id) = step.approver_user_id {
                let member: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM company_members WHERE company_id = $1 AND user_id = $2")
                    .bind(company_id)
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;
                if member.is_none() {
                    return Err(ApiError::invalid_field(
                        &format!("steps[{}].approver_user_id", i),
                        "Approver is not a member of this company",
                    ));
                }
            }
        }

        let mut tx = self.pool.begin().await?;
        let workflow: ApprovalWorkflow = sqlx::query_as(
            "INSERT INTO approval_workflows (id, company_id, name, description, created_by) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(request.name.trim())
        .bind(request.description)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        let mut steps = Vec::with_capacity(request.steps.len());
        for (i, step) in request.steps.into_iter().enumerate() {
            let created: ApprovalWorkflowStep = sqlx::query_as(
                r#"
                INSERT INTO approval_workflow_steps (id, workflow_id, step_order, name, approver_user_id, approver_role)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(workflow.id)
            .bind(i as i32 + 1)
            .bind(step.name.trim())
            .bind(step.approver_user_id)
            .bind(step.approver_role.map(|r| r.as_str()))
            .fetch_one(&mut *tx)
            .await?;
            steps.push(created);
        }
        tx.commit().await?;

        tracing::info!(company_id = %company_id, workflow_id = %workflow.id, steps = steps.len(), "Approval workflow created");
        Ok(WorkflowDetail { workflow, steps })
    }

    /// Refused while any request still references the workflow
    pub async fn delete_workflow(&self, company_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        let workflow = self.workflow(company_id, id).await?;
        let in_use: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM approval_requests WHERE workflow_id = $1")
            .bind(workflow.id)
            .fetch_one(&self.pool)
            .await?;
        if in_use.0 > 0 {
            return Err(ApiError::validation("Workflow is referenced by approval requests"));
        }

        sqlx::query("DELETE FROM approval_workflows WHERE id = $1 AND company_id = $2")
            .bind(workflow.id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Requests

    pub async fn requests(&self, company_id: Uuid, filter: &RequestFilter) -> Result<Vec<ApprovalRequest>, ApiError> {
        let page = Page { limit: filter.limit, offset: filter.offset };
        let requests = sqlx::query_as(
            r#"
            SELECT * FROM approval_requests
            WHERE company_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR tender_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(company_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.tender_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn request(&self, company_id: Uuid, id: Uuid) -> Result<ApprovalRequest, ApiError> {
        sqlx::query_as("SELECT * FROM approval_requests WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Approval request not found"))
    }

    pub async fn request_detail(&self, company_id: Uuid, id: Uuid) -> Result<RequestDetail, ApiError> {
        let request = self.request(company_id, id).await?;
        let steps = self.steps(request.workflow_id).await?;
        let decisions = sqlx::query_as("SELECT * FROM approval_decisions WHERE request_id = $1 ORDER BY created_at")
            .bind(request.id)
            .fetch_all(&self.pool)
            .await?;
        let audit_log = sqlx::query_as("SELECT * FROM approval_audit_logs WHERE request_id = $1 ORDER BY created_at")
            .bind(request.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(RequestDetail { request, steps, decisions, audit_log })
    }

    pub async fn create_request(
        &self,
        company_id: Uuid,
        requested_by: Uuid,
        input: CreateApprovalRequest,
    ) -> Result<ApprovalRequest, ApiError> {
        let workflow = self.workflow(company_id, input.workflow_id).await?;
        if !workflow.is_active {
            return Err(ApiError::invalid_field("workflow_id", "Workflow is not active"));
        }

        let tender: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenders WHERE id = $1 AND company_id = $2")
            .bind(input.tender_id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        if tender.is_none() {
            return Err(ApiError::not_found("Tender not found"));
        }

        let steps = self.steps(workflow.id).await?;
        let first = first_step(&steps)?;

        let mut tx = self.pool.begin().await?;
        let request: ApprovalRequest = sqlx::query_as(
            r#"
            INSERT INTO approval_requests (id, company_id, tender_id, workflow_id, current_step_id, title, comment, status, requested_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(input.tender_id)
        .bind(workflow.id)
        .bind(first.id)
        .bind(input.title.trim())
        .bind(input.comment)
        .bind(ApprovalStatus::Pending.as_str())
        .bind(requested_by)
        .fetch_one(&mut *tx)
        .await?;
        append_audit(&mut tx, request.id, requested_by, "created", json!({ "step_id": first.id, "step_name": first.name })).await?;
        tx.commit().await?;

        tracing::info!(request_id = %request.id, workflow_id = %workflow.id, "Approval requested");
        self.notify_approvers(company_id, &request, first).await;
        self.webhooks.emit(company_id, events::APPROVAL_REQUESTED, json!(request));
        Ok(request)
    }

    pub async fn decide(
        &self,
        company_id: Uuid,
        request_id: Uuid,
        actor_id: Uuid,
        actor_role: MemberRole,
        input: DecisionRequest,
    ) -> Result<ApprovalRequest, ApiError> {
        let request = self.request(company_id, request_id).await?;
        if request.status != ApprovalStatus::Pending {
            return Err(ApiError::validation(format!("Request is already {}", request.status)));
        }

        let steps = self.steps(request.workflow_id).await?;
        let current = request
            .current_step_id
            .and_then(|id| steps.iter().find(|s| s.id == id))
            .ok_or_else(|| ApiError::internal("Approval request has no current step"))?;

        if !can_decide(current, actor_id, actor_role) {
            tracing::debug!(request_id = %request.id, actor_id = %actor_id, "Decision refused for non-approver");
            return Err(ApiError::authorization("You are not an approver for this step"));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO approval_decisions (id, request_id, step_id, decided_by, decision, comment) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(request.id)
        .bind(current.id)
        .bind(actor_id)
        .bind(input.decision.as_str())
        .bind(&input.comment)
        .execute(&mut *tx)
        .await?;

        let details = json!({ "step_id": current.id, "step_name": current.name, "comment": input.comment });
        let (updated, event, next): (ApprovalRequest, Option<&'static str>, Option<&ApprovalWorkflowStep>) = match input.decision {
            DecisionKind::Reject => {
                append_audit(&mut tx, request.id, actor_id, "rejected", details).await?;
                let updated = self.finish(&mut tx, request.id, ApprovalStatus::Rejected).await?;
                (updated, Some(events::APPROVAL_REJECTED), None)
            }
            DecisionKind::Approve => match next_step(&steps, current.id) {
                Some(next) => {
                    append_audit(&mut tx, request.id, actor_id, "step_approved", details).await?;
                    let updated: ApprovalRequest = sqlx::query_as(
                        "UPDATE approval_requests SET current_step_id = $2, updated_at = now() WHERE id = $1 RETURNING *",
                    )
                    .bind(request.id)
                    .bind(next.id)
                    .fetch_one(&mut *tx)
                    .await?;
                    (updated, None, Some(next))
                }
                None => {
                    append_audit(&mut tx, request.id, actor_id, "approved", details).await?;
                    let updated = self.finish(&mut tx, request.id, ApprovalStatus::Approved).await?;
                    (updated, Some(events::APPROVAL_APPROVED), None)
                }
            },
        };
        tx.commit().await?;

        tracing::info!(request_id = %updated.id, decision = %input.decision, status = %updated.status, "Approval decision recorded");
        if let Some(next) = next {
            self.notify_approvers(company_id, &updated, next).await;
        }
        if let Some(event) = event {
            self.webhooks.emit(company_id, event, json!(updated));
        }
        Ok(updated)
    }

    /// Only the requester or an admin may cancel a pending request
    pub async fn cancel(
        &self,
        company_id: Uuid,
        request_id: Uuid,
        actor_id: Uuid,
        actor_role: MemberRole,
    ) -> Result<ApprovalRequest, ApiError> {
        let request = self.request(company_id, request_id).await?;
        if request.status != ApprovalStatus::Pending {
            return Err(ApiError::validation(format!("Request is already {}", request.status)));
        }
        if request.requested_by != actor_id && !actor_role.at_least(MemberRole::Admin) {
            return Err(ApiError::authorization("Only the requester or an admin can cancel this request"));
        }

        let mut tx = self.pool.begin().await?;
        append_audit(&mut tx, request.id, actor_id, "cancelled", json!({})).await?;
        let updated = self.finish(&mut tx, request.id, ApprovalStatus::Cancelled).await?;
        tx.commit().await?;

        self.webhooks.emit(company_id, events::APPROVAL_CANCELLED, json!(updated));
        Ok(updated)
    }

    async fn finish(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request_id: Uuid,
        status: ApprovalStatus,
    ) -> Result<ApprovalRequest, ApiError> {
        let updated = sqlx::query_as(
            "UPDATE approval_requests SET status = $2, completed_at = now(), updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(request_id)
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await?;
        Ok(updated)
    }

    /// Email everyone who can decide `step`. Failures are logged only.
    async fn notify_approvers(&self, company_id: Uuid, request: &ApprovalRequest, step: &ApprovalWorkflowStep) {
        if !self.email.is_configured() {
            return;
        }

        let recipients: Result<Vec<(String,)>, sqlx::Error> = match step.approver_user_id {
            Some(user_id) => {
                sqlx::query_as("SELECT email FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let required = step.required_role().unwrap_or(MemberRole::Admin);
                let roles: Vec<String> = MemberRole::ALL
                    .iter()
                    .filter(|r| r.at_least(required))
                    .map(|r| r.as_str().to_string())
                    .collect();
                sqlx::query_as(
                    "SELECT u.email FROM company_members m JOIN users u ON u.id = m.user_id WHERE m.company_id = $1 AND m.role = ANY($2)",
                )
                .bind(company_id)
                .bind(&roles)
                .fetch_all(&self.pool)
                .await
            }
        };

        let recipients = match recipients {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(request_id = %request.id, "Could not load approvers: {}", e);
                return;
            }
        };

        let review_url = format!("{}/approvals/{}", self.app_url.trim_end_matches('/'), request.id);
        let (subject, html) = approval_email(&request.title, &step.name, &review_url);
        for (address,) in recipients {
            if let Err(e) = self.email.send(&address, &subject, &html).await {
                tracing::warn!(request_id = %request.id, "Approval email not sent: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn step(order: i32, user: Option<Uuid>, role: Option<&str>) -> ApprovalWorkflowStep {
        ApprovalWorkflowStep {
            id: Uuid::new_v4(),
            workflow_id: Uuid::nil(),
            step_order: order,
            name: format!("Étape {}", order),
            approver_user_id: user,
            approver_role: role.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn zero_step_workflow_is_rejected() {
        let err = first_step(&[]).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn steps_follow_step_order() {
        let steps = vec![step(3, None, None), step(1, None, None), step(2, None, None)];
        let first = first_step(&steps).unwrap();
        assert_eq!(first.step_order, 1);

        let second = next_step(&steps, first.id).unwrap();
        assert_eq!(second.step_order, 2);
        let third = next_step(&steps, second.id).unwrap();
        assert_eq!(third.step_order, 3);
        assert!(next_step(&steps, third.id).is_none());
        assert!(next_step(&steps, Uuid::new_v4()).is_none());
    }

    #[test]
    fn named_approver_decides_alone() {
        let approver = Uuid::new_v4();
        let named = step(1, Some(approver), Some("member"));
        assert!(can_decide(&named, approver, MemberRole::Member));
        assert!(!can_decide(&named, Uuid::new_v4(), MemberRole::Owner));
    }

    #[test]
    fn role_steps_accept_higher_roles() {
        let by_role = step(1, None, Some("admin"));
        assert!(can_decide(&by_role, Uuid::new_v4(), MemberRole::Owner));
        assert!(can_decide(&by_role, Uuid::new_v4(), MemberRole::Admin));
        assert!(!can_decide(&by_role, Uuid::new_v4(), MemberRole::Member));

        let open = step(1, None, None);
        assert!(!can_decide(&open, Uuid::new_v4(), MemberRole::Member));
        assert!(can_decide(&open, Uuid::new_v4(), MemberRole::Admin));
    }

    #[test]
    fn workflow_steps_need_names() {
        let request = CreateWorkflowRequest {
            name: "Validation direction".to_string(),
            description: None,
            steps: vec![StepInput { name: "".to_string(), approver_user_id: None, approver_role: None }],
        };
        let body = request.validate().unwrap_err().to_json();
        assert!(body["field_errors"].get("steps[0].name").is_some());
    }
}
