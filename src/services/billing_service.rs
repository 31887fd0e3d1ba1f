use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::IntegrationsConfig;
use crate::database::models::Company;
use crate::error::ApiError;
use crate::integrations::stripe::{Invoice, StripeEvent};
use crate::integrations::StripeClient;
use crate::validation::{self, Validate};

const INVOICE_LIMIT: u32 = 24;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.plan, 64).map_err(|reason| ApiError::invalid_field("plan", reason))
    }
}

#[derive(Debug, Serialize)]
pub struct RedirectUrl {
    pub url: String,
}

/// Subscription columns to write for one Stripe event
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub company_id: Option<Uuid>,
    pub customer_id: String,
    pub status: Option<String>,
    pub plan: Option<String>,
}

fn str_at<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str)
}

/// Map a Stripe event to the subscription change it implies; other events map to `None`
pub fn subscription_update(event: &StripeEvent) -> Option<SubscriptionUpdate> {
    let object = &event.data.object;
    let customer_id = str_at(object, "/customer")?.to_string();

    match event.event_type.as_str() {
        "checkout.session.completed" => Some(SubscriptionUpdate {
            company_id: str_at(object, "/client_reference_id").and_then(|id| id.parse().ok()),
            customer_id,
            status: Some("active".to_string()),
            plan: str_at(object, "/metadata/plan").map(str::to_string),
        }),
        "customer.subscription.updated" => Some(SubscriptionUpdate {
            company_id: None,
            customer_id,
            status: str_at(object, "/status").map(str::to_string),
            plan: str_at(object, "/metadata/plan").map(str::to_string),
        }),
        "customer.subscription.deleted" => Some(SubscriptionUpdate {
            company_id: None,
            customer_id,
            status: Some("canceled".to_string()),
            plan: None,
        }),
        _ => None,
    }
}

pub struct BillingService<'a> {
    pool: PgPool,
    stripe: &'a StripeClient,
    config: &'a IntegrationsConfig,
}

impl<'a> BillingService<'a> {
    pub fn new(pool: PgPool, stripe: &'a StripeClient, config: &'a IntegrationsConfig) -> Self {
        Self { pool, stripe, config }
    }

    async fn company(&self, company_id: Uuid) -> Result<Company, ApiError> {
        sqlx::query_as("SELECT * FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Company not found"))
    }

    /// The company's Stripe customer, created on first use
    async fn ensure_customer(&self, company: &Company, billing_email: &str) -> Result<String, ApiError> {
        if let Some(customer_id) = &company.stripe_customer_id {
            return Ok(customer_id.clone());
        }
        let customer_id = self.stripe.create_customer(billing_email, &company.name, company.id).await?;
        sqlx::query("UPDATE companies SET stripe_customer_id = $2, updated_at = now() WHERE id = $1")
            .bind(company.id)
            .bind(&customer_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(company_id = %company.id, "Stripe customer created");
        Ok(customer_id)
    }

    pub async fn checkout(&self, company_id: Uuid, billing_email: &str, plan: &str) -> Result<RedirectUrl, ApiError> {
        let price_id = self
            .config
            .price_for_plan(plan)
            .ok_or_else(|| ApiError::invalid_field("plan", format!("Unknown plan '{}'", plan)))?;
        let company = self.company(company_id).await?;
        let customer_id = self.ensure_customer(&company, billing_email).await?;

        let base = self.config.app_url.trim_end_matches('/');
        let url = self
            .stripe
            .create_checkout_session(
                &customer_id,
                price_id,
                plan,
                company.id,
                &format!("{}/billing?checkout=success", base),
                &format!("{}/billing?checkout=cancelled", base),
            )
            .await?;
        Ok(RedirectUrl { url })
    }

    pub async fn portal(&self, company_id: Uuid) -> Result<RedirectUrl, ApiError> {
        let company = self.company(company_id).await?;
        let customer_id = company
            .stripe_customer_id
            .ok_or_else(|| ApiError::validation("No billing account exists for this company yet"))?;
        let return_url = format!("{}/billing", self.config.app_url.trim_end_matches('/'));
        let url = self.stripe.create_portal_session(&customer_id, &return_url).await?;
        Ok(RedirectUrl { url })
    }

    pub async fn invoices(&self, company_id: Uuid) -> Result<Vec<Invoice>, ApiError> {
        let company = self.company(company_id).await?;
        match company.stripe_customer_id {
            Some(customer_id) => Ok(self.stripe.list_invoices(&customer_id, INVOICE_LIMIT).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Apply a verified Stripe event. Returns whether any company row changed.
    pub async fn apply_event(&self, event: &StripeEvent) -> Result<bool, ApiError> {
        let Some(update) = subscription_update(event) else {
            tracing::debug!(event_type = %event.event_type, "Ignoring Stripe event");
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            UPDATE companies SET
                stripe_customer_id = $2,
                subscription_status = COALESCE($3, subscription_status),
                plan = CASE WHEN $3 = 'canceled' THEN NULL ELSE COALESCE($4, plan) END,
                updated_at = now()
            WHERE ($1::uuid IS NOT NULL AND id = $1) OR stripe_customer_id = $2
            "#,
        )
        .bind(update.company_id)
        .bind(&update.customer_id)
        .bind(&update.status)
        .bind(&update.plan)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            tracing::info!(event_id = %event.id, event_type = %event.event_type, status = ?update.status, "Subscription updated");
        } else {
            tracing::warn!(event_id = %event.id, customer = %update.customer_id, "Stripe event matched no company");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str, object: Value) -> StripeEvent {
        serde_json::from_value(serde_json::json!({ "id": "evt_1", "type": kind, "data": { "object": object } })).unwrap()
    }

    #[test]
    fn checkout_completion_activates_company() {
        let company_id = Uuid::new_v4();
        let update = subscription_update(&event(
            "checkout.session.completed",
            serde_json::json!({ "customer": "cus_1", "client_reference_id": company_id.to_string(), "metadata": { "plan": "pro" } }),
        ))
        .unwrap();
        assert_eq!(update.company_id, Some(company_id));
        assert_eq!(update.customer_id, "cus_1");
        assert_eq!(update.status.as_deref(), Some("active"));
        assert_eq!(update.plan.as_deref(), Some("pro"));
    }

    #[test]
    fn subscription_lifecycle_events() {
        let updated = subscription_update(&event(
            "customer.subscription.updated",
            serde_json::json!({ "customer": "cus_1", "status": "past_due" }),
        ))
        .unwrap();
        assert_eq!(updated.status.as_deref(), Some("past_due"));
        assert!(updated.plan.is_none());

        let deleted = subscription_update(&event(
            "customer.subscription.deleted",
            serde_json::json!({ "customer": "cus_1", "status": "canceled" }),
        ))
        .unwrap();
        assert_eq!(deleted.status.as_deref(), Some("canceled"));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert!(subscription_update(&event("invoice.paid", serde_json::json!({ "customer": "cus_1" }))).is_none());
        assert!(subscription_update(&event("customer.subscription.updated", serde_json::json!({}))).is_none());
    }
}
