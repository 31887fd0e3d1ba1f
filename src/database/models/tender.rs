use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Lifecycle status of a tender. Any status may be written over any other.
    pub enum TenderStatus {
        Draft => "draft",
        Analysis => "analysis",
        InProgress => "in_progress",
        Review => "review",
        Submitted => "submitted",
        Won => "won",
        Lost => "lost",
        Abandoned => "abandoned",
    }
}

impl TenderStatus {
    /// Statuses that still represent live work
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TenderStatus::Draft | TenderStatus::Analysis | TenderStatus::InProgress | TenderStatus::Review
        )
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tender {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub reference: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_reference: Option<String>,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TenderStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_value: Option<Decimal>,
    pub currency: String,
    pub source_url: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A section of a tender response, written by hand or generated
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResponseDocument {
    pub id: Uuid,
    pub company_id: Uuid,
    pub tender_id: Uuid,
    pub section: String,
    pub title: String,
    pub content: String,
    pub generated_by_ai: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
