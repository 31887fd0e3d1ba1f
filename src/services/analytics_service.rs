use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::cache::{keys, Cache};
use crate::database::models::TenderStatus;
use crate::error::ApiError;
use crate::format::format_currency;

const UPCOMING_LIMIT: i64 = 5;
const DISPLAY_LOCALE: &str = "fr-FR";
const DISPLAY_CURRENCY: &str = "EUR";

/// `won / (won + lost) * 100`, or 0 when nothing has been decided
pub fn win_rate(won: i64, lost: i64) -> f64 {
    let decided = won + lost;
    if decided <= 0 {
        return 0.0;
    }
    won as f64 / decided as f64 * 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UpcomingDeadline {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardTotals {
    pub total_tenders: i64,
    pub open_tenders: i64,
    pub submitted: i64,
    pub won: i64,
    pub lost: i64,
    pub win_rate: f64,
    pub pipeline_value: Decimal,
    pub won_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub totals: DashboardTotals,
    pub pipeline_value_display: String,
    pub won_value_display: String,
    pub by_status: Vec<StatusCount>,
    pub upcoming_deadlines: Vec<UpcomingDeadline>,
    pub generated_at: DateTime<Utc>,
}

/// Fold per-status counts into dashboard totals; unknown statuses only count toward the total
pub fn summarize(counts: &[StatusCount]) -> DashboardTotals {
    let mut totals = DashboardTotals::default();
    for row in counts {
        totals.total_tenders += row.count;
        let Ok(status) = row.status.parse::<TenderStatus>() else {
            continue;
        };
        if status.is_open() {
            totals.open_tenders += row.count;
            totals.pipeline_value += row.total_value;
        }
        match status {
            TenderStatus::Submitted => totals.submitted += row.count,
            TenderStatus::Won => {
                totals.won += row.count;
                totals.won_value += row.total_value;
            }
            TenderStatus::Lost => totals.lost += row.count,
            _ => {}
        }
    }
    totals.win_rate = win_rate(totals.won, totals.lost);
    totals
}

pub struct AnalyticsService {
    pool: PgPool,
    cache: Cache,
    ttl: Duration,
}

impl AnalyticsService {
    pub fn new(pool: PgPool, cache: Cache, ttl: Duration) -> Self {
        Self { pool, cache, ttl }
    }

    /// Cached per company; tender mutations invalidate it
    pub async fn dashboard(&self, company_id: Uuid) -> Result<Dashboard, ApiError> {
        self.cache
            .get_or_set(&keys::dashboard(company_id), Some(self.ttl), || self.compute_dashboard(company_id))
            .await
    }

    pub async fn status_counts(&self, company_id: Uuid) -> Result<Vec<StatusCount>, ApiError> {
        let counts = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(estimated_value), 0) AS total_value
            FROM tenders
            WHERE company_id = $1
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn compute_dashboard(&self, company_id: Uuid) -> Result<Dashboard, ApiError> {
        let by_status = self.status_counts(company_id).await?;
        let upcoming_deadlines = sqlx::query_as(
            r#"
            SELECT id, title, status, deadline
            FROM tenders
            WHERE company_id = $1
              AND deadline >= now()
              AND status IN ('draft', 'analysis', 'in_progress', 'review')
            ORDER BY deadline
            LIMIT $2
            "#,
        )
        .bind(company_id)
        .bind(UPCOMING_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let totals = summarize(&by_status);
        Ok(Dashboard {
            pipeline_value_display: format_currency(totals.pipeline_value, DISPLAY_CURRENCY, DISPLAY_LOCALE),
            won_value_display: format_currency(totals.won_value, DISPLAY_CURRENCY, DISPLAY_LOCALE),
            totals,
            by_status,
            upcoming_deadlines,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(status: &str, count: i64, value: i64) -> StatusCount {
        StatusCount { status: status.to_string(), count, total_value: Decimal::from(value) }
    }

    #[test]
    fn win_rate_two_won_one_lost() {
        let rate = win_rate(2, 1);
        assert!((rate - 66.67).abs() < 0.01, "rate was {}", rate);
    }

    #[test]
    fn win_rate_is_zero_without_decisions() {
        assert_eq!(win_rate(0, 0), 0.0);
        assert_eq!(win_rate(0, 3), 0.0);
        assert_eq!(win_rate(4, 0), 100.0);
    }

    #[test]
    fn summarize_ignores_pending_in_win_rate() {
        let totals = summarize(&[
            count("won", 2, 300),
            count("lost", 1, 50),
            count("draft", 1, 1000),
            count("submitted", 3, 0),
        ]);
        assert_eq!(totals.total_tenders, 7);
        assert_eq!(totals.open_tenders, 1);
        assert_eq!(totals.submitted, 3);
        assert_eq!(totals.pipeline_value, Decimal::from(1000));
        assert_eq!(totals.won_value, Decimal::from(300));
        assert!((totals.win_rate - 66.67).abs() < 0.01);
    }

    #[test]
    fn summarize_empty() {
        let totals = summarize(&[]);
        assert_eq!(totals, DashboardTotals::default());
    }
}
