use serde::Deserialize;
use sqlx::{postgres::PgRow, FromRow, PgPool};
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Pagination parameters accepted by list endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Company-scoped read/delete access to a table keyed by `id` with a `company_id` column
pub struct Repository<T> {
    table_name: &'static str,
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(table_name: &'static str, pool: PgPool) -> Self {
        Self {
            table_name,
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    fn table(&self) -> Result<String, DatabaseError> {
        DatabaseManager::quote_identifier(self.table_name)
    }

    pub async fn select_page(&self, company_id: Uuid, page: Page) -> Result<Vec<T>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE company_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            self.table()?
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(company_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn select_one(&self, company_id: Uuid, id: Uuid) -> Result<Option<T>, DatabaseError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1 AND company_id = $2", self.table()?);
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn select_404(&self, company_id: Uuid, id: Uuid) -> Result<T, DatabaseError> {
        self.select_one(company_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} record not found", self.table_name)))
    }

    pub async fn count(&self, company_id: Uuid) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE company_id = $1", self.table()?);
        let count: (i64,) = sqlx::query_as(&sql).bind(company_id).fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    pub async fn delete(&self, company_id: Uuid, id: Uuid) -> Result<(), DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND company_id = $2", self.table()?);
        let result = sqlx::query(&sql).bind(id).bind(company_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} record not found", self.table_name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_clamps() {
        let page = Page::default();
        assert_eq!(page.limit(), DEFAULT_LIMIT);
        assert_eq!(page.offset(), 0);

        let page = Page { limit: Some(10_000), offset: Some(-3) };
        assert_eq!(page.limit(), MAX_LIMIT);
        assert_eq!(page.offset(), 0);

        let page = Page { limit: Some(0), offset: Some(20) };
        assert_eq!(page.limit(), 1);
        assert_eq!(page.offset(), 20);
    }
}
