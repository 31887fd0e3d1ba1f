use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the data access layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool construction and maintenance for the application database
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect eagerly, failing fast when the database is unreachable
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        Self::check_url(&config.url)?;

        let pool = Self::pool_options(config).connect(&config.url).await?;
        info!("Created database pool (max {} connections)", config.max_connections);
        Ok(pool)
    }

    /// Build a pool that opens connections on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        Self::check_url(&config.url)?;
        Ok(Self::pool_options(config).connect_lazy(&config.url)?)
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
    }

    fn check_url(url: &str) -> Result<(), DatabaseError> {
        if url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        Ok(())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Apply pending schema migrations from ./migrations
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Quote SQL identifier after validating it
    pub fn quote_identifier(name: &str) -> Result<String, DatabaseError> {
        if !Self::is_valid_identifier(name) {
            return Err(DatabaseError::InvalidIdentifier(name.to_string()));
        }
        Ok(format!("\"{}\"", name))
    }

    /// Lowercase snake_case identifiers only: [a-z_][a-z0-9_]*
    fn is_valid_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c == '_' => {}
            _ => return false,
        }
        name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_identifiers() {
        assert!(DatabaseManager::is_valid_identifier("tenders"));
        assert!(DatabaseManager::is_valid_identifier("approval_workflow_steps"));
        assert!(!DatabaseManager::is_valid_identifier("Tenders"));
        assert!(!DatabaseManager::is_valid_identifier("tenders; DROP TABLE users"));
        assert!(!DatabaseManager::is_valid_identifier("1tenders"));
        assert!(!DatabaseManager::is_valid_identifier(""));
    }

    #[test]
    fn quotes_valid_identifiers() {
        assert_eq!(DatabaseManager::quote_identifier("webhooks").unwrap(), "\"webhooks\"");
        assert!(DatabaseManager::quote_identifier("web\"hooks").is_err());
    }

    #[test]
    fn lazy_pool_requires_url() {
        let config = DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            connection_timeout: 1,
        };
        assert!(matches!(
            DatabaseManager::connect_lazy(&config),
            Err(DatabaseError::ConfigMissing("DATABASE_URL"))
        ));
    }
}
