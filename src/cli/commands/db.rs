use clap::Subcommand;
use serde_json::json;

use crate::cli::{utils, OutputFormat};
use crate::database::DatabaseManager;

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Apply pending migrations")]
    Migrate,

    #[command(about = "Check database connectivity")]
    Health,
}

pub async fn handle(cmd: DbCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = utils::connect().await?;

    match cmd {
        DbCommands::Migrate => {
            DatabaseManager::migrate(&pool).await?;
            utils::output_success(output_format, "Migrations applied", None)
        }
        DbCommands::Health => {
            DatabaseManager::health_check(&pool).await?;
            utils::output_success(output_format, "Database reachable", Some(json!({ "database": "ok" })))
        }
    }
}
