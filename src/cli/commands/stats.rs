use std::time::Duration;

use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::cache::Cache;
use crate::cli::{utils, OutputFormat};
use crate::services::analytics_service::summarize;
use crate::services::AnalyticsService;

#[derive(Subcommand)]
pub enum StatsCommands {
    #[command(about = "Won / (won + lost) for a company")]
    WinRate {
        #[arg(long, help = "Company id")]
        company: Uuid,
    },
}

pub async fn handle(cmd: StatsCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        StatsCommands::WinRate { company } => {
            let config = crate::config::config();
            let pool = utils::connect().await?;
            // Counts are read fresh; the cache is never consulted for this query
            let cache = Cache::in_memory(config.cache.key_prefix.clone());
            let analytics = AnalyticsService::new(pool, cache, Duration::from_secs(config.cache.dashboard_ttl_secs));

            let totals = summarize(&analytics.status_counts(company).await?);
            let message = format!(
                "Win rate {:.2}% ({} won, {} lost, {} tenders)",
                totals.win_rate, totals.won, totals.lost, totals.total_tenders
            );
            utils::output_success(
                output_format,
                &message,
                Some(json!({
                    "company_id": company,
                    "win_rate": totals.win_rate,
                    "won": totals.won,
                    "lost": totals.lost,
                })),
            )
        }
    }
}
