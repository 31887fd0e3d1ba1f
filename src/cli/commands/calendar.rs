use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::cli::{utils, OutputFormat};
use crate::services::CalendarService;

#[derive(Subcommand)]
pub enum CalendarCommands {
    #[command(about = "Export a company's events as iCalendar")]
    Export {
        #[arg(long, help = "Company id")]
        company: Uuid,
        #[arg(long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },
}

pub async fn handle(cmd: CalendarCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        CalendarCommands::Export { company, output } => {
            let pool = utils::connect().await?;
            let ics = CalendarService::new(pool).export_ics(company).await?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, ics.as_bytes())
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    utils::output_success(
                        output_format,
                        &format!("Calendar written to {}", path.display()),
                        Some(json!({ "path": path, "bytes": ics.len() })),
                    )
                }
                None => {
                    print!("{}", ics);
                    Ok(())
                }
            }
        }
    }
}
