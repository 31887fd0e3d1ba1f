pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tenderdesk")]
#[command(about = "TenderDesk admin CLI - configuration, database and reporting tasks")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Inspect the effective configuration")]
    Config {
        #[command(subcommand)]
        cmd: commands::config::ConfigCommands,
    },

    #[command(about = "Database migrations and health")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "Calendar exports")]
    Calendar {
        #[command(subcommand)]
        cmd: commands::calendar::CalendarCommands,
    },

    #[command(about = "Company statistics")]
    Stats {
        #[command(subcommand)]
        cmd: commands::stats::StatsCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Config { cmd } => commands::config::handle(cmd, output_format).await,
        Commands::Db { cmd } => commands::db::handle(cmd, output_format).await,
        Commands::Calendar { cmd } => commands::calendar::handle(cmd, output_format).await,
        Commands::Stats { cmd } => commands::stats::handle(cmd, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_calendar_export() {
        let cli = Cli::try_parse_from([
            "tenderdesk",
            "calendar",
            "export",
            "--company",
            "6f1c1a1e-8a4b-4c55-9a7e-0d2b5f3c9e11",
            "--output",
            "out.ics",
        ])
        .unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
        assert!(matches!(cli.command, Commands::Calendar { .. }));
    }

    #[test]
    fn config_show_accepts_json() {
        let cli = Cli::try_parse_from(["tenderdesk", "config", "show", "--json"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
    }

    #[test]
    fn global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["tenderdesk", "db", "health", "--json"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
    }
}
