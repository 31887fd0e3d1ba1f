use clap::Subcommand;

use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// YAML by default; `--json` prints JSON
    #[command(about = "Print the configuration resolved from the environment (secrets omitted)")]
    Show,
}

pub async fn handle(cmd: ConfigCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = crate::config::config();
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
                OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
            }
            Ok(())
        }
    }
}
