use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::database::DatabaseManager;

/// Print a success line, or a JSON object merging `data` into `{"success": true, "message": ...}`
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Connect with the process configuration
pub async fn connect() -> anyhow::Result<sqlx::PgPool> {
    let config = crate::config::config();
    let pool = DatabaseManager::connect(&config.database).await?;
    Ok(pool)
}
