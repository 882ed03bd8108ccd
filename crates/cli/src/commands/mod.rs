pub mod gateway;
pub mod ingest;
pub mod onboard;
pub mod register;
pub mod status;

use mimir_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
