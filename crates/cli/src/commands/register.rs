//! `mimir register` - Register a face identity from a photo file.

use mimir_gateway::AppState;
use std::path::Path;

pub async fn run(email: &str, name: &str, role: &str, photo: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let bytes = std::fs::read(photo).map_err(|e| format!("Cannot read {}: {e}", photo.display()))?;

    let state = AppState::from_config(&config).await?;
    match state.auth.register_identity(&bytes, email, name, role).await {
        Ok(identity) => {
            println!("✅ Registered {} ({}) as {}", identity.display_name, identity.user_id, identity.role);
            Ok(())
        }
        Err(e) => Err(format!("Registration failed [{}]: {e}", e.code()).into()),
    }
}
