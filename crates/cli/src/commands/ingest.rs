//! `mimir ingest` - Ingest a UTF-8 text file into a knowledge collection.

use mimir_agent::IngestTarget;
use mimir_core::knowledge::Scope;
use mimir_gateway::AppState;
use std::path::Path;
use tracing::debug;

pub async fn run(scope: &str, owner: Option<&str>, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let scope: Scope = scope.parse()?;
    let target = IngestTarget::from_scope(scope, owner)?;

    let text = std::fs::read_to_string(file).map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    let document = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!(chars = text.chars().count(), document = %document, scope = %target.scope(), "Read ingest file");

    let state = AppState::from_config(&config).await?;
    let report = state.ingestor.ingest_text(&target, &document, &text).await?;
    println!(
        "✅ Ingested {} passages from {} into {}",
        report.passages,
        file.display(),
        report.collection_id
    );

    Ok(())
}
