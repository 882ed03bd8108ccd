//! `mimir status` - Show configuration and store counts.

use mimir_config::AppConfig;
use mimir_gateway::Stores;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    println!("Mimir Status");
    println!("============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Completion:   {} / {}", config.completion.provider, config.completion.model);
    println!("  Embedding:    {} / {}", config.embedding.provider, config.embedding.model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Face service: {}", config.face.service_url);
    println!("  Threshold:    {} (tie epsilon {})", config.face.threshold, config.face.tie_epsilon);
    println!(
        "  Session:      {} min, logout {}",
        config.session.validity_minutes,
        if config.session.strict_logout { "strict" } else { "advisory" }
    );
    println!(
        "  Retrieval:    top_k {}, budget {} {:?}",
        config.retrieval.top_k, config.retrieval.context_budget, config.retrieval.budget_unit
    );
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Storage:      {}", config.storage.backend);

    println!("\n  Roles:");
    for role in &config.sources.roles {
        println!("    {:<24} {}", role.name, role.scopes.join(", "));
    }

    let stores = Stores::from_config(&config).await?;
    let identities = stores.identities.count().await?;
    let collections = stores.knowledge.list_collections().await?;
    println!("\n  Identities:   {identities}");
    println!("  Collections:  {}", collections.len());
    for stats in &collections {
        println!("    {:<40} {} passages", stats.collection_id, stats.passage_count);
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file - run `mimir onboard` first");
    }

    Ok(())
}
