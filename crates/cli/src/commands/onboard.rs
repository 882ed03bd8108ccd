//! `mimir onboard` - First-time setup.

use mimir_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Mimir - First-Time Setup");
    println!("========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let config = if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        AppConfig::load_from(&config_path)?
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        AppConfig::default()
    };

    let db_path = config.storage.database_path();
    if let Some(data_dir) = db_path.parent() {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir)?;
            println!("✅ Created data directory: {}", data_dir.display());
        }
    }

    println!("\n📝 Next steps:");
    println!("   1. Set MIMIR_API_KEY (or AZURE_OPENAI_API_KEY) and AZURE_OPENAI_ENDPOINT");
    println!("   2. Set MIMIR_ADMIN_KEY and MIMIR_SESSION_SECRET");
    println!("   3. Point [face].service_url at the face embedding service");
    println!("   4. Run: mimir register --email <id> --name <name> --role <role> --photo <file>");
    println!("   5. Run: mimir gateway\n");

    Ok(())
}
