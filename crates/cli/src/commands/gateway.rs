//! `mimir gateway` - Start the HTTP API server.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Mimir Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Admin routes: {}",
        if config.gateway.admin_key.is_some() { "enabled" } else { "disabled (no admin key)" }
    );
    println!("   Logout: {}", if config.session.strict_logout { "strict" } else { "advisory" });

    mimir_gateway::start(config).await?;

    Ok(())
}
