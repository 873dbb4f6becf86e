use secops_console::config::ConsoleConfig;
use secops_console::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("🚀 SecOps console starting...");

    let config = ConsoleConfig::from_env()?;
    server::run(config).await
}
