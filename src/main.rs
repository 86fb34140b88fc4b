use anyhow::Result;
use tracing_subscriber::EnvFilter;

use theorio_api::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // `log` records from the library are forwarded into this subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        bind = %config.bind,
        store = ?config.store,
        data_dir = %config.data_dir.display(),
        "theorio-api starting"
    );

    theorio_api::run(config).await
}
