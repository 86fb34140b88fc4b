pub mod api;
pub mod api_keys;
pub mod audit;
pub mod bank;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod store;

use std::sync::Arc;

use anyhow::Context;

use api_keys::{ensure_default_key, KeyRegistry, StoreKeyRegistry};
use audit::{AccessLogStore, AccessLogWriter};
use bank::QuestionBank;
use config::{Config, StoreKind};
use rate_limit::{FixedWindowLimiter, RateLimit};
use store::{DocumentStore, MemoryStore, SqliteStore};

/// Shared handles every request sees. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub bank: Arc<QuestionBank>,
    pub keys: Arc<dyn KeyRegistry>,
    pub limiter: Arc<dyn RateLimit>,
    pub access_log: AccessLogWriter,
    /// Read the client address from `x-forwarded-for`.
    pub trust_proxy: bool,
}

impl AppState {
    /// Question bank and key registry over the same store.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        limiter: Arc<dyn RateLimit>,
        access_log: AccessLogWriter,
    ) -> Self {
        Self {
            bank: Arc::new(QuestionBank::new(store.clone())),
            keys: Arc::new(StoreKeyRegistry::new(store)),
            limiter,
            access_log,
            trust_proxy: false,
        }
    }

    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    Ok(match config.store {
        StoreKind::Sqlite => {
            let path = config.data_dir.join("theorio.db");
            let store = SqliteStore::open(&path)
                .with_context(|| format!("opening document store at {}", path.display()))?;
            log::info!("Document store: {}", path.display());
            Arc::new(store)
        }
        StoreKind::Memory => {
            log::warn!("Document store: in-memory, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    })
}

/// Run the API until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let store = open_store(&config)?;

    if config.store == StoreKind::Sqlite || config.bootstrap_key {
        ensure_default_key(store.as_ref(), &config.data_dir)
            .await
            .context("creating default API key")?;
    }

    let log_store = Arc::new(
        AccessLogStore::open(&config.data_dir).context("opening access log database")?,
    );
    let (access_log, log_task) = audit::writer::create(log_store, config.access_log_retention);
    let log_task = tokio::spawn(log_task);

    let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit, config.rate_window));
    if config.trust_proxy {
        log::info!("Client addresses taken from x-forwarded-for");
    }
    let state = AppState::new(store, limiter, access_log).trusting_proxy(config.trust_proxy);

    api::start_server(state, config.bind, config.body_limit, shutdown_signal())
        .await
        .context("serving HTTP")?;

    // The router held the last writer handles; wait for the final flush
    if let Err(e) = log_task.await {
        log::error!("Access log writer task failed: {}", e);
    }
    log::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
