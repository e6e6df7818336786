use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::config::Settings;
use payflow::domain::ports::SharedOrderStore;
use payflow::infrastructure::in_memory::InMemoryOrderStore;
use payflow::infrastructure::providers::ProviderRegistry;
use payflow::interfaces::http::{AppState, router};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn open_store(settings: &Settings) -> Result<SharedOrderStore> {
    match &settings.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = payflow::infrastructure::rocksdb::RocksDBStore::open(db_path)
                .into_diagnostic()?;
            info!(path = %db_path.display(), "Using RocksDB order store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
        None => {
            info!("Using in-memory order store");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("payflow=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = open_store(&settings)?;
    let providers = ProviderRegistry::from_settings(&settings).into_diagnostic()?;
    let state = AppState::new(store, providers, &settings).into_diagnostic()?;
    if state.demo_checkout {
        tracing::warn!("Demo checkout routes are enabled");
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .into_diagnostic()?;
    info!(addr = %listener.local_addr().into_diagnostic()?, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}
