//! tablegate HTTP server
//!
//! Run with: cargo run --release --features server --bin tablegate-server
//!
//! Configuration comes from `TABLEGATE_*` environment variables; see
//! `ServerConfig::from_env`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablegate::cache::{Backend, Invalidation, PermissionCache, SchemaCache};
use tablegate::config::ServerConfig;
use tablegate::constants::DEFAULT_SOURCE;
use tablegate::db::MetadataStore;
use tablegate::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablegate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(port = config.port, db_path = %config.db_path.display(), "starting tablegate");

    let store = MetadataStore::open_with_map_size(&config.db_path, config.map_size)?;
    let mut cache = PermissionCache::new().with_backend(DEFAULT_SOURCE, Backend::with_catalog(config.load_catalog()?));

    // Stored permissions are compiled once up front; failures are only reported
    let report = cache.rebuild(&store.view()?, &Invalidation::Full)?;
    for object in &report.inconsistent {
        tracing::warn!(object = %object.id, reason = %object.reason, "inconsistent permission at startup");
    }

    let state = Arc::new(AppState::new(store, cache, config.admin_secret.clone()));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
