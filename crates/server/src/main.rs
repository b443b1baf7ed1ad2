use std::{net::SocketAddr, time::Duration};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard_server::{
    app,
    config::Config,
    db::Database,
    services::{cache::ListCache, notify, storage::StorageService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let storage = StorageService::new(&config.storage_path);
    storage.init().await?;

    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    // Assignment notifications are delivered off the request path.
    let (notifier, rx) = notify::Notifier::channel(config.notify_queue_capacity);
    notify::spawn_worker(db.clone(), rx);

    let cache = ListCache::new(Duration::from_secs(config.list_cache_ttl_secs));

    let state = AppState {
        db,
        config: config.clone(),
        cache,
        notifier,
        storage,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
