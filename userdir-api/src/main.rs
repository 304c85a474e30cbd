//! # UserDir API Server
//!
//! HTTP server for the multi-site user directory.
//!
//! ## Startup
//!
//! 1. Load configuration from the environment (`.env` honoured)
//! 2. Connect the Postgres pool and apply migrations
//! 3. Pick the query cache: Redis when `REDIS_URL` is set, in-process otherwise
//! 4. Serve until Ctrl+C
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p userdir-api
//! ```

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userdir_api::{
    app::{build_router, AppState},
    config::Config,
};
use userdir_shared::cache::{
    redis::{RedisCacheConfig, RedisQueryCache},
    MemoryQueryCache, QueryCache,
};
use userdir_shared::db::{migrations::run_migrations, pool};
use userdir_shared::directory::{resolver::HostSiteResolver, UserDirectory};
use userdir_shared::store::postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "userdir_api=debug,userdir_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("UserDir API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = pool::create_pool(config.database.clone()).await?;
    run_migrations(&db).await?;

    let cache = build_cache(&config).await;
    let directory = UserDirectory::new(Arc::new(PgStore::new(db.clone())), Arc::new(HostSiteResolver))
        .with_cache(cache);

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(directory, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Redis cache when configured and reachable, in-process cache otherwise
async fn build_cache(config: &Config) -> Arc<dyn QueryCache> {
    let ttl = config.cache.ttl();

    if let Some(url) = &config.cache.redis_url {
        let redis_config = RedisCacheConfig {
            ttl,
            ..RedisCacheConfig::new(url.clone())
        };
        match RedisQueryCache::connect(redis_config).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, using in-process query cache");
            }
        }
    }

    Arc::new(MemoryQueryCache::new(ttl))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
