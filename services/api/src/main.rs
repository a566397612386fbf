use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod extract;
mod jobs;
mod middleware;
mod routes;
mod state;

use common::database::{DatabaseConfig, init_pool, run_migrations};
use stays::{
    AuditLogHandler, BookingPolicy, MemoryStore, OutboxRelay, PgStore, SandboxGateway, Stays,
    Store, SystemClock,
};
use tokio::net::TcpListener;

use crate::{
    config::{Settings, StorageBackend},
    middleware::JwtVerifier,
    state::AppState,
};

async fn open_store(backend: StorageBackend) -> Result<Arc<dyn Store>> {
    match backend {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            if common::database::health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting stays API service");

    let settings = Settings::load()?;
    let store = open_store(settings.storage).await?;

    let policy = BookingPolicy {
        enforce_host_blocks: settings.enforce_host_blocks,
        currency: settings.currency.clone(),
    };
    let stays = Stays::new(
        store.clone(),
        Arc::new(SandboxGateway::new(settings.checkout_base_url.clone())),
        Arc::new(SystemClock),
        policy,
    );

    let relay = OutboxRelay::new(store, settings.outbox_batch_size)
        .with_handler(Arc::new(AuditLogHandler));
    let _scheduler = jobs::start(
        relay,
        stays.payments.clone(),
        &settings.outbox_schedule,
        &settings.reconcile_schedule,
    )
    .await?;

    let app_state = AppState {
        stays,
        jwt: JwtVerifier::new(&settings.jwt_secret),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&settings.bind_address).await?;
    info!("API service listening on {}", settings.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
