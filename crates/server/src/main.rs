//! Orderbox - order ingestion and lookup service.
//!
//! This binary serves the order lookup API on port 8081 and runs the stream
//! ingestion pipeline in the background.
//!
//! # Architecture
//!
//! - Axum web framework serving JSON lookups
//! - Bounded FIFO cache in front of `PostgreSQL`, hydrated at startup
//! - Ingestion pipeline consuming the in-process message stream
//! - Optional demo producer publishing sample traffic
//!
//! # Shutdown
//!
//! Ctrl+C or SIGTERM cancels one token shared by the HTTP server, the
//! pipeline and the demo producer. The pipeline finishes the message it is
//! working on before it stops.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use orderbox_server::cache::OrderCache;
use orderbox_server::config::ServerConfig;
use orderbox_server::db::{self, OrderStore, PgOrderStore};
use orderbox_server::demo::run_demo_producer;
use orderbox_server::ingest::{self, IngestPipeline};
use orderbox_server::routes;
use orderbox_server::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderbox_server=info,orderbox=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p orderbox-cli -- migrate

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool));

    // Nothing is served until the cache reflects storage
    let cache = OrderCache::hydrate_from_storage(config.cache_capacity, store.as_ref())
        .await
        .expect("Failed to hydrate order cache");
    let cache = Arc::new(cache);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let (publisher, stream) = ingest::channel(config.stream_buffer);
    let pipeline = IngestPipeline::new(stream, Arc::clone(&store), Arc::clone(&cache))
        .with_fetch_backoff(config.fetch_backoff);
    let pipeline_task = tokio::spawn(pipeline.run(shutdown.clone()));

    let demo_task = config.demo_interval.map(|interval| {
        tokio::spawn(run_demo_producer(
            publisher.clone(),
            interval,
            shutdown.clone(),
        ))
    });

    let state = AppState::new(store, cache);
    let app = routes::app(state, config.static_dir.as_deref());

    let addr = config.socket_addr();
    tracing::info!("orderbox listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .expect("Server error");

    // The server can also stop on its own; make sure background work follows
    shutdown.cancel();
    drop(publisher);

    if let Some(task) = demo_task {
        match task.await {
            Ok(published) => tracing::info!(published, "Demo producer finished"),
            Err(e) => tracing::error!(error = %e, "Demo producer panicked"),
        }
    }

    match pipeline_task.await {
        Ok(stats) => tracing::info!(?stats, "Ingestion pipeline finished"),
        Err(e) => tracing::error!(error = %e, "Ingestion pipeline panicked"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM), then cancel `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    shutdown.cancel();
}
