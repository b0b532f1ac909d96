use crate::config::Config;
use crate::state::{AppState, Sources};
use crate::utils::fmt_duration;
use crate::web::create_router;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::MemoryCache;

/// Expired cache entries are also dropped on read; this bounds memory held by
/// keys that are never read again.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Connect the backing store (Postgres when `DATABASE_URL` is set, memory
    /// otherwise) and build the services on top of it.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let sources = match config.database_url.as_deref() {
            Some(url) => Sources::postgres(Self::connect(url).await?),
            None => {
                warn!("DATABASE_URL not set, using the in-memory backend");
                Sources::memory()
            }
        };

        let ttl = config.cache_ttl();
        info!(
            search_ttl = fmt_duration(ttl.search),
            entity_ttl = fmt_duration(ttl.entity),
            list_ttl = fmt_duration(ttl.list),
            "cache configured"
        );

        let cache = MemoryCache::new();
        spawn_cache_purge(cache.clone(), CACHE_PURGE_INTERVAL);
        let app_state = AppState::new(sources, Arc::new(cache), ttl, config.page_limits());

        Ok(App { config, app_state })
    }

    async fn connect(url: &str) -> Result<sqlx::PgPool, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        let connect_options = PgConnectOptions::from_str(url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 8,
            acquire_timeout = "4s",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(db_pool)
    }

    /// Serve until SIGINT/SIGTERM, then give in-flight requests
    /// `shutdown_timeout` to finish.
    pub async fn run(self) -> ExitCode {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "Failed to bind TCP listener");
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");

        let router = create_router(self.app_state);
        let grace = self.config.shutdown_timeout();
        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();

        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .into_future();
        tokio::pin!(server);

        let result = tokio::select! {
            result = &mut server => result,
            _ = async {
                // A dropped sender means the server already stopped on its own.
                if signalled_rx.await.is_ok() {
                    tokio::time::sleep(grace).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!(timeout = fmt_duration(grace), "graceful shutdown timed out");
                return ExitCode::FAILURE;
            }
        };

        match result {
            Ok(()) => {
                info!("Server shutdown complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Server terminated unexpectedly");
                ExitCode::FAILURE
            }
        }
    }
}

fn spawn_cache_purge(cache: MemoryCache, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "purged expired cache entries");
            }
        }
    });
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, starting graceful shutdown"),
        _ = terminate => info!("SIGTERM received, starting graceful shutdown"),
    }
}
