//! todod — the todo daemon.
//!
//! Single binary that assembles the todo service:
//! - Todo store (embedded redb or Postgres)
//! - Metrics registry + application catalogue
//! - Runtime metrics collector
//! - REST API + `/metrics`
//!
//! # Usage
//!
//! ```text
//! todod serve --port 3000 --store embedded --data-dir /var/lib/todod
//! todod serve --store postgres
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};

use todo_metrics::{AppMetrics, DEFAULT_PREFIX, Registry, RuntimeCollector};
use todo_service::TodoService;
use todo_state::{EmbeddedStore, PgStore, TodoRepository};

use crate::config::DatabaseConfig;

#[derive(Parser)]
#[command(name = "todod", about = "Todo daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the todo REST API and metrics endpoint.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "3000")]
        port: u16,

        /// Storage backend.
        #[arg(long, value_enum, default_value = "embedded")]
        store: StoreKind,

        /// Data directory for the embedded store.
        #[arg(long, default_value = "/var/lib/todod")]
        data_dir: PathBuf,

        /// Runtime metrics sampling interval in seconds.
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        runtime_metrics_interval: u64,

        /// Maximum Postgres pool size.
        #[arg(long, default_value = "10")]
        max_connections: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Embedded,
    Postgres,
}

struct ServeOptions {
    port: u16,
    runtime_metrics_interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Deployments inject DATABASE_* directly; .env is for local runs.
    if std::env::var_os("DATABASE_HOST").is_none() {
        dotenv::dotenv().ok();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,todod=debug,todo=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            store,
            data_dir,
            runtime_metrics_interval,
            max_connections,
        } => {
            let options = ServeOptions {
                port,
                runtime_metrics_interval: Duration::from_secs(runtime_metrics_interval),
            };
            match store {
                StoreKind::Embedded => {
                    std::fs::create_dir_all(&data_dir)?;
                    let db_path = data_dir.join("todos.redb");
                    let repo = EmbeddedStore::open(&db_path)
                        .with_context(|| format!("opening {}", db_path.display()))?;
                    info!(path = ?db_path, "embedded store opened");
                    serve(repo, options).await
                }
                StoreKind::Postgres => {
                    let config = DatabaseConfig::from_env()?;
                    info!(?config, "database config");
                    let repo = PgStore::connect_with(config.connect_options(), max_connections)
                        .await
                        .context("connecting to postgres")?;
                    if config.schema_sync() {
                        repo.ensure_schema().await?;
                    }
                    serve(repo, options).await
                }
            }
        }
    }
}

async fn serve<R: TodoRepository>(repo: R, options: ServeOptions) -> anyhow::Result<()> {
    info!("todo daemon starting");

    // ── Metrics ────────────────────────────────────────────────

    let registry = Registry::new();
    let metrics = Arc::new(AppMetrics::new(&registry)?);
    let service = Arc::new(TodoService::new(repo, Arc::clone(&metrics)));
    service.sync_metrics().await?;

    let pool_service = Arc::clone(&service);
    let collector = RuntimeCollector::new(&registry, DEFAULT_PREFIX, options.runtime_metrics_interval)?
        .with_hook(Arc::new(move || pool_service.publish_pool_usage()));
    info!(
        interval = options.runtime_metrics_interval.as_secs(),
        "runtime collector initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let collector_handle = tokio::spawn(collector.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = todo_api::build_router(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    if let Err(e) = collector_handle.await {
        if e.is_panic() {
            metrics.record_unhandled_exception("panic");
        }
        error!(error = %e, "runtime collector task failed");
    }

    info!("todo daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_runtime_metrics_interval_is_rejected() {
        let result = Cli::try_parse_from(["todod", "serve", "--runtime-metrics-interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["todod", "serve"]).unwrap();
        let Command::Serve {
            port,
            store,
            runtime_metrics_interval,
            max_connections,
            ..
        } = cli.command;
        assert_eq!(port, 3000);
        assert!(matches!(store, StoreKind::Embedded));
        assert_eq!(runtime_metrics_interval, 10);
        assert_eq!(max_connections, 10);
    }
}
