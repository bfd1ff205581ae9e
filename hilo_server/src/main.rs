use std::sync::Arc;

use clap::Parser;
use hilo::backends::{migrations, LibsqlCounterStore, LibsqlUserRepository, UserRowAdapter};
use hilo::{HiLoAllocator, UserService};
use hilo_server::config::{CliArgs, ServerConfig};
use hilo_server::telemetry::init_tracing;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_tracing()?;

    // Database::open is deprecated upstream; keep a narrow allow here until Builder migration
    #[allow(deprecated)]
    let db = Arc::new(libsql::Database::open(config.database_url.as_str())?);
    migrations::apply(&db).await?;

    let repo = LibsqlUserRepository::new(Arc::clone(&db), UserRowAdapter);
    let allocator = HiLoAllocator::new(LibsqlCounterStore::new(db), config.allocator.clone())?;
    let service = UserService::new(repo, Arc::new(allocator)).with_block(config.block_name.clone());

    let app = hilo_server::router(Arc::new(service));
    let listener = TcpListener::bind(config.listen_addr).await?;
    log_startup_info(&config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting user service on {} with full config: {:#?}",
            config.listen_addr,
            config
        );
    } else {
        tracing::info!(
            addr = %config.listen_addr,
            block = %config.block_name,
            max_low = config.allocator.max_low,
            "Starting user service"
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
    tracing::info!("Shutdown signal received, terminating gracefully...");
}
