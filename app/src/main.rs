mod config;
mod error;
mod logging;
mod models;
mod rest;
mod sensor;
mod store;

use error::StartupError;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

static TERMINATED: AtomicUsize = AtomicUsize::new(0);

#[tokio::main]
pub async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    logging::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = config::Config::from_env()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        core = sensor_core::CORE_VERSION,
        "Starting sensor api"
    );

    let db_conn = models::establish_db_connection(&config).await?;
    models::run_migrations(&db_conn).await?;
    info!("Database migrations applied");

    let pg_store = Arc::new(store::PgStore::new(db_conn.clone()));
    let service = sensor::SensorService::new(pg_store, config.ingest_policy(), config.query_policy());

    let shutdown = register_sigint_handler()?;
    let (_, server_daemon) =
        rest::dispatch_server_daemon(service, config.server_addr(), async move {
            shutdown.notified().await;
        })?;

    server_daemon.await;
    info!("Server stopped, closing database pool");
    db_conn.close().await;
    Ok(())
}

/// First signal drains the server gracefully, the second one kills
fn register_sigint_handler() -> Result<Arc<Notify>, ctrlc::Error> {
    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    ctrlc::set_handler(move || {
        let count = TERMINATED.fetch_add(1, Ordering::Relaxed);
        if count >= 1 {
            warn!("Force killing");
            std::process::exit(1);
        }
        info!("Shutting down, waiting for in-flight requests");
        notify.notify_one();
    })?;
    Ok(shutdown)
}
