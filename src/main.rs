use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use carevault::api::RestApi;
use carevault::config::{load_config, LoggingConfig};
use carevault::patients::PatientService;
use carevault::storage::StorageEngine;
use carevault::users::UserService;

const CONFIG_ENV: &str = "CAREVAULT_CONFIG";

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = load_config(&config_path)?;
    init_tracing(&config.logging);

    info!(config = %config_path.display(), "starting carevault");

    let storage = Arc::new(StorageEngine::open(&config.storage).await?);
    let patients = Arc::new(PatientService::new(
        Arc::clone(&storage),
        config.classifier.clone(),
    ));
    let users = Arc::new(UserService::new(Arc::clone(&storage), config.users.clone()));
    let api = RestApi::new(patients, users, config.api.max_body_bytes);

    let host: IpAddr = config.api.host.parse()?;
    let addr = SocketAddr::new(host, config.api.port);

    // Create a channel for shutdown signal
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let (bound, server) =
        warp::serve(api.routes()).try_bind_with_graceful_shutdown(addr, async move {
            shutdown_rx.await.ok();
            info!("shutting down server");
        })?;
    info!(%bound, "listening");

    let server_handle = tokio::spawn(server);

    signal::ctrl_c().await?;
    info!("ctrl+c received, starting graceful shutdown");
    shutdown_tx.send(()).ok();

    join_server(server_handle).await?;
    info!("server shutdown complete");
    Ok(())
}

async fn join_server(handle: JoinHandle<()>) -> Result<(), Box<dyn Error>> {
    if let Err(e) = handle.await {
        error!(error = %e, "server task failed");
        return Err(e.into());
    }
    Ok(())
}
