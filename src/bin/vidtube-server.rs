use tokio::net::TcpListener;
use tracing::{info, warn};
use vidtube_api::{api, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(err.into());
    }
    tracing_subscriber::fmt::init();

    let container = config::init_container().await?;
    let app = api::router(container.clone());

    let listener = TcpListener::bind(container.read(config::addr_capsule)).await?;
    info!(addr = %listener.local_addr()?, "Started listening on TCP");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => warn!(?err, "Failed to listen for shutdown signal"),
    }
}
