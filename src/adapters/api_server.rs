use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::error::Result;

/// Serve the read API until `shutdown` flips to true
pub async fn start_api_server(
    state: AppState,
    host: &str,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = create_router(state);

    let listener = TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "read API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("read API stopped");
    Ok(())
}
