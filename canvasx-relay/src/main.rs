//! CanvasX relay - the collaboration hub process.
//!
//! Serves the WebSocket relay and the HTTP suggestion endpoint side by side
//! until Ctrl-C. Configuration comes from the environment (see [`config`]),
//! verbosity from `RUST_LOG`.

mod config;

use std::future::IntoFuture;
use std::sync::Arc;

use canvasx_collab::RelayServer;
use canvasx_suggest::suggester_from_config;
use log::info;
use tokio::net::TcpListener;

use config::RelayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::from_env()?;
    env_logger::init();

    let server = RelayServer::new(config.server_config());
    let ws_listener = TcpListener::bind(config.ws_addr).await?;
    info!("Relay listening on ws://{}", ws_listener.local_addr()?);

    let suggester = suggester_from_config(config.suggest.clone())?;
    if config.suggest.is_none() {
        info!("GEMINI_API_KEY not set, suggestions will be empty");
    }
    let app = canvasx_suggest::router(Arc::new(suggester));
    let http_listener = TcpListener::bind(config.http_addr).await?;
    info!(
        "Suggestions available at http://{}{}",
        http_listener.local_addr()?,
        canvasx_suggest::routes::SUGGESTIONS_PATH
    );

    tokio::select! {
        () = server.serve(ws_listener) => {}
        result = axum::serve(http_listener, app).into_future() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    let stats = server.stats();
    info!(
        "Served {} connection(s), {} message(s)",
        stats.total_connections, stats.total_messages
    );
    Ok(())
}
