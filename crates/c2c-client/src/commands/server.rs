//! Server command: runs the broker in the foreground.
//!
//! Listens on the socket until SIGTERM/SIGINT, then removes the socket file
//! and exits.

use std::path::PathBuf;

use tracing::info;

use c2c_server::{
    ServerConfig, SignalHandler, SocketServer, make_connection_handler, new_shared_broker,
};

use crate::error::{ClientError, ClientResult};

/// Starts the broker and blocks until a shutdown signal arrives.
pub async fn run(socket_path: PathBuf) -> ClientResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let server = SocketServer::new(ServerConfig::new(&socket_path))
        .await
        .map_err(|e| ClientError::Broker(format!("failed to start: {}", e)))?;

    let broker = new_shared_broker();
    server
        .run_until_shutdown(make_connection_handler(broker.clone()), signal_handler.shutdown().wait())
        .await
        .map_err(|e| ClientError::Broker(e.to_string()))?;

    let peers = broker.read().await.peer_count();
    info!(connected_peers = peers, "Broker stopped");
    Ok(())
}
