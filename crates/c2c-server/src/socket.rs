//! Unix socket listener for the broker.
//!
//! This module provides an async Unix socket server that accepts client
//! connections and hands each one to a connection handler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use c2c_protocol::{
    Envelope, FrameReader, FrameWriter, PROTOCOL_VERSION, ProtocolError, Request, RequestId,
    Response, ServerMessage,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Unix socket server for handling client connections.
pub struct SocketServer {
    config: ServerConfig,
    listener: UnixListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Creates a new socket server with the given configuration.
    ///
    /// This will bind to the socket path specified in the configuration.
    /// If `cleanup_stale_socket` is true, an existing socket file nobody
    /// listens on is removed before binding.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if config.cleanup_stale_socket && socket_path.exists() {
            match tokio::net::UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(ServerError::socket_in_use(
                        socket_path.to_string_lossy().to_string(),
                    ));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "Removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        } else if socket_path.exists() {
            return Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            ));
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Broker listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accepts a single connection.
    ///
    /// Waits for a free connection slot first.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ServerError::Io(std::io::Error::other(e)))?;

        let (stream, _addr) = self.listener.accept().await?;
        debug!("Accepted new connection");

        let (read_half, write_half) = stream.into_split();
        Ok(Connection {
            reader: FrameReader::new(read_half),
            writer: Some(FrameWriter::new(write_half)),
            hello_timeout: self.config.hello_timeout,
            _permit: permit,
        })
    }

    /// Runs the accept loop, spawning the handler for each connection.
    ///
    /// Runs until the task is dropped.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(path = %self.config.socket_path.display(), "Removed socket file");
            }
        }
    }
}

/// An accepted client connection.
///
/// Requests are read from the connection itself. The write half can be
/// taken out once, so that a separate task drains the client's outbox.
pub struct Connection {
    reader: FrameReader<OwnedReadHalf>,
    writer: Option<FrameWriter<OwnedWriteHalf>>,
    hello_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Reads the first request, which must arrive within the hello timeout.
    pub async fn read_hello(&mut self) -> ServerResult<Envelope<Request>> {
        match tokio::time::timeout(self.hello_timeout, self.read_request()).await {
            Ok(Ok(Some(envelope))) => Ok(envelope),
            Ok(Ok(None)) => Err(ServerError::handshake("connection closed before hello")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ServerError::Protocol(ProtocolError::timeout("read hello"))),
        }
    }

    /// Reads a request envelope from the connection.
    ///
    /// Returns `Ok(None)` if the connection was closed cleanly.
    pub async fn read_request(&mut self) -> ServerResult<Option<Envelope<Request>>> {
        let Some(envelope) = self.reader.read_message::<Envelope<Request>>().await? else {
            return Ok(None);
        };

        if !envelope.is_compatible() {
            warn!(
                version = %envelope.protocol_version,
                expected = %PROTOCOL_VERSION,
                "Incompatible protocol version"
            );
        }

        Ok(Some(envelope))
    }

    /// Writes a response directly, bypassing any outbox.
    ///
    /// Fails once the writer has been taken.
    pub async fn respond(&mut self, request_id: RequestId, response: Response) -> ServerResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection writer already taken",
            ))
        })?;
        writer
            .write_message(&Envelope::new(request_id, ServerMessage::Response(response)))
            .await?;
        Ok(())
    }

    /// Takes the write half out of the connection.
    pub fn take_writer(&mut self) -> Option<FrameWriter<OwnedWriteHalf>> {
        self.writer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn socket_server_creates_socket_file() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");

        let server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();

        assert!(socket_path.exists());
        assert_eq!(server.socket_path(), socket_path.as_path());
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn socket_server_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(false);
        let _server = SocketServer::new(config.clone()).await.unwrap();

        let result = SocketServer::new(config).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn socket_server_rejects_live_socket_even_with_cleanup() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");

        let _server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();

        let result = SocketServer::new(ServerConfig::new(&socket_path)).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn socket_server_cleans_stale_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();
        assert!(socket_path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn socket_server_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("missing").join("c2c.sock");

        let result = SocketServer::new(ServerConfig::new(&socket_path)).await;
        assert!(matches!(result, Err(ServerError::SocketPathInvalid { .. })));
    }

    #[tokio::test]
    async fn connection_roundtrip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();

        let client_path = socket_path.clone();
        let client_task = tokio::spawn(async move {
            let stream = UnixStream::connect(&client_path).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut writer = FrameWriter::new(write_half);
            let mut reader = FrameReader::new(read_half);

            writer
                .write_message(&Envelope::new(1, Request::hello("test")))
                .await
                .unwrap();
            writer
                .write_message(&Envelope::new(2, Request::Ping))
                .await
                .unwrap();

            let frame: Envelope<ServerMessage> = reader.read_message().await.unwrap().unwrap();
            assert_eq!(frame.request_id, 2);
            assert_eq!(frame.payload, ServerMessage::Response(Response::Pong));
        });

        let mut conn = server.accept().await.unwrap();
        let hello = conn.read_hello().await.unwrap();
        assert_eq!(hello.payload, Request::hello("test"));

        let request = conn.read_request().await.unwrap().unwrap();
        assert_eq!(request.payload, Request::Ping);
        conn.respond(request.request_id, Response::Pong)
            .await
            .unwrap();

        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn hello_times_out() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");
        let config = ServerConfig::new(&socket_path).with_hello_timeout(Duration::from_millis(50));
        let server = SocketServer::new(config).await.unwrap();

        let _stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut conn = server.accept().await.unwrap();

        let result = conn.read_hello().await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn connection_handles_client_disconnect() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut conn = server.accept().await.unwrap();
        drop(stream);

        assert!(conn.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn respond_fails_after_writer_taken() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("c2c.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path))
            .await
            .unwrap();

        let _stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut conn = server.accept().await.unwrap();

        assert!(conn.take_writer().is_some());
        assert!(conn.take_writer().is_none());
        assert!(conn.respond(1, Response::Pong).await.is_err());
    }
}
