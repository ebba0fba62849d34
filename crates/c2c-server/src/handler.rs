//! Per-connection request dispatch.
//!
//! Each connection opens with a hello frame, gets a peer id, then issues
//! requests until it disconnects. Everything the broker sends to the client
//! goes through a single outbox drained by a writer task, so responses and
//! inbound messages never interleave mid-frame.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{Span, debug, info, warn};

use c2c_protocol::{
    Envelope, FrameWriter, PeerId, ProtocolError, Request, RequestId, Response, ServerMessage,
};

use crate::broker::{Broker, Outbox, SharedBroker};
use crate::error::{ServerError, ServerResult};
use crate::socket::Connection;

/// Dispatches requests from one connection to the broker.
pub struct RequestHandler {
    broker: SharedBroker,
}

impl RequestHandler {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    /// Handles one request from `peer`.
    ///
    /// Responses are queued on the peer's outbox under the broker lock, so a
    /// reply triggered by this request cannot overtake its acknowledgement.
    #[tracing::instrument(skip(self, peer, outbox, request), fields(peer_id = %peer, request_type = request.kind(), duration_ms))]
    pub async fn handle(
        &self,
        peer: PeerId,
        request_id: RequestId,
        request: Request,
        outbox: &Outbox,
    ) {
        let start = std::time::Instant::now();

        let response = match request {
            Request::Hello { .. } => Some(Broker::reject("hello already received")),
            Request::Ping => Some(Response::Pong),
            Request::GetOwnId => Some(Response::PeerId { id: peer }),
            Request::Send {
                destination,
                policy,
                payload,
            } => {
                let mut broker = self.broker.write().await;
                if let Some(response) = broker.send(peer, request_id, destination, policy, payload)
                {
                    broker.respond(peer, request_id, response);
                }
                None
            }
            Request::Reply { to, policy, payload } => {
                let mut broker = self.broker.write().await;
                let response = broker.reply(peer, to, policy, payload);
                broker.respond(peer, request_id, response);
                None
            }
        };

        if let Some(response) = response {
            let _ = outbox.send(Envelope::new(request_id, ServerMessage::Response(response)));
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let duration = start.elapsed();
            Span::current().record("duration_ms", duration.as_millis());
            debug!(duration_ms = duration.as_millis(), "Request handled");
        }
    }

    /// Handles a connection until the client disconnects.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        let hello = conn.read_hello().await?;
        let client_name = match hello.payload {
            Request::Hello { client_name } => client_name,
            other => {
                let message = format!("expected hello, got {}", other.kind());
                conn.respond(hello.request_id, Broker::reject(message.clone()))
                    .await?;
                return Err(ServerError::handshake(message));
            }
        };

        let Some(writer) = conn.take_writer() else {
            return Err(ServerError::handshake("connection writer unavailable"));
        };

        let (outbox, rx) = mpsc::unbounded_channel();
        let peer = self.broker.write().await.register(client_name, outbox.clone());
        let writer_task = tokio::spawn(drain_outbox(peer, writer, rx));

        let _ = outbox.send(Envelope::new(
            hello.request_id,
            ServerMessage::Response(Response::Welcome { peer_id: peer }),
        ));

        let result = loop {
            match conn.read_request().await {
                Ok(Some(envelope)) => {
                    self.handle(peer, envelope.request_id, envelope.payload, &outbox)
                        .await;
                }
                Ok(None) => {
                    debug!(peer_id = %peer, "Client disconnected");
                    break Ok(());
                }
                Err(ServerError::Protocol(ProtocolError::Serialization(e))) => {
                    warn!(peer_id = %peer, error = %e, "Malformed request");
                    let _ = outbox.send(Envelope::new(
                        0,
                        ServerMessage::Response(Broker::reject(format!("malformed request: {}", e))),
                    ));
                }
                Err(e) => break Err(e),
            }
        };

        self.broker.write().await.unregister(peer);
        drop(outbox);
        if let Err(e) = writer_task.await {
            warn!(peer_id = %peer, error = %e, "Writer task failed");
        }

        result
    }
}

async fn drain_outbox<W>(
    peer: PeerId,
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Envelope<ServerMessage>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = writer.write_message(&envelope).await {
            debug!(peer_id = %peer, error = %e, "Failed to write frame");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Creates a connection handler function for use with `SocketServer::run`
/// or `SocketServer::run_until_shutdown`.
pub fn make_connection_handler(
    broker: SharedBroker,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |conn| {
        let handler = RequestHandler::new(broker.clone());
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await {
                info!(error = %e, "Connection closed with error");
            }
        })
    }
}
