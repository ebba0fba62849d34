//! Connection to the c2c broker.
//!
//! A [`Connection`] owns two background tasks: a writer draining outgoing
//! requests, and a reader dispatching broker frames. Responses resolve the
//! result slot registered under their request id; inbound messages go to
//! the connection's [`Inbox`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use c2c_core::Value;
use c2c_protocol::{
    C2cMessage, Envelope, FrameReader, FrameWriter, MessageId, PeerId, ReplyPolicy, Request,
    RequestId, Response, ServerMessage,
};

use crate::error::{ClientError, ClientResult};

/// Where the reader delivers responses for one request.
enum Slot {
    /// Resolved by the first response.
    Once(oneshot::Sender<Response>),
    /// Receives every response until an error or disconnect.
    Many(mpsc::UnboundedSender<Response>),
}

type Slots = Arc<Mutex<HashMap<RequestId, Slot>>>;

struct Inner {
    requests: mpsc::UnboundedSender<Envelope<Request>>,
    slots: Slots,
    next_request: AtomicU32,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<C2cMessage>>>,
}

/// A connection to the broker.
///
/// Cheap to clone; all clones share the same underlying socket. The socket
/// closes when the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Connects to the broker at `path` and performs the hello handshake.
    pub async fn connect(client_name: &str, path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        debug!(socket = %path.display(), client = client_name, "Connecting to broker");

        let stream = UnixStream::connect(path).await.map_err(|e| {
            ClientError::Connection(format!("failed to connect to {}: {}", path.display(), e))
        })?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        writer
            .write_message(&Envelope::new(0, Request::hello(client_name)))
            .await?;
        let welcome: Option<Envelope<ServerMessage>> = reader.read_message().await?;
        let peer_id = match welcome.map(|envelope| envelope.payload) {
            Some(ServerMessage::Response(Response::Welcome { peer_id })) => peer_id,
            Some(ServerMessage::Response(Response::Error { error })) => {
                return Err(ClientError::Connection(error.to_string()));
            }
            Some(other) => {
                return Err(ClientError::Protocol(format!(
                    "expected welcome, got {:?}",
                    other
                )));
            }
            None => {
                return Err(ClientError::Connection(
                    "broker closed the connection during handshake".into(),
                ));
            }
        };
        debug!(peer_id = %peer_id, "Connected to broker");

        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let slots: Slots = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(write_requests(writer, requests_rx));
        tokio::spawn(read_frames(reader, slots.clone(), inbox_tx));

        Ok(Self {
            inner: Arc::new(Inner {
                requests,
                slots,
                next_request: AtomicU32::new(1),
                inbox: Mutex::new(Some(inbox_rx)),
            }),
        })
    }

    /// Asks the broker for this connection's peer id.
    pub async fn own_id(&self) -> ClientResult<PeerId> {
        match self.request(Request::GetOwnId).await? {
            Response::PeerId { id } => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Checks that the broker answers.
    pub async fn ping(&self) -> ClientResult<()> {
        match self.request(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Sends a point-to-point message.
    ///
    /// With `single_reply` the returned [`PendingReply`] resolves with the
    /// reply; with `no_reply` it resolves with the broker's acknowledgement.
    /// Use [`Connection::send_multi`] to receive every reply of a
    /// `multi_reply` message.
    pub async fn send(
        &self,
        destination: PeerId,
        policy: ReplyPolicy,
        payload: Value,
    ) -> ClientResult<PendingReply> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::send(destination, policy, payload), Slot::Once(tx))
            .await?;
        Ok(PendingReply { rx })
    }

    /// Sends a `multi_reply` message and returns the stream of its replies.
    pub async fn send_multi(
        &self,
        destination: PeerId,
        payload: Value,
    ) -> ClientResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.submit(
            Request::send(destination, ReplyPolicy::MultiReply, payload),
            Slot::Many(tx),
        )
        .await?;
        Ok(Subscription { rx })
    }

    /// Replies to a received message and returns the reply's message id.
    pub async fn reply(
        &self,
        to: MessageId,
        policy: ReplyPolicy,
        payload: Value,
    ) -> ClientResult<MessageId> {
        match self.request(Request::reply(to, policy, payload)).await? {
            Response::Sent { message_id } => Ok(message_id),
            Response::Error { error } => Err(ClientError::Rejected(error)),
            other => Err(unexpected(other)),
        }
    }

    /// Takes the stream of inbound messages.
    ///
    /// Only one inbox exists per connection.
    pub async fn inbox(&self) -> ClientResult<Inbox> {
        self.inner
            .inbox
            .lock()
            .await
            .take()
            .map(|rx| Inbox { rx })
            .ok_or(ClientError::InboxTaken)
    }

    async fn request(&self, request: Request) -> ClientResult<Response> {
        let (tx, rx) = oneshot::channel();
        self.submit(request, Slot::Once(tx)).await?;
        rx.await.map_err(|_| ClientError::Disconnected)
    }

    async fn submit(&self, request: Request, slot: Slot) -> ClientResult<RequestId> {
        let request_id = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        debug!(request_id, request_type = request.kind(), "Submitting request");

        // The slot must exist before the response can possibly arrive.
        self.inner.slots.lock().await.insert(request_id, slot);
        if self
            .inner
            .requests
            .send(Envelope::new(request_id, request))
            .is_err()
        {
            self.inner.slots.lock().await.remove(&request_id);
            return Err(ClientError::Disconnected);
        }
        Ok(request_id)
    }
}

fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error { error } => ClientError::Rejected(error),
        other => ClientError::Protocol(format!("unexpected response {:?}", other)),
    }
}

async fn write_requests(
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut rx: mpsc::UnboundedReceiver<Envelope<Request>>,
) {
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = writer.write_message(&envelope).await {
            warn!(error = %e, "Failed to send request");
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Writer stopped");
}

async fn read_frames(
    mut reader: FrameReader<OwnedReadHalf>,
    slots: Slots,
    inbox: mpsc::UnboundedSender<C2cMessage>,
) {
    loop {
        let envelope: Envelope<ServerMessage> = match reader.read_message().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!("Broker closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from broker");
                break;
            }
        };

        match envelope.payload {
            ServerMessage::Inbound(message) => {
                debug!(message_id = %message.id, sender = %message.sender, "Inbound message");
                let _ = inbox.send(message);
            }
            ServerMessage::Response(response) => {
                dispatch(&slots, envelope.request_id, response).await;
            }
        }
    }

    // Dropping the senders fails every pending request.
    slots.lock().await.clear();
}

async fn dispatch(slots: &Slots, request_id: RequestId, response: Response) {
    let mut slots = slots.lock().await;
    match slots.remove(&request_id) {
        Some(Slot::Once(tx)) => {
            let _ = tx.send(response);
        }
        Some(Slot::Many(tx)) => {
            let done = !response.is_success();
            if tx.send(response).is_ok() && !done {
                slots.insert(request_id, Slot::Many(tx));
            }
        }
        None => match response.as_error() {
            Some(error) => warn!(request_id, error = %error, "Broker rejected a request"),
            None => debug!(request_id, "Dropping response with no waiting request"),
        },
    }
}

/// Converts a reply response into its payload.
///
/// Broker errors become `Value::Error`, so callers handle a single type.
fn response_value(response: Response) -> Value {
    match response {
        Response::Message { message } => message.payload,
        Response::Error { error } => Value::error(error.to_string()),
        other => Value::error(format!("unexpected response {:?}", other)),
    }
}

/// The outcome of a sent message.
pub struct PendingReply {
    rx: oneshot::Receiver<Response>,
}

impl PendingReply {
    /// Waits for the raw broker response.
    pub async fn response(self) -> ClientResult<Response> {
        self.rx.await.map_err(|_| ClientError::Disconnected)
    }

    /// Waits for the reply message.
    pub async fn message(self) -> ClientResult<C2cMessage> {
        match self.response().await? {
            Response::Message { message } => Ok(message),
            other => Err(unexpected(other)),
        }
    }

    /// Waits for the reply payload, with every failure folded into
    /// `Value::Error`.
    pub async fn value(self) -> Value {
        match self.response().await {
            Ok(response) => response_value(response),
            Err(e) => Value::error(e.to_string()),
        }
    }
}

/// Replies to a `multi_reply` message, in arrival order.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Response>,
}

impl Subscription {
    /// Waits for the next reply payload.
    ///
    /// Returns `None` once no more replies can arrive. A broker rejection is
    /// yielded once as `Value::Error` and ends the stream.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await.map(response_value)
    }
}

/// Inbound point-to-point messages addressed to this client.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<C2cMessage>,
}

impl Inbox {
    /// Waits for the next message. Returns `None` when the connection closes.
    pub async fn recv(&mut self) -> Option<C2cMessage> {
        self.rx.recv().await
    }
}
