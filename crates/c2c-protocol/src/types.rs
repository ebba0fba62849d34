//! Request, response and message types for the c2c protocol.

use std::fmt;

use c2c_core::Value;
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Per-connection request cookie chosen by the client.
pub type RequestId = u32;

/// Identity the broker assigns to each connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity the broker assigns to each routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many replies the broker forwards for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolicy {
    /// Replies are rejected.
    NoReply,
    /// Exactly one reply is forwarded; later ones are rejected.
    SingleReply,
    /// Replies are forwarded until the sender disconnects.
    MultiReply,
}

impl ReplyPolicy {
    /// Returns true if the recipient may reply at all.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::NoReply)
    }
}

/// A client-to-client message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct C2cMessage {
    /// Broker-assigned id; pass it to a reply to answer this message.
    pub id: MessageId,
    pub sender: PeerId,
    pub destination: PeerId,
    pub policy: ReplyPolicy,
    /// Set when this message is itself a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MessageId>,
    pub payload: Value,
}

/// Message envelope wrapping all protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version (always "1" for v1).
    pub protocol_version: String,
    /// Request cookie for correlation.
    pub request_id: RequestId,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the current protocol version.
    pub fn new(request_id: RequestId, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id,
            payload,
        }
    }

    /// Checks if this envelope uses a compatible protocol version.
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Requests a client sends to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// First frame on every connection.
    Hello { client_name: String },

    /// Liveness check.
    Ping,

    /// Ask for the peer id assigned to this connection.
    GetOwnId,

    /// Send a point-to-point message to another client.
    Send {
        destination: PeerId,
        policy: ReplyPolicy,
        payload: Value,
    },

    /// Answer a message previously received.
    Reply {
        to: MessageId,
        policy: ReplyPolicy,
        payload: Value,
    },
}

impl Request {
    pub fn hello(client_name: impl Into<String>) -> Self {
        Self::Hello {
            client_name: client_name.into(),
        }
    }

    pub fn send(destination: PeerId, policy: ReplyPolicy, payload: Value) -> Self {
        Self::Send {
            destination,
            policy,
            payload,
        }
    }

    pub fn reply(to: MessageId, policy: ReplyPolicy, payload: Value) -> Self {
        Self::Reply {
            to,
            policy,
            payload,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Ping => "ping",
            Self::GetOwnId => "get_own_id",
            Self::Send { .. } => "send",
            Self::Reply { .. } => "reply",
        }
    }
}

/// Responses correlated with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Handshake accepted.
    Welcome { peer_id: PeerId },

    /// Pong response to Ping.
    Pong,

    /// Answer to GetOwnId.
    PeerId { id: PeerId },

    /// A message with policy `no_reply` or a reply was accepted for delivery.
    Sent { message_id: MessageId },

    /// A reply to a message sent with `single_reply` or `multi_reply`.
    Message { message: C2cMessage },

    /// The request was rejected.
    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    pub fn from_error(error: ErrorResponse) -> Self {
        Self::Error { error }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Frames the broker sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to the request carrying the envelope's `request_id`.
    Response(Response),
    /// An unsolicited message addressed to this client.
    Inbound(C2cMessage),
}

/// Error codes for broker rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    /// No connected client has the destination id.
    NoSuchPeer,
    /// The other end went away before answering.
    PeerDisconnected,
    /// The message's reply policy does not allow (another) reply.
    ReplyNotAllowed,
    /// The replied-to message is unknown or no longer pending.
    UnknownMessage,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::InternalError => "An internal error occurred",
            Self::InvalidRequest => "The request was invalid",
            Self::NoSuchPeer => "No such client",
            Self::PeerDisconnected => "Client disconnected",
            Self::ReplyNotAllowed => "Reply not allowed",
            Self::UnknownMessage => "Unknown message",
        }
    }
}

/// Error response details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for ErrorResponse {}
