//! IPC framing and message types for c2c.
//!
//! # Protocol Overview
//!
//! Messages are sent as length-prefixed JSON:
//! - 4 bytes: message length (u32, big-endian)
//! - N bytes: JSON payload
//!
//! Clients send [`Envelope<Request>`](Envelope) frames. The broker answers
//! with [`Envelope<ServerMessage>`](Envelope) frames: either a
//! [`Response`] correlated by the request's `request_id`, or an unsolicited
//! inbound [`C2cMessage`] addressed to the client.
//!
//! A single connection carries any number of requests in flight; a request
//! sent with [`ReplyPolicy::MultiReply`] may receive several responses.
//!
//! # Example
//!
//! ```rust
//! use c2c_protocol::{Envelope, Request, encode_message, decode_message};
//!
//! let request = Envelope::new(1, Request::GetOwnId);
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
//! assert_eq!(decoded, request);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameReader, FrameWriter, decode_message, encode_message};
pub use types::{
    C2cMessage, Envelope, ErrorCode, ErrorResponse, MessageId, PeerId, ReplyPolicy, Request,
    RequestId, Response, ServerMessage,
};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;
