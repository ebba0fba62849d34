//! Client error types.

use std::fmt;

use c2c_protocol::{ErrorResponse, ProtocolError};

use crate::service::RegistryError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Connection to the broker failed.
    Connection(String),
    /// Protocol/framing error.
    Protocol(String),
    /// IO error.
    Io(std::io::Error),
    /// The broker rejected a request.
    Rejected(ErrorResponse),
    /// The connection closed while a request was in flight.
    Disconnected,
    /// The inbound message stream was already taken.
    InboxTaken,
    /// Service registration failed.
    Registry(RegistryError),
    /// The broker could not be started.
    Broker(String),
    /// Invalid command-line input.
    Usage(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "{}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Rejected(err) => write!(f, "{}", err),
            Self::Disconnected => write!(f, "disconnected from broker"),
            Self::InboxTaken => write!(f, "inbound message stream already taken"),
            Self::Registry(err) => write!(f, "{}", err),
            Self::Broker(msg) => write!(f, "broker error: {}", msg),
            Self::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Rejected(err) => Some(err),
            Self::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(err) => Self::Io(err),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<ErrorResponse> for ClientError {
    fn from(err: ErrorResponse) -> Self {
        Self::Rejected(err)
    }
}

impl From<RegistryError> for ClientError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c2c_protocol::ErrorCode;

    #[test]
    fn rejected_display_uses_broker_message() {
        let err = ClientError::from(ErrorResponse::new(ErrorCode::NoSuchPeer, "no client with id 9"));
        assert_eq!(err.to_string(), "No such client: no client with id 9");
    }

    #[test]
    fn protocol_io_errors_stay_io() {
        let err = ClientError::from(ProtocolError::Io(std::io::Error::other("boom")));
        assert!(matches!(err, ClientError::Io(_)));

        let err = ClientError::from(ProtocolError::EmptyMessage);
        assert_eq!(err.to_string(), "protocol error: empty message");
    }
}
