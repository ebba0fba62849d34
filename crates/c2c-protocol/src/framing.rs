//! Length-prefixed message framing.
//!
//! Messages are framed with a 4-byte big-endian length prefix followed by
//! the JSON payload:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Encodes a message to bytes with length prefix.
///
/// ```rust
/// use c2c_protocol::{encode_message, Envelope, Request};
///
/// let bytes = encode_message(&Envelope::new(1, Request::Ping)).unwrap();
/// assert!(bytes.len() > 4);
/// ```
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = json.len() as u32;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes one complete framed message (length prefix + payload).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let [a, b, c, d, rest @ ..] = data else {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4,
            received: data.len(),
        });
    };

    let len = check_length(u32::from_be_bytes([*a, *b, *c, *d]))?;

    if rest.len() < len {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4 + len,
            received: data.len(),
        });
    }

    Ok(serde_json::from_slice(&rest[..len])?)
}

fn check_length(len: u32) -> ProtocolResult<usize> {
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    Ok(len as usize)
}

/// Reads framed messages from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a single framed message.
    ///
    /// Returns `Ok(None)` if the stream ends before a length prefix.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> ProtocolResult<Option<T>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = check_length(u32::from_be_bytes(len_buf))?;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;

        Ok(Some(serde_json::from_slice(&payload)?))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes and flushes a single framed message.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> ProtocolResult<()> {
        let data = encode_message(message)?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts down the write half.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, PeerId, Request, Response, ServerMessage};
    use c2c_core::Value;
    use std::io::Cursor;

    #[test]
    fn encode_writes_length_prefix() {
        let envelope = Envelope::new(7, Request::Ping);
        let bytes = encode_message(&envelope).unwrap();

        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn decode_incomplete_length() {
        let result: ProtocolResult<Envelope<Request>> = decode_message(&[0, 0]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { expected: 4, .. })
        ));
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut data = vec![0, 0, 0, 100];
        data.extend_from_slice(&[0u8; 10]);

        let result: ProtocolResult<Envelope<Request>> = decode_message(&data);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { expected: 104, .. })
        ));
    }

    #[test]
    fn message_too_large() {
        let data = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let result: ProtocolResult<Envelope<Request>> = decode_message(&data);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    #[tokio::test]
    async fn reader_empty_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let result: Option<Envelope<Request>> = reader.read_message().await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn reader_rejects_empty_frame() {
        let mut reader = FrameReader::new(Cursor::new(0u32.to_be_bytes().to_vec()));
        let result: ProtocolResult<Option<Envelope<Request>>> = reader.read_message().await;
        assert!(matches!(result, Err(ProtocolError::EmptyMessage)));
    }

    #[tokio::test]
    async fn reader_truncated_payload_is_an_error() {
        let mut bytes = encode_message(&Envelope::new(1, Request::GetOwnId)).unwrap();
        bytes.truncate(bytes.len() - 2);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let result: ProtocolResult<Option<Envelope<Request>>> = reader.read_message().await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }

    #[tokio::test]
    async fn writer_then_reader_preserves_order() {
        let messages = vec![
            Envelope::new(1, ServerMessage::Response(Response::PeerId { id: PeerId(3) })),
            Envelope::new(2, ServerMessage::Response(Response::Pong)),
            Envelope::new(
                3,
                ServerMessage::Response(Response::error(
                    crate::ErrorCode::NoSuchPeer,
                    "no client with id 9",
                )),
            ),
        ];

        let mut writer = FrameWriter::new(Vec::new());
        for message in &messages {
            writer.write_message(message).await.unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        for expected in &messages {
            let actual: Envelope<ServerMessage> = reader.read_message().await.unwrap().unwrap();
            assert_eq!(&actual, expected);
        }

        let eof: Option<Envelope<ServerMessage>> = reader.read_message().await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn payload_values_survive_framing() {
        let request = Envelope::new(
            4,
            Request::Send {
                destination: PeerId(42),
                policy: crate::ReplyPolicy::SingleReply,
                payload: Value::List(vec![Value::Int32(3), Value::Int32(4)]),
            },
        );

        let mut writer = FrameWriter::new(Vec::new());
        writer.write_message(&request).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        let decoded: Envelope<Request> = reader.read_message().await.unwrap().unwrap();
        assert_eq!(decoded, request);
    }
}
