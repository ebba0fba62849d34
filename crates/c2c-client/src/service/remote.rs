//! Calling into a remote service host.

use c2c_core::Value;
use c2c_protocol::{PeerId, ReplyPolicy};

use crate::connection::{Connection, PendingReply, Subscription};
use crate::error::ClientResult;

use super::{ScCommand, ScRequest};

/// Fetches the description tree of the entry at `path` on `peer`.
///
/// Failures, including unknown paths, come back as `Value::Error`.
pub async fn introspect(conn: &Connection, peer: PeerId, path: &[&str]) -> ClientResult<Value> {
    let request = ScRequest::new(ScCommand::Introspect, path.iter().copied());
    let pending = conn
        .send(peer, ReplyPolicy::SingleReply, request.to_value())
        .await?;
    Ok(pending.value().await)
}

/// Subscribes to the broadcast at `path` on `peer`.
///
/// Each emission arrives as one item of the returned subscription.
pub async fn subscribe(conn: &Connection, peer: PeerId, path: &[&str]) -> ClientResult<Subscription> {
    let request = ScRequest::new(ScCommand::Subscribe, path.iter().copied());
    conn.send_multi(peer, request.to_value()).await
}

/// Calls the method at `path` on `peer` with positional `args`.
pub async fn call(
    conn: &Connection,
    peer: PeerId,
    path: &[&str],
    args: Vec<Value>,
) -> ClientResult<PendingReply> {
    let request = ScRequest::new(ScCommand::Call, path.iter().copied()).with_args(args);
    conn.send(peer, ReplyPolicy::SingleReply, request.to_value())
        .await
}
