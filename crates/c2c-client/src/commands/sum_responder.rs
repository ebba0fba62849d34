//! Sum responder: answers each point-to-point message with the sum of its
//! two operands.

use tracing::{debug, info, warn};

use c2c_core::Value;
use c2c_protocol::{C2cMessage, ReplyPolicy};
use c2c_server::SignalHandler;

use crate::config::ClientConfig;
use crate::connection::{Connection, Inbox};
use crate::error::ClientResult;

use super::{SERVICE_CLIENT_NAME, connect, print_id};

/// Extracts the two operands of a request and adds them.
pub fn sum_operands(payload: &Value) -> Result<i32, &'static str> {
    if payload.as_list().is_none() {
        return Err("Can't get operands from c2c message!");
    }
    let op1 = payload
        .list_get_int32(0)
        .ok_or("Failed to get first operand.")?;
    let op2 = payload
        .list_get_int32(1)
        .ok_or("Failed to get second operand.")?;
    Ok(op1.wrapping_add(op2))
}

/// Answers one request. Malformed requests are reported and dropped.
pub async fn answer(conn: &Connection, message: C2cMessage) {
    let sum = match sum_operands(&message.payload) {
        Ok(sum) => sum,
        Err(reason) => {
            warn!(message_id = %message.id, sender = %message.sender, reason, "Malformed request");
            eprintln!("{}", reason);
            return;
        }
    };

    debug!(message_id = %message.id, sum, "Replying");
    if let Err(e) = conn
        .reply(message.id, ReplyPolicy::NoReply, Value::Int32(sum))
        .await
    {
        warn!(message_id = %message.id, error = %e, "Reply rejected");
    }
}

/// Answers requests until the inbox closes.
pub async fn serve(conn: &Connection, inbox: &mut Inbox) {
    while let Some(message) = inbox.recv().await {
        answer(conn, message).await;
    }
}

/// Prints the peer id and serves until interrupted.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let conn = connect(SERVICE_CLIENT_NAME, config).await?;
    print_id(&conn, "sum-sender").await?;

    let mut inbox = conn.inbox().await?;
    let signals = SignalHandler::new();
    signals.spawn_listener();

    tokio::select! {
        _ = serve(&conn, &mut inbox) => info!("Broker closed the connection"),
        _ = signals.shutdown().wait() => info!("Shutting down"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_two_operands() {
        let payload = Value::List(vec![Value::Int32(3), Value::Int32(4)]);
        assert_eq!(sum_operands(&payload), Ok(7));
    }

    #[test]
    fn overflow_wraps() {
        let payload = Value::List(vec![Value::Int32(i32::MAX), Value::Int32(1)]);
        assert_eq!(sum_operands(&payload), Ok(i32::MIN));
    }

    #[test]
    fn malformed_payloads() {
        assert_eq!(
            sum_operands(&Value::Int32(3)),
            Err("Can't get operands from c2c message!")
        );
        assert_eq!(
            sum_operands(&Value::List(vec![Value::string("3")])),
            Err("Failed to get first operand.")
        );
        assert_eq!(
            sum_operands(&Value::List(vec![Value::Int32(3)])),
            Err("Failed to get second operand.")
        );
    }
}
