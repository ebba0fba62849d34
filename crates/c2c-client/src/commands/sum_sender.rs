//! Sum sender: one point-to-point message, one reply.

use tracing::debug;

use c2c_core::Value;
use c2c_protocol::ReplyPolicy;

use crate::cli::SumArgs;
use crate::config::ClientConfig;
use crate::error::ClientResult;

use super::{CALLER_CLIENT_NAME, connect, print_sum, service_peer};

/// Builds the operand list sent to a responder.
pub fn operands(op1: i32, op2: i32) -> Value {
    Value::List(vec![Value::Int32(op1), Value::Int32(op2)])
}

/// Sends the operands to the responder and prints the sum it returns.
pub async fn run(config: &ClientConfig, args: SumArgs) -> ClientResult<()> {
    let peer = service_peer(&args)?;
    let conn = connect(CALLER_CLIENT_NAME, config).await?;

    debug!(peer_id = %peer, op1 = args.op1, op2 = args.op2, "Sending operands");
    let reply = conn
        .send(peer, ReplyPolicy::SingleReply, operands(args.op1, args.op2))
        .await?
        .value()
        .await;

    print_sum(&reply);
    Ok(())
}
