//! Sum caller: introspects a sum host, subscribes to its broadcast and calls
//! its method.

use tracing::debug;

use c2c_core::Value;

use crate::cli::SumArgs;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::service::remote;

use super::sum_host::{BROADCAST, METHOD, NAMESPACE};
use super::{CALLER_CLIENT_NAME, connect, print_sum, service_peer};

/// Renders one broadcast emission.
///
/// Returns `None` for an error, after which the subscription is abandoned.
pub fn format_odd_sum(value: &Value) -> Option<String> {
    match value {
        Value::Int32(sum) => Some(format!("Hey, an odd sum just occurred: {}", sum)),
        Value::Error(_) | Value::String(_) | Value::Dict(_) | Value::List(_) => None,
    }
}

pub async fn run(config: &ClientConfig, args: SumArgs) -> ClientResult<()> {
    let peer = service_peer(&args)?;
    let conn = connect(CALLER_CLIENT_NAME, config).await?;

    let description = remote::introspect(&conn, peer, &[NAMESPACE]).await?;
    print!("{}", description.tree());

    let mut odd_sums = remote::subscribe(&conn, peer, &[BROADCAST]).await?;
    let reply = remote::call(
        &conn,
        peer,
        &[NAMESPACE, METHOD],
        vec![Value::Int32(args.op1), Value::Int32(args.op2)],
    )
    .await?
    .value();
    tokio::pin!(reply);

    // Broadcasts triggered by the call are delivered before its reply.
    let mut subscribed = true;
    loop {
        tokio::select! {
            biased;
            emission = odd_sums.next(), if subscribed => match emission.as_ref().and_then(format_odd_sum) {
                Some(line) => println!("{}", line),
                None => {
                    debug!(?emission, "Subscription ended");
                    if emission.is_some() {
                        println!("Hey, an error just occurred!");
                    }
                    subscribed = false;
                }
            },
            value = &mut reply => {
                print_sum(&value);
                break;
            }
        }
    }

    Ok(())
}
