//! Command implementations.

pub mod server;
pub mod sum_caller;
pub mod sum_host;
pub mod sum_responder;
pub mod sum_sender;

use c2c_core::Value;
use c2c_protocol::PeerId;

use crate::cli::SumArgs;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};

/// Client name used by the programs that expose a service.
pub const SERVICE_CLIENT_NAME: &str = "sumservice";

/// Client name used by the programs that consume a service.
pub const CALLER_CLIENT_NAME: &str = "sumclient";

async fn connect(client_name: &str, config: &ClientConfig) -> ClientResult<Connection> {
    Connection::connect(client_name, &config.socket_path).await
}

/// Prints the peer id a service was given, for the user to pass on to the
/// matching client program.
async fn print_id(conn: &Connection, client_program: &str) -> ClientResult<()> {
    let id = conn.own_id().await?;
    println!(
        "Connected as id {}.\nPass this id in the command line for {}.",
        id, client_program
    );
    Ok(())
}

fn service_peer(args: &SumArgs) -> ClientResult<PeerId> {
    if args.peer == 0 {
        return Err(ClientError::Usage(
            "service id must be a positive integer".into(),
        ));
    }
    Ok(PeerId(args.peer))
}

/// Renders the reply to a sum request.
///
/// `Ok` lines go to stdout, `Err` lines to stderr.
pub fn format_sum(reply: &Value) -> Result<String, String> {
    match reply {
        Value::Int32(sum) => Ok(format!("Sum is {}", sum)),
        Value::Error(message) => Err(format!("ERROR: {}", message)),
        Value::String(_) | Value::Dict(_) | Value::List(_) => {
            Err("Can't get an integer out of the reply.".to_string())
        }
    }
}

fn print_sum(reply: &Value) {
    match format_sum(reply) {
        Ok(line) => println!("{}", line),
        Err(line) => eprintln!("{}", line),
    }
}
