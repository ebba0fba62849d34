//! Sum host: the `Arithmetic` namespace and the `odd sum` broadcast.

use tracing::info;

use c2c_core::{Value, ValueType};
use c2c_server::SignalHandler;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::service::{ArgSpec, MethodContext, NamespaceHandle, Registry, RegistryError, ServiceHost};

use super::{SERVICE_CLIENT_NAME, connect, print_id};

pub const NAMESPACE: &str = "Arithmetic";
pub const METHOD: &str = "sum";
pub const BROADCAST: &str = "odd sum";

fn sum(args: &[Value], ctx: &mut MethodContext) -> Value {
    let op1 = args.first().and_then(Value::as_int32).unwrap_or_default();
    let op2 = args.get(1).and_then(Value::as_int32).unwrap_or_default();
    let sum = op1.wrapping_add(op2);

    if sum % 2 != 0 {
        ctx.emit([BROADCAST], Value::Int32(sum));
    }
    Value::Int32(sum)
}

/// Builds the registry served by the host.
pub fn arithmetic_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    let root = NamespaceHandle::root();

    let arithmetic = registry.add_namespace(&root, NAMESPACE, "A namespace for arithmetic methods.")?;
    registry.add_constant(&arithmetic, "pi", Value::Int32(3))?;
    registry.add_method(
        &arithmetic,
        METHOD,
        "sum(op1, op2) -> op1 + op2",
        vec![
            ArgSpec::new("op1", "the first operand", ValueType::Int32),
            ArgSpec::new("op2", "the second operand", ValueType::Int32),
        ],
        sum,
    )?;
    registry.add_broadcast(
        &root,
        BROADCAST,
        "This broadcast gets triggered whenever an odd number results from a sum.",
    )?;

    Ok(registry)
}

/// Prints the peer id and serves the registry until interrupted.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let conn = connect(SERVICE_CLIENT_NAME, config).await?;
    print_id(&conn, "sum-caller").await?;

    let host = ServiceHost::new(conn, arithmetic_registry()?);
    let signals = SignalHandler::new();
    signals.spawn_listener();

    tokio::select! {
        result = host.run() => {
            result?;
            info!("Broker closed the connection");
        }
        _ = signals.shutdown().wait() => info!("Shutting down"),
    }
    Ok(())
}
