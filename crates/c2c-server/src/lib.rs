//! Broker daemon: peer registry, message routing, reply policies.
//!
//! This crate provides the c2c broker that:
//! - accepts client connections on a Unix socket
//! - assigns each client a peer id
//! - routes point-to-point messages between clients
//! - enforces reply policies and reports unreachable peers
//!
//! # Example
//!
//! ```rust,no_run
//! use c2c_server::{ServerConfig, SocketServer, make_connection_handler, new_shared_broker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SocketServer::new(ServerConfig::default()).await?;
//!     server.run(make_connection_handler(new_shared_broker())).await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod error;
mod handler;
mod signals;
mod socket;

pub use broker::{Broker, SharedBroker, new_shared_broker};
pub use config::{ServerConfig, default_socket_path};
pub use error::{ServerError, ServerResult};
pub use handler::{RequestHandler, make_connection_handler};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, SocketServer};
