//! Client library and command-line programs for c2c.
//!
//! This crate provides:
//! - [`Connection`]: a broker connection with point-to-point send, reply and
//!   an inbox of inbound messages
//! - [`service`]: namespaces, remote methods and broadcasts built on top of
//!   c2c messages
//! - the `c2c` binary running the broker and the sum example programs
//!
//! # Example
//!
//! ```rust,no_run
//! use c2c_client::{Connection, ClientConfig};
//! use c2c_core::Value;
//! use c2c_protocol::{PeerId, ReplyPolicy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let conn = Connection::connect("sumclient", &config.socket_path).await?;
//!     let operands = Value::List(vec![Value::Int32(3), Value::Int32(4)]);
//!     let reply = conn
//!         .send(PeerId(1), ReplyPolicy::SingleReply, operands)
//!         .await?
//!         .value()
//!         .await;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod service;

pub use cli::Cli;
pub use config::ClientConfig;
pub use connection::{Connection, Inbox, PendingReply, Subscription};
pub use error::{ClientError, ClientResult};
