//! Serving a registry over a connection.

use tracing::{debug, info, warn};

use c2c_core::Value;
use c2c_protocol::{C2cMessage, ReplyPolicy};

use crate::connection::{Connection, Inbox};
use crate::error::ClientResult;

use super::namespace::{MethodContext, Registry};
use super::{ScCommand, ScRequest};

/// Answers service client requests arriving on a connection's inbox.
pub struct ServiceHost {
    conn: Connection,
    registry: Registry,
}

impl ServiceHost {
    pub fn new(conn: Connection, registry: Registry) -> Self {
        Self { conn, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serves requests until the connection closes.
    pub async fn run(mut self) -> ClientResult<()> {
        let mut inbox = self.conn.inbox().await?;
        self.serve(&mut inbox).await;
        Ok(())
    }

    /// Serves requests from `inbox` until it ends.
    pub async fn serve(&mut self, inbox: &mut Inbox) {
        while let Some(message) = inbox.recv().await {
            self.dispatch(message).await;
        }
        debug!("Inbox closed, service host stopping");
    }

    /// Handles one inbound message.
    pub async fn dispatch(&mut self, message: C2cMessage) {
        let request = match ScRequest::from_value(&message.payload) {
            Ok(request) => request,
            Err(reason) => {
                warn!(message_id = %message.id, sender = %message.sender, %reason, "Ignoring message");
                self.answer(&message, Value::error(reason)).await;
                return;
            }
        };

        debug!(
            message_id = %message.id,
            sender = %message.sender,
            command = %request.command,
            path = %request.path.join("."),
            "Service request"
        );

        match request.command {
            ScCommand::Introspect => {
                let description = self.registry.introspect(&request.path);
                self.answer(&message, description).await;
            }
            ScCommand::Call => {
                let mut ctx = MethodContext::new(message.sender);
                let result = self.registry.call(&request.path, &request.args, &mut ctx);
                for (path, value) in ctx.take_emitted() {
                    self.emit(&path, value).await;
                }
                self.answer(&message, result).await;
            }
            ScCommand::Subscribe => {
                if message.policy != ReplyPolicy::MultiReply {
                    self.answer(
                        &message,
                        Value::error("subscriptions must be sent with multi_reply"),
                    )
                    .await;
                    return;
                }
                match self.registry.subscribe(&request.path, message.id) {
                    Ok(()) => info!(
                        subscriber = %message.sender,
                        path = %request.path.join("."),
                        "New subscriber"
                    ),
                    Err(reason) => self.answer(&message, Value::error(reason)).await,
                }
            }
        }
    }

    /// Delivers `value` to every subscriber of the broadcast at `path`.
    ///
    /// Subscribers whose reply the broker rejects are gone and get dropped.
    pub async fn emit(&mut self, path: &[String], value: Value) {
        if !self.registry.has_broadcast(path) {
            warn!(path = %path.join("."), "Emit on unknown broadcast");
            return;
        }

        for subscription in self.registry.subscribers(path) {
            if let Err(e) = self
                .conn
                .reply(subscription, ReplyPolicy::NoReply, value.clone())
                .await
            {
                debug!(subscription = %subscription, error = %e, "Dropping subscriber");
                self.registry.unsubscribe(path, subscription);
            }
        }
    }

    async fn answer(&self, message: &C2cMessage, value: Value) {
        if !message.policy.expects_reply() {
            return;
        }
        if let Err(e) = self.conn.reply(message.id, ReplyPolicy::NoReply, value).await {
            warn!(message_id = %message.id, error = %e, "Failed to reply");
        }
    }
}
