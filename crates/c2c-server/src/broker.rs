//! Peer registry and message routing.
//!
//! The broker owns every piece of routing state: connected peers with their
//! outbound queues, and the messages still waiting for a reply. All methods
//! are synchronous and run under the shared lock, so each request is routed
//! atomically and per-peer delivery order follows processing order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use c2c_core::Value;
use c2c_protocol::{
    C2cMessage, Envelope, ErrorCode, ErrorResponse, MessageId, PeerId, ReplyPolicy, RequestId,
    Response, ServerMessage,
};

/// Outbound queue of one connection.
pub type Outbox = mpsc::UnboundedSender<Envelope<ServerMessage>>;

/// Broker shared across all connections.
pub type SharedBroker = Arc<RwLock<Broker>>;

/// Creates a new shared broker.
pub fn new_shared_broker() -> SharedBroker {
    Arc::new(RwLock::new(Broker::new()))
}

#[derive(Debug)]
struct PeerEntry {
    client_name: String,
    outbox: Outbox,
}

/// Where replies to a pending message are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyRoute {
    /// As responses to the request that sent the message.
    Request(RequestId),
    /// As inbound messages (the message was itself a reply).
    Inbox,
}

#[derive(Debug)]
struct PendingMessage {
    sender: PeerId,
    destination: PeerId,
    policy: ReplyPolicy,
    route: ReplyRoute,
}

/// Routing state of the broker.
#[derive(Debug)]
pub struct Broker {
    next_peer_id: u32,
    next_message_id: u32,
    peers: HashMap<PeerId, PeerEntry>,
    pending: HashMap<MessageId, PendingMessage>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            next_peer_id: 1,
            next_message_id: 1,
            peers: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Registers a connected client and returns its peer id.
    pub fn register(&mut self, client_name: impl Into<String>, outbox: Outbox) -> PeerId {
        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        let client_name = client_name.into();
        info!(peer_id = %id, client = %client_name, "Client registered");
        self.peers.insert(
            id,
            PeerEntry {
                client_name,
                outbox,
            },
        );
        id
    }

    /// Removes a client.
    ///
    /// Messages it sent stop waiting for replies; senders still waiting on
    /// a reply from it get a `peer_disconnected` error.
    pub fn unregister(&mut self, peer: PeerId) {
        let Some(entry) = self.peers.remove(&peer) else {
            return;
        };
        info!(peer_id = %peer, client = %entry.client_name, "Client unregistered");

        let mut orphaned = Vec::new();
        self.pending.retain(|id, pending| {
            if pending.sender == peer {
                return false;
            }
            if pending.destination == peer {
                orphaned.push((*id, pending.sender, pending.route));
                return false;
            }
            true
        });

        for (id, sender, route) in orphaned {
            if let ReplyRoute::Request(request_id) = route {
                debug!(message_id = %id, peer_id = %sender, "Failing orphaned message");
                self.respond(
                    sender,
                    request_id,
                    Response::error(
                        ErrorCode::PeerDisconnected,
                        format!("client {} disconnected before replying to message {}", peer, id),
                    ),
                );
            }
        }
    }

    /// Returns true if a client with this id is connected.
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Number of connected clients.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of messages waiting for replies.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Routes a new point-to-point message.
    ///
    /// Returns the response owed immediately to the sender, if any. With
    /// `single_reply` and `multi_reply` the sender's answers are the
    /// replies themselves, delivered later under the same request id.
    pub fn send(
        &mut self,
        from: PeerId,
        request_id: RequestId,
        destination: PeerId,
        policy: ReplyPolicy,
        payload: Value,
    ) -> Option<Response> {
        if !self.peers.contains_key(&destination) {
            return Some(Response::error(
                ErrorCode::NoSuchPeer,
                format!("no client with id {}", destination),
            ));
        }

        let id = self.allocate_message_id();
        if policy.expects_reply() {
            self.pending.insert(
                id,
                PendingMessage {
                    sender: from,
                    destination,
                    policy,
                    route: ReplyRoute::Request(request_id),
                },
            );
        }

        debug!(message_id = %id, from = %from, to = %destination, ?policy, "Routing message");
        self.deliver_inbound(C2cMessage {
            id,
            sender: from,
            destination,
            policy,
            in_reply_to: None,
            payload,
        });

        if policy.expects_reply() {
            None
        } else {
            Some(Response::Sent { message_id: id })
        }
    }

    /// Routes a reply to a pending message and returns the response for the
    /// replying client.
    pub fn reply(
        &mut self,
        from: PeerId,
        to: MessageId,
        policy: ReplyPolicy,
        payload: Value,
    ) -> Response {
        let Some(original) = self.pending.get(&to) else {
            return if to.0 < self.next_message_id {
                Response::error(
                    ErrorCode::ReplyNotAllowed,
                    format!("message {} does not accept further replies", to),
                )
            } else {
                Response::error(ErrorCode::UnknownMessage, format!("no message with id {}", to))
            };
        };

        if original.destination != from {
            return Response::error(
                ErrorCode::ReplyNotAllowed,
                format!("message {} was not addressed to client {}", to, from),
            );
        }

        let sender = original.sender;
        let route = original.route;
        let once = original.policy == ReplyPolicy::SingleReply;
        if once {
            self.pending.remove(&to);
        }

        let id = self.allocate_message_id();
        if policy.expects_reply() {
            self.pending.insert(
                id,
                PendingMessage {
                    sender: from,
                    destination: sender,
                    policy,
                    route: ReplyRoute::Inbox,
                },
            );
        }

        let message = C2cMessage {
            id,
            sender: from,
            destination: sender,
            policy,
            in_reply_to: Some(to),
            payload,
        };

        debug!(message_id = %id, in_reply_to = %to, from = %from, to = %sender, "Routing reply");
        match route {
            ReplyRoute::Request(request_id) => {
                self.respond(sender, request_id, Response::Message { message })
            }
            ReplyRoute::Inbox => self.deliver_inbound(message),
        }

        Response::Sent { message_id: id }
    }

    /// Queues a response frame for `peer`.
    pub fn respond(&self, peer: PeerId, request_id: RequestId, response: Response) {
        self.push(peer, Envelope::new(request_id, ServerMessage::Response(response)));
    }

    fn deliver_inbound(&self, message: C2cMessage) {
        // Inbound frames are not correlated with any request of the receiver.
        self.push(message.destination, Envelope::new(0, ServerMessage::Inbound(message)));
    }

    fn push(&self, peer: PeerId, envelope: Envelope<ServerMessage>) {
        match self.peers.get(&peer) {
            Some(entry) => {
                if entry.outbox.send(envelope).is_err() {
                    warn!(peer_id = %peer, "Outbox closed, dropping frame");
                }
            }
            None => debug!(peer_id = %peer, "Peer gone, dropping frame"),
        }
    }

    fn allocate_message_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    /// Builds an `invalid_request` error response.
    pub fn reject(message: impl Into<String>) -> Response {
        Response::from_error(ErrorResponse::invalid_request(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Inbox = UnboundedReceiver<Envelope<ServerMessage>>;

    fn connect(broker: &mut Broker, name: &str) -> (PeerId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (broker.register(name, tx), rx)
    }

    fn operands(a: i32, b: i32) -> Value {
        Value::List(vec![Value::Int32(a), Value::Int32(b)])
    }

    fn next_inbound(inbox: &mut Inbox) -> C2cMessage {
        match inbox.try_recv().unwrap().payload {
            ServerMessage::Inbound(message) => message,
            other => panic!("expected inbound message, got {:?}", other),
        }
    }

    fn next_response(inbox: &mut Inbox) -> (RequestId, Response) {
        let envelope = inbox.try_recv().unwrap();
        match envelope.payload {
            ServerMessage::Response(response) => (envelope.request_id, response),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn peer_ids_are_sequential() {
        let mut broker = Broker::new();
        let (a, _) = connect(&mut broker, "a");
        let (b, _) = connect(&mut broker, "b");
        assert_eq!(a, PeerId(1));
        assert_eq!(b, PeerId(2));
        assert_eq!(broker.peer_count(), 2);

        broker.unregister(a);
        let (c, _) = connect(&mut broker, "c");
        assert_eq!(c, PeerId(3));
        assert!(!broker.is_connected(a));
    }

    #[test]
    fn send_to_unknown_peer_is_rejected() {
        let mut broker = Broker::new();
        let (sender, _) = connect(&mut broker, "sender");

        let response = broker
            .send(sender, 1, PeerId(99), ReplyPolicy::SingleReply, operands(1, 2))
            .unwrap();
        assert_eq!(response.as_error().unwrap().code, ErrorCode::NoSuchPeer);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn single_reply_is_forwarded_once() {
        let mut broker = Broker::new();
        let (sender, mut sender_inbox) = connect(&mut broker, "sumclient");
        let (service, mut service_inbox) = connect(&mut broker, "sumservice");

        let immediate = broker.send(sender, 7, service, ReplyPolicy::SingleReply, operands(3, 4));
        assert!(immediate.is_none());

        let request = next_inbound(&mut service_inbox);
        assert_eq!(request.sender, sender);
        assert_eq!(request.payload, operands(3, 4));

        let ack = broker.reply(service, request.id, ReplyPolicy::NoReply, Value::Int32(7));
        assert!(matches!(ack, Response::Sent { .. }));

        let (request_id, response) = next_response(&mut sender_inbox);
        assert_eq!(request_id, 7);
        match response {
            Response::Message { message } => {
                assert_eq!(message.payload, Value::Int32(7));
                assert_eq!(message.in_reply_to, Some(request.id));
                assert_eq!(message.sender, service);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let second = broker.reply(service, request.id, ReplyPolicy::NoReply, Value::Int32(7));
        assert_eq!(second.as_error().unwrap().code, ErrorCode::ReplyNotAllowed);
        assert!(sender_inbox.try_recv().is_err());
    }

    #[test]
    fn no_reply_messages_are_acknowledged_and_reject_replies() {
        let mut broker = Broker::new();
        let (a, _) = connect(&mut broker, "a");
        let (b, mut b_inbox) = connect(&mut broker, "b");

        let response = broker.send(a, 1, b, ReplyPolicy::NoReply, Value::Int32(1));
        assert!(matches!(response, Some(Response::Sent { .. })));

        let message = next_inbound(&mut b_inbox);
        let rejected = broker.reply(b, message.id, ReplyPolicy::NoReply, Value::Int32(2));
        assert_eq!(rejected.as_error().unwrap().code, ErrorCode::ReplyNotAllowed);
    }

    #[test]
    fn multi_reply_keeps_forwarding() {
        let mut broker = Broker::new();
        let (subscriber, mut subscriber_inbox) = connect(&mut broker, "subscriber");
        let (host, mut host_inbox) = connect(&mut broker, "host");

        broker.send(subscriber, 3, host, ReplyPolicy::MultiReply, Value::Int32(0));
        let subscription = next_inbound(&mut host_inbox);

        for sum in [9, 11, 13] {
            let ack = broker.reply(host, subscription.id, ReplyPolicy::NoReply, Value::Int32(sum));
            assert!(ack.is_success());
        }

        for sum in [9, 11, 13] {
            let (request_id, response) = next_response(&mut subscriber_inbox);
            assert_eq!(request_id, 3);
            assert!(
                matches!(response, Response::Message { message } if message.payload == Value::Int32(sum))
            );
        }
        assert_eq!(broker.pending_count(), 1);
    }

    #[test]
    fn only_the_destination_may_reply() {
        let mut broker = Broker::new();
        let (a, _) = connect(&mut broker, "a");
        let (b, mut b_inbox) = connect(&mut broker, "b");
        let (c, _) = connect(&mut broker, "c");

        broker.send(a, 1, b, ReplyPolicy::SingleReply, Value::Int32(1));
        let message = next_inbound(&mut b_inbox);

        let response = broker.reply(c, message.id, ReplyPolicy::NoReply, Value::Int32(2));
        assert_eq!(response.as_error().unwrap().code, ErrorCode::ReplyNotAllowed);
        assert_eq!(broker.pending_count(), 1);
    }

    #[test]
    fn unknown_message_id() {
        let mut broker = Broker::new();
        let (a, _) = connect(&mut broker, "a");
        let response = broker.reply(a, MessageId(500), ReplyPolicy::NoReply, Value::Int32(0));
        assert_eq!(response.as_error().unwrap().code, ErrorCode::UnknownMessage);
    }

    #[test]
    fn counter_reply_goes_to_inbox() {
        let mut broker = Broker::new();
        let (a, mut a_inbox) = connect(&mut broker, "a");
        let (b, mut b_inbox) = connect(&mut broker, "b");

        broker.send(a, 1, b, ReplyPolicy::SingleReply, Value::string("question"));
        let question = next_inbound(&mut b_inbox);
        broker.reply(b, question.id, ReplyPolicy::SingleReply, Value::string("answer?"));

        let answer = match next_response(&mut a_inbox).1 {
            Response::Message { message } => message,
            other => panic!("unexpected response {:?}", other),
        };
        broker.reply(a, answer.id, ReplyPolicy::NoReply, Value::string("yes"));

        let counter = next_inbound(&mut b_inbox);
        assert_eq!(counter.in_reply_to, Some(answer.id));
        assert_eq!(counter.payload, Value::string("yes"));
    }

    #[test]
    fn disconnect_fails_waiting_senders() {
        let mut broker = Broker::new();
        let (sender, mut sender_inbox) = connect(&mut broker, "sender");
        let (service, _service_inbox) = connect(&mut broker, "service");

        broker.send(sender, 5, service, ReplyPolicy::SingleReply, operands(1, 1));
        broker.unregister(service);

        let (request_id, response) = next_response(&mut sender_inbox);
        assert_eq!(request_id, 5);
        assert_eq!(response.as_error().unwrap().code, ErrorCode::PeerDisconnected);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn disconnect_drops_subscriptions() {
        let mut broker = Broker::new();
        let (subscriber, _) = connect(&mut broker, "subscriber");
        let (host, mut host_inbox) = connect(&mut broker, "host");

        broker.send(subscriber, 1, host, ReplyPolicy::MultiReply, Value::Int32(0));
        let subscription = next_inbound(&mut host_inbox);
        broker.unregister(subscriber);

        let response = broker.reply(host, subscription.id, ReplyPolicy::NoReply, Value::Int32(9));
        assert!(!response.is_success());
    }
}
