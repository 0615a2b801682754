//! Session layer: typed endpoints over an abstract transport.
//!
//! Four endpoint kinds compose the addressing model with a transport and a
//! codec:
//!
//! - [`Publisher`]: best-effort broadcast of typed messages on a subject
//! - [`Subscriber`]: bounded, drop-oldest stream of typed messages from a
//!   subject
//! - [`Client`]: request/response calls with per-call correlation and a
//!   hard deadline
//! - [`Server`]: concurrent handler dispatch with graceful drain on close
//!
//! Every endpoint is bound to exactly one data specifier, owns the
//! transport resources it opened and is closed explicitly; closing twice
//! is a usage error that fails loudly instead of corrupting state.
//!
//! RPC correlation rides in a [`TransferEnvelope`] around the payload: the
//! client stamps each request with a fresh transfer-id and the server
//! echoes it on the response, so any number of calls can be outstanding
//! concurrently and responses may arrive in any order.

mod client;
mod publisher;
mod queue;
mod server;
mod subscriber;

pub use client::{Client, DEFAULT_RESPONSE_TIMEOUT};
pub use publisher::Publisher;
pub use queue::{NotifiedQueue, RecvFuture};
pub use server::Server;
pub use subscriber::Subscriber;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use skybus_core::NodeId;

/// Correlates an RPC request with its eventual response.
///
/// Allocated monotonically per client, so concurrent calls from one client
/// always carry distinct values.
pub type TransferId = u64;

/// On-wire envelope pairing a payload with its transfer-id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEnvelope<T> {
    /// Correlation identifier, echoed verbatim on the response.
    pub transfer_id: TransferId,
    /// The enveloped payload.
    pub value: T,
}

/// Delivery metadata paired with every received subscription item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageMetadata {
    /// Publishing node, or `None` if the sender was anonymous.
    pub source_node_id: Option<NodeId>,
    /// When the transport accepted the message.
    pub timestamp: SystemTime,
}

/// Metadata passed to a service handler alongside each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestMetadata {
    /// The node that sent the request (anonymous requests are dropped
    /// before dispatch, since no response could reach them).
    pub client_node_id: NodeId,
    /// When the transport accepted the request.
    pub timestamp: SystemTime,
    /// The request's correlation identifier.
    pub transfer_id: TransferId,
}
