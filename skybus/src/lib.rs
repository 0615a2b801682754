//! # Skybus
//!
//! Addressing and session layer of a pub/sub + RPC protocol stack for
//! heterogeneous transports.
//!
//! This crate provides:
//! - **Session endpoints**: [`Publisher`], [`Subscriber`], [`Client`] and
//!   [`Server`], each bound to one transport-independent data specifier
//! - **Node composition**: [`Node`] owns one transport and runs the
//!   mandatory heartbeat broadcast and node-info responder
//! - **Transport capability**: the [`transport`] traits consumed by the
//!   session layer, with an in-process [`transport::loopback`] implementation
//! - **Standard types**: the minimal [`standard`] catalog the node needs
//!
//! The addressing model, port mapping, schema descriptors and codec live
//! in `skybus-core` and are re-exported here.
//!
//! # Example
//!
//! ```rust
//! use skybus::transport::loopback::LoopbackBus;
//! use skybus::{message_types, Node, NodeId, NodeInfo};
//!
//! message_types! {
//!     /// Altitude sample.
//!     pub struct Altitude {
//!         /// Meters above ground.
//!         pub meters: f64,
//!     }
//! }
//!
//! # async fn demo() -> Result<(), skybus::SessionError> {
//! let bus = LoopbackBus::new();
//! let node = Node::with_defaults(bus.attach(), NodeInfo::with_name("org.example.demo"))?;
//! node.set_local_node_id(NodeId::new(42))?;
//!
//! let publisher = node.make_publisher::<Altitude>(1500)?;
//! publisher.publish(&Altitude { meters: 120.5 }).await?;
//! # node.close().await
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use skybus_core::{
    AddressMapper, CodecError, DataSpecifier, InvalidId, JsonCodec, MapError, MessageCodec,
    MessageSchema, NodeId, PortId, Role, ServiceId, ServiceSchema, SubjectId, UdpPortMap,
    SUBJECT_PORT_OFFSET,
};

// =============================================================================
// Modules
// =============================================================================

/// Error types for session operations.
pub mod error;

/// Macros for declaring schema data types.
mod macros;

/// Top-level node composition.
pub mod node;

/// Typed session endpoints over an abstract transport.
pub mod session;

/// Minimal standard data type catalog.
pub mod standard;

/// Transport capability consumed by the session layer.
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Error exports
pub use error::SessionError;

// Node exports
pub use node::{HeartbeatPublisher, Node, NodeConfig};

// Session exports
pub use session::{
    Client, MessageMetadata, NotifiedQueue, Publisher, RequestMetadata, Server, Subscriber,
    TransferEnvelope, TransferId, DEFAULT_RESPONSE_TIMEOUT,
};

// Standard type exports
pub use standard::{GetNodeInfo, GetNodeInfoRequest, Health, Heartbeat, Mode, NodeInfo, Version};

// Transport exports
pub use transport::{Delivery, Transport, TransportInput, TransportOutput};
