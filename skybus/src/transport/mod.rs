//! Transport capability consumed by the session layer.
//!
//! A transport moves opaque byte payloads between nodes. The session layer
//! never sees the medium itself; it opens inputs and outputs keyed by the
//! transport-native [`PortId`] that the transport's [`AddressMapper`]
//! produced for a data specifier, and exchanges [`Delivery`] records with
//! them.
//!
//! Implementations decide framing, buffering and redundancy internally.
//! The [`loopback`] module provides an in-process implementation used by
//! tests, examples and single-process deployments.

pub mod loopback;

use std::rc::Rc;
use std::time::SystemTime;

use async_trait::async_trait;
use skybus_core::{AddressMapper, NodeId, PortId};

use crate::error::SessionError;

/// A received payload together with its delivery metadata.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The raw payload bytes.
    pub payload: Vec<u8>,
    /// Node that sent the payload, or `None` for anonymous senders.
    pub source_node_id: Option<NodeId>,
    /// When the transport accepted the payload for delivery.
    pub timestamp: SystemTime,
}

/// A transport attachment owned by exactly one node.
///
/// The owner opens inputs and outputs on it and must close them before (or
/// while) tearing the transport down; [`close`](Transport::close) severs
/// every input still open so their receive loops terminate.
pub trait Transport {
    /// Input endpoint type produced by [`open_input`](Transport::open_input).
    type Input: TransportInput + 'static;

    /// Output endpoint type produced by [`open_output`](Transport::open_output).
    type Output: TransportOutput + 'static;

    /// The address mapping of this transport family.
    fn mapper(&self) -> &dyn AddressMapper;

    /// Open an input endpoint receiving payloads addressed to `port`.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] on a closed transport.
    fn open_input(&self, port: PortId) -> Result<Rc<Self::Input>, SessionError>;

    /// Open an output endpoint sending payloads to `port`.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] on a closed transport.
    fn open_output(&self, port: PortId) -> Result<Rc<Self::Output>, SessionError>;

    /// The local node identifier, or `None` while the node is anonymous.
    fn local_node_id(&self) -> Option<NodeId>;

    /// Assign the local node identifier.
    ///
    /// The identifier can be set exactly once.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NodeIdAlreadySet`] if an identifier is
    /// already assigned (the existing value is left intact), or
    /// [`SessionError::AlreadyClosed`] on a closed transport.
    fn set_local_node_id(&self, node_id: NodeId) -> Result<(), SessionError>;

    /// Close the transport and every input still open on it.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    fn close(&self) -> Result<(), SessionError>;
}

/// Receiving side of one port.
#[async_trait(?Send)]
pub trait TransportInput {
    /// The port this input is bound to.
    fn port(&self) -> PortId;

    /// Wait for the next delivery.
    ///
    /// Suspends until a payload arrives.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::SessionClosed`] once the input (or its
    /// transport) has been closed; a pending `receive` is woken and fails
    /// the same way.
    async fn receive(&self) -> Result<Delivery, SessionError>;

    /// Stop receiving and release the port registration.
    fn close(&self);
}

/// Sending side of one port.
#[async_trait(?Send)]
pub trait TransportOutput {
    /// The port this output sends to.
    fn port(&self) -> PortId;

    /// Send a payload.
    ///
    /// `destination` of `None` broadcasts to every node listening on the
    /// port; `Some(node)` delivers to that node only. Delivery is
    /// best-effort: sending to a port nobody listens on succeeds and the
    /// payload is dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] on a closed output, or a
    /// transport-specific [`SessionError::Transport`] on medium failure.
    async fn send(&self, payload: &[u8], destination: Option<NodeId>) -> Result<(), SessionError>;

    /// Stop sending.
    fn close(&self);
}
