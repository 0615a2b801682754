//! Error types for the skybus session layer.

use std::time::Duration;

use skybus_core::{CodecError, InvalidId, MapError, NodeId};

/// Errors that can occur in the session layer and node composition.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A subject or service identifier was outside its valid range.
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// The transport's address mapper cannot represent the data specifier.
    #[error(transparent)]
    Unmappable(#[from] MapError),

    /// A fixed-port factory was used with a type that declares no fixed port.
    #[error("{type_name} declares no fixed port identifier")]
    NoFixedPort {
        /// Name of the schema type the factory was called with.
        type_name: &'static str,
    },

    /// An RPC call produced no matching response before its deadline.
    #[error("no response within {timeout:?}")]
    ResponseTimeout {
        /// The deadline that elapsed, measured from the request send.
        timeout: Duration,
    },

    /// Payload serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A transport-level send or receive failed.
    #[error("transport error: {message}")]
    Transport {
        /// Details about the transport failure.
        message: String,
    },

    /// Operation on an endpoint or transport that is already closed.
    #[error("already closed")]
    AlreadyClosed,

    /// The endpoint was closed while the operation was still in flight.
    #[error("session closed while the operation was pending")]
    SessionClosed,

    /// A handler is already registered and serving on this server.
    #[error("server is already serving")]
    AlreadyServing,

    /// The transport's local node-id can only be assigned once.
    #[error("local node-id already set to {current}")]
    NodeIdAlreadySet {
        /// The previously assigned value, left intact.
        current: NodeId,
    },
}
