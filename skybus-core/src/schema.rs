//! Static schema descriptors for message and service data types.
//!
//! A schema descriptor is compile-time metadata attached to a payload type:
//! its versioned name and, optionally, the port identifier permanently
//! assigned to it. Fixed ports make well-known endpoints reachable without
//! prior negotiation — a factory that needs one simply reads the constant
//! and fails if the type declares none.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Descriptor of a broadcast message data type.
///
/// Implemented by every type that can travel over a subject. The
/// `message_types!` macro in the session crate generates implementations
/// together with the serde derives.
pub trait MessageSchema: Serialize + DeserializeOwned + 'static {
    /// Name of the data type, used in diagnostics.
    const NAME: &'static str;

    /// Subject identifier permanently assigned to this type, if any.
    ///
    /// The value is validated against [`SubjectId::MAX`](crate::SubjectId::MAX)
    /// when a fixed-port factory uses it, not at declaration time.
    const FIXED_SUBJECT_ID: Option<u16> = None;
}

/// Descriptor of a request/response service data type pair.
pub trait ServiceSchema: 'static {
    /// Payload type of the request role.
    type Request: Serialize + DeserializeOwned + 'static;

    /// Payload type of the response role.
    type Response: Serialize + DeserializeOwned + 'static;

    /// Name of the service type, used in diagnostics.
    const NAME: &'static str;

    /// Service identifier permanently assigned to this type, if any.
    const FIXED_SERVICE_ID: Option<u16> = None;
}
