//! # skybus-core
//!
//! Core abstractions for the skybus protocol stack.
//!
//! This crate defines the transport-independent pieces that every other
//! skybus crate builds on:
//!
//! - **Addressing model**: [`DataSpecifier`] and its component identifiers
//!   ([`SubjectId`], [`ServiceId`], [`Role`], [`NodeId`]) name logical
//!   communication endpoints without reference to any concrete medium.
//! - **Port mapping**: [`AddressMapper`] translates a data specifier into a
//!   transport-native [`PortId`]; [`UdpPortMap`] is the reference mapping for
//!   port-numbered media.
//! - **Schema descriptors**: [`MessageSchema`] and [`ServiceSchema`] carry
//!   the static metadata of a data type, including its optional fixed port.
//! - **Codec**: [`MessageCodec`] abstracts payload serialization, with
//!   [`JsonCodec`] as the default implementation.
//!
//! ## Addressing at a glance
//!
//! ```rust
//! use skybus_core::{AddressMapper, DataSpecifier, PortId, Role, UdpPortMap};
//!
//! let heartbeat = DataSpecifier::subject(7509).unwrap();
//! assert_eq!(UdpPortMap.map(heartbeat).unwrap(), PortId::new(23893));
//!
//! let info_request = DataSpecifier::service(430, Role::Request).unwrap();
//! assert_eq!(UdpPortMap.map(info_request).unwrap(), PortId::new(15522));
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod codec;
mod ports;
mod schema;
mod specifier;

// Codec exports
pub use codec::{CodecError, JsonCodec, MessageCodec};

// Port mapping exports
pub use ports::{AddressMapper, MapError, PortId, UdpPortMap, SUBJECT_PORT_OFFSET};

// Schema descriptor exports
pub use schema::{MessageSchema, ServiceSchema};

// Addressing exports
pub use specifier::{DataSpecifier, InvalidId, NodeId, Role, ServiceId, SubjectId};
