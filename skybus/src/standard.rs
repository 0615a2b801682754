//! Minimal subset of the standard data types every node carries.
//!
//! Only the types required by the mandatory node functions live here: the
//! heartbeat broadcast and the node-info query. The full application-level
//! type catalog is generated elsewhere and out of scope.

use serde::{Deserialize, Serialize};

use crate::{message_types, service_types};

/// Coarse health of a node, reported in every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Health {
    /// The node is functioning properly.
    #[default]
    Nominal,
    /// A minor failure that does not affect availability.
    Advisory,
    /// Degraded performance, the node can still do its job.
    Caution,
    /// A major failure, the node may be unable to perform.
    Warning,
}

/// Operating mode of a node, reported in every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Normal operation.
    #[default]
    Operational,
    /// The node is starting up.
    Initialization,
    /// The node is being serviced.
    Maintenance,
    /// A software update is in progress.
    SoftwareUpdate,
}

message_types! {
    /// Periodic liveness announcement broadcast by every node.
    pub struct Heartbeat @ 7509 {
        /// Whole seconds since the node started. Strictly increases across
        /// consecutive emissions of one node.
        pub uptime: u32,
        /// Coarse health of the node.
        pub health: Health,
        /// Current operating mode.
        pub mode: Mode,
        /// Application-defined status payload, opaque to the protocol.
        pub vendor_specific_status_code: u8,
    }

    /// Request payload of [`GetNodeInfo`]; carries no fields.
    pub struct GetNodeInfoRequest {}

    /// Major/minor version pair.
    pub struct Version {
        /// Major component.
        pub major: u8,
        /// Minor component.
        pub minor: u8,
    }

    /// Immutable identity of a node, served on every node-info request.
    pub struct NodeInfo {
        /// Version of the protocol stack the node speaks.
        pub protocol_version: Version,
        /// Hardware revision, zero for software-only nodes.
        pub hardware_version: Version,
        /// Application software version.
        pub software_version: Version,
        /// Human-readable node name, e.g. `org.example.altimeter`.
        pub name: String,
        /// Globally unique 128-bit identifier of this node instance.
        pub unique_id: [u8; 16],
    }
}

service_types! {
    /// Standard node identity query; every node answers it.
    pub service GetNodeInfo @ 430 {
        request: GetNodeInfoRequest,
        response: NodeInfo,
    }
}

impl Version {
    /// Build a version pair.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl NodeInfo {
    /// Build a minimal info structure with the given name.
    ///
    /// The protocol version defaults to 1.0, the hardware and software
    /// versions to zero and the unique-id to all zeros; set the fields
    /// directly for anything more specific.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            protocol_version: Version::new(1, 0),
            hardware_version: Version::new(0, 0),
            software_version: Version::new(0, 0),
            name: name.into(),
            unique_id: [0; 16],
        }
    }
}
