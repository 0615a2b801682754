//! Transport-independent names for logical communication endpoints.
//!
//! A [`DataSpecifier`] identifies either a broadcast topic (a *subject*) or
//! one role of a request/response exchange (a *service*). Specifiers are the
//! sole key space for endpoint identity: two endpoints talk to each other
//! exactly when their specifiers are equal, regardless of the medium
//! underneath.
//!
//! Identifier ranges are validated at construction time so that a specifier,
//! once built, is always mappable onto a transport address.

use std::fmt;

/// Identifier of a broadcast subject.
///
/// Valid values are `0..=`[`SubjectId::MAX`]. Construction rejects anything
/// larger, so downstream code never has to re-check the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(u16);

impl SubjectId {
    /// Largest valid subject identifier (2^14 - 1).
    pub const MAX: u16 = (1 << 14) - 1;

    /// Create a subject identifier, validating the range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidId::SubjectIdOutOfRange`] if `id > SubjectId::MAX`.
    pub const fn new(id: u16) -> Result<Self, InvalidId> {
        if id > Self::MAX {
            return Err(InvalidId::SubjectIdOutOfRange { id });
        }
        Ok(Self(id))
    }

    /// The raw identifier value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a request/response service.
///
/// Valid values are `0..=`[`ServiceId::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u16);

impl ServiceId {
    /// Largest valid service identifier (2^9 - 1).
    pub const MAX: u16 = (1 << 9) - 1;

    /// Create a service identifier, validating the range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidId::ServiceIdOutOfRange`] if `id > ServiceId::MAX`.
    pub const fn new(id: u16) -> Result<Self, InvalidId> {
        if id > Self::MAX {
            return Err(InvalidId::ServiceIdOutOfRange { id });
        }
        Ok(Self(id))
    }

    /// The raw identifier value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a service exchange a specifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The request sent by a client to a server.
    Request,
    /// The response sent by a server back to the requesting client.
    Response,
}

/// Transport-independent name of a logical communication endpoint.
///
/// Equality is value equality over the variant and all of its fields. A
/// specifier is hashable and cheap to copy, so it can serve directly as a
/// routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSpecifier {
    /// A broadcast topic carrying messages of one type.
    Subject(SubjectId),
    /// One role of a request/response service.
    Service {
        /// The service identifier.
        id: ServiceId,
        /// Request or response side.
        role: Role,
    },
}

impl DataSpecifier {
    /// Build a subject specifier from a raw identifier.
    ///
    /// # Errors
    ///
    /// Fails if the identifier is out of range.
    pub const fn subject(id: u16) -> Result<Self, InvalidId> {
        match SubjectId::new(id) {
            Ok(id) => Ok(Self::Subject(id)),
            Err(e) => Err(e),
        }
    }

    /// Build a service specifier from a raw identifier and a role.
    ///
    /// # Errors
    ///
    /// Fails if the identifier is out of range.
    pub const fn service(id: u16, role: Role) -> Result<Self, InvalidId> {
        match ServiceId::new(id) {
            Ok(id) => Ok(Self::Service { id, role }),
            Err(e) => Err(e),
        }
    }

    /// The service role, or `None` for subjects.
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Subject(_) => None,
            Self::Service { role, .. } => Some(*role),
        }
    }
}

impl fmt::Display for DataSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject(id) => write!(f, "subject {id}"),
            Self::Service {
                id,
                role: Role::Request,
            } => write!(f, "service {id} request"),
            Self::Service {
                id,
                role: Role::Response,
            } => write!(f, "service {id} response"),
        }
    }
}

/// Transport-level identifier of a node.
///
/// The valid range (and whether an identifier is assigned at all) is a
/// property of the concrete transport, so no range is enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u16);

impl NodeId {
    /// Create a node identifier.
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// The raw identifier value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised when an identifier is outside its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidId {
    /// The subject identifier exceeds [`SubjectId::MAX`].
    #[error("subject-id {id} is out of range 0..={max}", max = SubjectId::MAX)]
    SubjectIdOutOfRange {
        /// The rejected value.
        id: u16,
    },

    /// The service identifier exceeds [`ServiceId::MAX`].
    #[error("service-id {id} is out of range 0..={max}", max = ServiceId::MAX)]
    ServiceIdOutOfRange {
        /// The rejected value.
        id: u16,
    },
}
