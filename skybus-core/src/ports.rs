//! Deterministic mapping of data specifiers onto transport port numbers.
//!
//! Every transport family exposes one [`AddressMapper`]: a total,
//! deterministic and injective function from [`DataSpecifier`] to the
//! transport's native address space. Injectivity is a correctness
//! requirement — two distinct specifiers must never share an address, or
//! unrelated endpoints would receive each other's traffic.
//!
//! [`UdpPortMap`] is the reference mapping for media addressed by 16-bit
//! port numbers.

use std::fmt;

use crate::specifier::{DataSpecifier, Role};

/// First port of the subject range; subjects grow upward from here and
/// services grow downward.
///
/// The offset is chosen so the mapped range stays clear of the low
/// well-known port numbers and the IANA ephemeral range.
pub const SUBJECT_PORT_OFFSET: u16 = 1 << 14;

/// Transport-native numeric address of a single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u16);

impl PortId {
    /// Create a port identifier from a raw port number.
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    /// The raw port number.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised when a mapper is given a specifier outside its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// The mapper cannot represent this data specifier.
    #[error("unsupported data specifier: {specifier}")]
    Unsupported {
        /// The specifier that could not be mapped.
        specifier: DataSpecifier,
    },
}

/// Translation from data specifiers to transport-native addresses.
///
/// Implementations must be **deterministic** (the same specifier always
/// yields the same port) and **injective** over their supported domain (no
/// two distinct specifiers collide). A mapper whose domain covers every
/// valid specifier never returns an error; narrower mappers reject the
/// rest with [`MapError::Unsupported`].
pub trait AddressMapper {
    /// Map a data specifier to its port.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Unsupported`] for specifiers outside this
    /// mapper's domain.
    fn map(&self, specifier: DataSpecifier) -> Result<PortId, MapError>;
}

/// Reference port mapping for port-numbered media such as UDP.
///
/// Subjects map to `SUBJECT_PORT_OFFSET + subject_id`, consuming ports
/// upward from the offset. Services consume ports downward from the same
/// offset, two per service: an even port for the request role and the next
/// odd port for the response role. Growing the two ranges in opposite
/// directions leaves room to extend the service-id range later without
/// renumbering anything.
///
/// The mapped range is `15360..=32767`; with validated identifiers the
/// mapping is total.
///
/// ```rust
/// use skybus_core::{AddressMapper, DataSpecifier, Role, UdpPortMap};
///
/// let map = |ds: DataSpecifier| UdpPortMap.map(ds).unwrap().get();
///
/// assert_eq!(map(DataSpecifier::subject(0).unwrap()), 16384);
/// assert_eq!(map(DataSpecifier::subject(16383).unwrap()), 32767);
/// assert_eq!(map(DataSpecifier::service(0, Role::Request).unwrap()), 16382);
/// assert_eq!(map(DataSpecifier::service(0, Role::Response).unwrap()), 16383);
/// assert_eq!(map(DataSpecifier::service(511, Role::Request).unwrap()), 15360);
/// assert_eq!(map(DataSpecifier::service(511, Role::Response).unwrap()), 15361);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpPortMap;

impl AddressMapper for UdpPortMap {
    fn map(&self, specifier: DataSpecifier) -> Result<PortId, MapError> {
        match specifier {
            DataSpecifier::Subject(id) => Ok(PortId::new(SUBJECT_PORT_OFFSET + id.get())),
            DataSpecifier::Service { id, role } => {
                let request = SUBJECT_PORT_OFFSET - 2 - id.get() * 2;
                Ok(PortId::new(match role {
                    Role::Request => request,
                    Role::Response => request + 1,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::specifier::{ServiceId, SubjectId};

    use super::*;

    fn port(specifier: DataSpecifier) -> u16 {
        UdpPortMap.map(specifier).expect("total mapping").get()
    }

    #[test]
    fn test_subject_boundaries() {
        assert_eq!(port(DataSpecifier::subject(0).expect("valid")), 16384);
        assert_eq!(
            port(DataSpecifier::subject(SubjectId::MAX).expect("valid")),
            32767
        );
    }

    #[test]
    fn test_service_boundaries() {
        assert_eq!(
            port(DataSpecifier::service(0, Role::Request).expect("valid")),
            16382
        );
        assert_eq!(
            port(DataSpecifier::service(0, Role::Response).expect("valid")),
            16383
        );
        assert_eq!(
            port(DataSpecifier::service(ServiceId::MAX, Role::Request).expect("valid")),
            15360
        );
        assert_eq!(
            port(DataSpecifier::service(ServiceId::MAX, Role::Response).expect("valid")),
            15361
        );
    }

    #[test]
    fn test_request_ports_even_response_ports_adjacent() {
        for id in [0u16, 1, 17, 255, ServiceId::MAX] {
            let request = port(DataSpecifier::service(id, Role::Request).expect("valid"));
            let response = port(DataSpecifier::service(id, Role::Response).expect("valid"));
            assert_eq!(request % 2, 0, "request port for service {id} must be even");
            assert_eq!(response, request + 1);
        }
    }

    #[test]
    fn test_determinism() {
        let specifier = DataSpecifier::service(99, Role::Response).expect("valid");
        assert_eq!(port(specifier), port(specifier));
    }
}
