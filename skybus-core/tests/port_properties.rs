//! Property tests for the reference port mapping.
//!
//! The mapping contract is global: determinism, strict monotonicity within
//! each variant, request/response adjacency, and disjointness across
//! variants over the full legal identifier ranges.

use proptest::prelude::*;

use skybus_core::{AddressMapper, DataSpecifier, Role, ServiceId, SubjectId, UdpPortMap};

fn subject_port(id: u16) -> u16 {
    UdpPortMap
        .map(DataSpecifier::subject(id).expect("valid subject-id"))
        .expect("total mapping")
        .get()
}

fn service_port(id: u16, role: Role) -> u16 {
    UdpPortMap
        .map(DataSpecifier::service(id, role).expect("valid service-id"))
        .expect("total mapping")
        .get()
}

proptest! {
    #[test]
    fn subject_mapping_is_strictly_increasing(
        a in 0..=SubjectId::MAX,
        b in 0..=SubjectId::MAX,
    ) {
        prop_assume!(a < b);
        prop_assert!(subject_port(a) < subject_port(b));
    }

    #[test]
    fn service_mapping_is_strictly_decreasing(
        a in 0..=ServiceId::MAX,
        b in 0..=ServiceId::MAX,
    ) {
        prop_assume!(a < b);
        prop_assert!(service_port(a, Role::Request) > service_port(b, Role::Request));
        prop_assert!(service_port(a, Role::Response) > service_port(b, Role::Response));
    }

    #[test]
    fn response_port_is_adjacent_to_request_port(id in 0..=ServiceId::MAX) {
        let request = service_port(id, Role::Request);
        prop_assert_eq!(request % 2, 0);
        prop_assert_eq!(service_port(id, Role::Response), request + 1);
    }

    #[test]
    fn subject_and_service_ranges_never_overlap(
        subject_id in 0..=SubjectId::MAX,
        service_id in 0..=ServiceId::MAX,
    ) {
        let subject = subject_port(subject_id);
        let request = service_port(service_id, Role::Request);
        let response = service_port(service_id, Role::Response);

        // Subjects occupy the range at and above the offset; services stay
        // strictly below it, so the two can never collide.
        prop_assert!(subject >= 16384);
        prop_assert!(request < 16384);
        prop_assert!(response < 16384);
    }

    #[test]
    fn mapping_is_injective(
        a in any::<(u16, u8)>(),
        b in any::<(u16, u8)>(),
    ) {
        // Draw two arbitrary legal specifiers and check that distinct
        // specifiers never share a port.
        fn build((raw, kind): (u16, u8)) -> DataSpecifier {
            match kind % 3 {
                0 => DataSpecifier::subject(raw % (SubjectId::MAX + 1)).expect("valid"),
                1 => DataSpecifier::service(raw % (ServiceId::MAX + 1), Role::Request)
                    .expect("valid"),
                _ => DataSpecifier::service(raw % (ServiceId::MAX + 1), Role::Response)
                    .expect("valid"),
            }
        }

        let (da, db) = (build(a), build(b));
        prop_assume!(da != db);

        let pa = UdpPortMap.map(da).expect("total mapping");
        let pb = UdpPortMap.map(db).expect("total mapping");
        prop_assert_ne!(pa, pb, "specifiers {} and {} collided", da, db);
    }

    #[test]
    fn mapped_ports_stay_in_reserved_range(
        a in any::<(u16, u8)>(),
    ) {
        fn build((raw, kind): (u16, u8)) -> DataSpecifier {
            match kind % 3 {
                0 => DataSpecifier::subject(raw % (SubjectId::MAX + 1)).expect("valid"),
                1 => DataSpecifier::service(raw % (ServiceId::MAX + 1), Role::Request)
                    .expect("valid"),
                _ => DataSpecifier::service(raw % (ServiceId::MAX + 1), Role::Response)
                    .expect("valid"),
            }
        }

        let port = UdpPortMap.map(build(a)).expect("total mapping").get();
        prop_assert!((15360..=32767).contains(&port));
    }
}
