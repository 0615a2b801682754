//! Macros for declaring schema data types.
//!
//! Payload types need serde derives plus a schema descriptor implementation;
//! these macros keep the two in one place so a fixed port identifier is
//! visibly part of the type declaration:
//!
//! ```rust
//! use skybus::{message_types, service_types, MessageSchema, ServiceSchema};
//!
//! message_types! {
//!     /// Air pressure sample, broadcast on a well-known subject.
//!     pub struct Pressure @ 100 {
//!         /// Pascals.
//!         pub pascal: f32,
//!     }
//!
//!     /// Free-form log record with no fixed subject.
//!     pub struct LogRecord {
//!         /// Rendered text.
//!         pub text: String,
//!     }
//! }
//!
//! service_types! {
//!     /// Read a register by name.
//!     pub service ReadRegister @ 385 {
//!         request: LogRecord,
//!         response: Pressure,
//!     }
//! }
//!
//! assert_eq!(Pressure::FIXED_SUBJECT_ID, Some(100));
//! assert_eq!(LogRecord::FIXED_SUBJECT_ID, None);
//! assert_eq!(ReadRegister::FIXED_SERVICE_ID, Some(385));
//! ```

/// Declare broadcast message types.
///
/// Each struct receives `#[derive(Debug, Clone, PartialEq, Serialize,
/// Deserialize)]` and an implementation of
/// [`MessageSchema`](crate::MessageSchema). An optional `@ <subject-id>`
/// after the type name records the fixed subject identifier in the schema
/// descriptor; types without one can only be used with explicit-id
/// factories.
#[macro_export]
macro_rules! message_types {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis struct $name:ident $(@ $subject_id:literal)? {
                $(
                    $(#[$field_meta:meta])*
                    $field_vis:vis $field:ident : $ty:ty
                ),* $(,)?
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
            $vis struct $name {
                $(
                    $(#[$field_meta])*
                    $field_vis $field : $ty,
                )*
            }

            impl $crate::MessageSchema for $name {
                const NAME: &'static str = stringify!($name);
                const FIXED_SUBJECT_ID: Option<u16> =
                    $crate::message_types!(@fixed $($subject_id)?);
            }
        )*
    };
    (@fixed) => { None };
    (@fixed $subject_id:literal) => { Some($subject_id) };
}

/// Declare request/response service types.
///
/// Generates a unit marker struct per service and an implementation of
/// [`ServiceSchema`](crate::ServiceSchema) tying together the request and
/// response payload types. An optional `@ <service-id>` records the fixed
/// service identifier.
#[macro_export]
macro_rules! service_types {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis service $name:ident $(@ $service_id:literal)? {
                request: $request:ty,
                response: $response:ty $(,)?
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            $vis struct $name;

            impl $crate::ServiceSchema for $name {
                type Request = $request;
                type Response = $response;
                const NAME: &'static str = stringify!($name);
                const FIXED_SERVICE_ID: Option<u16> =
                    $crate::service_types!(@fixed $($service_id)?);
            }
        )*
    };
    (@fixed) => { None };
    (@fixed $service_id:literal) => { Some($service_id) };
}

#[cfg(test)]
mod tests {
    use crate::{MessageSchema, ServiceSchema};

    message_types! {
        /// Plain sample with a fixed subject.
        pub struct Sample @ 1234 {
            /// Payload value.
            pub value: i64,
        }

        /// Sample without a fixed subject.
        pub struct FloatingSample {
            /// Payload value.
            pub value: i64,
        }

        /// Empty request payload.
        pub struct Probe {}
    }

    service_types! {
        /// Service with a fixed identifier.
        pub service Measure @ 77 {
            request: Probe,
            response: Sample,
        }

        /// Service without a fixed identifier.
        pub service Calibrate {
            request: Probe,
            response: Sample,
        }
    }

    #[test]
    fn test_fixed_subject_id_is_recorded() {
        assert_eq!(Sample::FIXED_SUBJECT_ID, Some(1234));
        assert_eq!(Sample::NAME, "Sample");
        assert_eq!(FloatingSample::FIXED_SUBJECT_ID, None);
    }

    #[test]
    fn test_fixed_service_id_is_recorded() {
        assert_eq!(Measure::FIXED_SERVICE_ID, Some(77));
        assert_eq!(Calibrate::FIXED_SERVICE_ID, None);
        assert_eq!(Measure::NAME, "Measure");
    }

    #[test]
    fn test_generated_types_serialize() {
        let sample = Sample { value: -3 };
        let bytes = serde_json::to_vec(&sample).expect("serialize");
        let decoded: Sample = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(decoded, sample);
    }
}
