//! Publisher: best-effort typed broadcast on one subject.

use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

use skybus_core::{DataSpecifier, MessageCodec, MessageSchema, SubjectId};

use crate::error::SessionError;
use crate::transport::{Transport, TransportOutput};

/// Sends messages of type `M` on one subject.
///
/// A publisher is stateless beyond its open transport output: `publish`
/// encodes the message and hands it to the transport, with no
/// acknowledgement or delivery guarantee.
pub struct Publisher<M: MessageSchema, T: Transport, C: MessageCodec> {
    specifier: DataSpecifier,
    output: Rc<T::Output>,
    codec: C,
    closed: Cell<bool>,
    _message: PhantomData<M>,
}

impl<M, T, C> Publisher<M, T, C>
where
    M: MessageSchema,
    T: Transport,
    C: MessageCodec,
{
    /// Open a publisher on the given subject.
    ///
    /// # Errors
    ///
    /// Fails if the subject cannot be mapped or the transport refuses to
    /// open the output.
    pub fn open(transport: &T, subject_id: SubjectId, codec: C) -> Result<Self, SessionError> {
        let specifier = DataSpecifier::Subject(subject_id);
        let port = transport.mapper().map(specifier)?;
        let output = transport.open_output(port)?;
        Ok(Self {
            specifier,
            output,
            codec,
            closed: Cell::new(false),
            _message: PhantomData,
        })
    }

    /// Broadcast one message.
    ///
    /// # Errors
    ///
    /// Propagates encoding and transport failures to the caller; a failed
    /// publish does not close the publisher.
    pub async fn publish(&self, message: &M) -> Result<(), SessionError> {
        if self.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        let payload = self.codec.encode(message)?;
        self.output.send(&payload, None).await
    }

    /// The data specifier this publisher is bound to.
    pub fn specifier(&self) -> DataSpecifier {
        self.specifier
    }

    /// Close the publisher, releasing its transport output.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!(specifier = %self.specifier, "publisher closed twice");
            return Err(SessionError::AlreadyClosed);
        }
        self.output.close();
        Ok(())
    }
}

impl<M, T, C> std::fmt::Debug for Publisher<M, T, C>
where
    M: MessageSchema,
    T: Transport,
    C: MessageCodec,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("specifier", &self.specifier)
            .field("closed", &self.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use skybus_core::JsonCodec;

    use crate::message_types;
    use crate::transport::loopback::LoopbackBus;
    use crate::transport::TransportInput;

    use super::*;

    message_types! {
        /// Test message.
        pub struct Temperature {
            /// Degrees.
            pub celsius: i32,
        }
    }

    fn subject(id: u16) -> SubjectId {
        SubjectId::new(id).expect("valid subject-id")
    }

    #[tokio::test]
    async fn test_publish_reaches_transport() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();

        let publisher: Publisher<Temperature, _, _> =
            Publisher::open(&transport, subject(300), JsonCodec).expect("open publisher");

        let port = transport
            .mapper()
            .map(publisher.specifier())
            .expect("mappable");
        let input = transport.open_input(port).expect("open input");

        publisher
            .publish(&Temperature { celsius: 21 })
            .await
            .expect("publish");

        let delivery = input.receive().await.expect("receive");
        let decoded: Temperature = serde_json::from_slice(&delivery.payload).expect("decode");
        assert_eq!(decoded, Temperature { celsius: 21 });
    }

    #[tokio::test]
    async fn test_publish_after_close_fails_loudly() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        let publisher: Publisher<Temperature, _, _> =
            Publisher::open(&transport, subject(301), JsonCodec).expect("open publisher");

        publisher.close().expect("first close");
        assert!(matches!(
            publisher.close(),
            Err(SessionError::AlreadyClosed)
        ));
        assert!(matches!(
            publisher.publish(&Temperature { celsius: 0 }).await,
            Err(SessionError::AlreadyClosed)
        ));
    }
}
