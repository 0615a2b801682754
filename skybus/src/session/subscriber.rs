//! Subscriber: bounded, drop-oldest stream of typed messages.

use std::cell::Cell;
use std::rc::Rc;

use skybus_core::{DataSpecifier, MessageCodec, MessageSchema, SubjectId};

use crate::error::SessionError;
use crate::transport::{Transport, TransportInput};

use super::queue::NotifiedQueue;
use super::MessageMetadata;

/// Receives messages of type `M` from one subject.
///
/// A background pump moves transport deliveries into a bounded queue, so a
/// slow consumer never blocks the transport's receive path: when the queue
/// is full the oldest undelivered item is dropped. Malformed payloads are
/// logged and skipped without disturbing the stream.
///
/// Items are delivered in transport order, each paired with its
/// [`MessageMetadata`].
pub struct Subscriber<M: MessageSchema, T: Transport, C: MessageCodec> {
    specifier: DataSpecifier,
    input: Rc<T::Input>,
    queue: Rc<NotifiedQueue<(M, MessageMetadata)>>,
    decode_failures: Rc<Cell<u64>>,
    closed: Cell<bool>,
    _codec: std::marker::PhantomData<C>,
}

impl<M, T, C> Subscriber<M, T, C>
where
    M: MessageSchema,
    T: Transport,
    C: MessageCodec,
{
    /// Open a subscriber on the given subject.
    ///
    /// `queue_capacity` bounds the number of undelivered items buffered for
    /// the consumer; it must be non-zero.
    ///
    /// Must be called within a `tokio` local task context: the receive pump
    /// runs as a `spawn_local` task until the subscriber or its transport
    /// is closed.
    ///
    /// # Errors
    ///
    /// Fails if the subject cannot be mapped or the transport refuses to
    /// open the input.
    pub fn open(
        transport: &T,
        subject_id: SubjectId,
        queue_capacity: usize,
        codec: C,
    ) -> Result<Self, SessionError> {
        let specifier = DataSpecifier::Subject(subject_id);
        let port = transport.mapper().map(specifier)?;
        let input = transport.open_input(port)?;
        let queue = Rc::new(NotifiedQueue::bounded(queue_capacity));
        let decode_failures = Rc::new(Cell::new(0));

        tokio::task::spawn_local(pump(
            specifier,
            input.clone(),
            queue.clone(),
            codec,
            decode_failures.clone(),
        ));

        Ok(Self {
            specifier,
            input,
            queue,
            decode_failures,
            closed: Cell::new(false),
            _codec: std::marker::PhantomData,
        })
    }

    /// Wait for the next message.
    ///
    /// Resolves to `None` once the subscriber is closed and the buffered
    /// items are drained.
    pub async fn receive(&self) -> Option<(M, MessageMetadata)> {
        self.queue.recv().await
    }

    /// Take the next buffered message without suspending.
    pub fn try_receive(&self) -> Option<(M, MessageMetadata)> {
        self.queue.try_recv()
    }

    /// The data specifier this subscriber is bound to.
    pub fn specifier(&self) -> DataSpecifier {
        self.specifier
    }

    /// The configured queue capacity.
    pub fn queue_capacity(&self) -> usize {
        // Bounded at construction, so the capacity is always present.
        self.queue.capacity().unwrap_or(usize::MAX)
    }

    /// Number of buffered items dropped because the queue overflowed.
    pub fn items_dropped(&self) -> u64 {
        self.queue.items_displaced()
    }

    /// Number of payloads discarded because they failed to decode.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.get()
    }

    /// Close the subscriber: delivery stops and the queue is released.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!(specifier = %self.specifier, "subscriber closed twice");
            return Err(SessionError::AlreadyClosed);
        }
        self.input.close();
        self.queue.close();
        Ok(())
    }
}

/// Receive pump: transport input → typed bounded queue.
async fn pump<M, I, C>(
    specifier: DataSpecifier,
    input: Rc<I>,
    queue: Rc<NotifiedQueue<(M, MessageMetadata)>>,
    codec: C,
    decode_failures: Rc<Cell<u64>>,
) where
    M: MessageSchema,
    I: TransportInput,
    C: MessageCodec,
{
    loop {
        let delivery = match input.receive().await {
            Ok(delivery) => delivery,
            // The input was severed (endpoint or transport closed).
            Err(_) => break,
        };

        let message: M = match codec.decode(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                decode_failures.set(decode_failures.get() + 1);
                tracing::warn!(
                    specifier = %specifier,
                    error = %e,
                    "dropping malformed message payload"
                );
                continue;
            }
        };

        let metadata = MessageMetadata {
            source_node_id: delivery.source_node_id,
            timestamp: delivery.timestamp,
        };
        if queue.push((message, metadata)).is_some() {
            if queue.is_closed() {
                break;
            }
            tracing::debug!(
                specifier = %specifier,
                "subscription queue full, dropped oldest item"
            );
        }
    }
    queue.close();
}
