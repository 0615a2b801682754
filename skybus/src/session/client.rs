//! Client: correlated request/response calls against one server node.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use skybus_core::{DataSpecifier, MessageCodec, NodeId, Role, ServiceId, ServiceSchema};

use crate::error::SessionError;
use crate::transport::{Transport, TransportInput, TransportOutput};

use super::{TransferEnvelope, TransferId};

/// Deadline applied to calls unless overridden with
/// [`Client::set_response_timeout`].
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Calls a service on one server node.
///
/// Every call allocates a fresh transfer-id, sends the enveloped request to
/// the server's request port and suspends until the matching response
/// arrives on the response port or the deadline elapses. The pending calls
/// live in an explicit correlation table keyed by transfer-id; a background
/// pump matches incoming responses against it after filtering on the
/// expected source node, so concurrent calls receive their own responses
/// even when the server replies out of order.
pub struct Client<S: ServiceSchema, T: Transport, C: MessageCodec> {
    specifier: DataSpecifier,
    server_node_id: NodeId,
    output: Rc<T::Output>,
    input: Rc<T::Input>,
    codec: C,
    response_timeout: Cell<Duration>,
    next_transfer_id: Cell<TransferId>,
    pending: PendingTable<S::Response>,
    responses_ignored: Rc<Cell<u64>>,
    closed: Cell<bool>,
}

type PendingTable<R> = Rc<RefCell<HashMap<TransferId, Rc<ResponseSlot<R>>>>>;

/// Completion slot for one outstanding call.
struct ResponseSlot<R> {
    outcome: RefCell<Option<Result<R, SessionError>>>,
    waker: RefCell<Option<Waker>>,
}

impl<R> ResponseSlot<R> {
    fn new() -> Self {
        Self {
            outcome: RefCell::new(None),
            waker: RefCell::new(None),
        }
    }

    fn fulfill(&self, outcome: Result<R, SessionError>) {
        *self.outcome.borrow_mut() = Some(outcome);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

/// Future resolving when a call's slot is fulfilled.
struct AwaitResponse<R> {
    slot: Rc<ResponseSlot<R>>,
}

impl<R> Future for AwaitResponse<R> {
    type Output = Result<R, SessionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.slot.outcome.borrow_mut().take() {
            return Poll::Ready(outcome);
        }
        *self.slot.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<S, T, C> Client<S, T, C>
where
    S: ServiceSchema,
    T: Transport,
    C: MessageCodec,
{
    /// Open a client for the given service, targeting `server_node_id`.
    ///
    /// Must be called within a `tokio` local task context: the response
    /// pump runs as a `spawn_local` task until the client is closed.
    ///
    /// # Errors
    ///
    /// Fails if either role of the service cannot be mapped or the
    /// transport refuses to open the endpoints.
    pub fn open(
        transport: &T,
        service_id: ServiceId,
        server_node_id: NodeId,
        codec: C,
    ) -> Result<Self, SessionError> {
        let specifier = DataSpecifier::Service {
            id: service_id,
            role: Role::Request,
        };
        let response_specifier = DataSpecifier::Service {
            id: service_id,
            role: Role::Response,
        };
        let output = transport.open_output(transport.mapper().map(specifier)?)?;
        let input = transport.open_input(transport.mapper().map(response_specifier)?)?;

        let pending: PendingTable<S::Response> = Rc::new(RefCell::new(HashMap::new()));
        let responses_ignored = Rc::new(Cell::new(0));

        tokio::task::spawn_local(pump::<S::Response, T::Input, C>(
            specifier,
            input.clone(),
            pending.clone(),
            codec.clone(),
            server_node_id,
            responses_ignored.clone(),
        ));

        Ok(Self {
            specifier,
            server_node_id,
            output,
            input,
            codec,
            response_timeout: Cell::new(DEFAULT_RESPONSE_TIMEOUT),
            next_transfer_id: Cell::new(next_client_transfer_id_base()),
            pending,
            responses_ignored,
            closed: Cell::new(false),
        })
    }

    /// Send a request and wait for the correlated response.
    ///
    /// The deadline is hard and measured from the send; on expiry the
    /// pending call is removed and [`SessionError::ResponseTimeout`] is
    /// returned. Retrying is left to the application.
    ///
    /// # Errors
    ///
    /// Fails on encode or transport errors, on timeout, or with
    /// [`SessionError::SessionClosed`] if the client is closed while the
    /// call is outstanding.
    pub async fn call(&self, request: &S::Request) -> Result<S::Response, SessionError> {
        if self.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }

        let transfer_id = self.next_transfer_id.get();
        self.next_transfer_id.set(transfer_id.wrapping_add(1));

        let payload = self.codec.encode(&TransferEnvelope {
            transfer_id,
            value: request,
        })?;

        let slot = Rc::new(ResponseSlot::new());
        self.pending.borrow_mut().insert(transfer_id, slot.clone());

        if let Err(e) = self.output.send(&payload, Some(self.server_node_id)).await {
            self.pending.borrow_mut().remove(&transfer_id);
            return Err(e);
        }

        let timeout = self.response_timeout.get();
        match tokio::time::timeout(timeout, AwaitResponse { slot }).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.borrow_mut().remove(&transfer_id);
                Err(SessionError::ResponseTimeout { timeout })
            }
        }
    }

    /// The request-role data specifier this client is bound to.
    pub fn specifier(&self) -> DataSpecifier {
        self.specifier
    }

    /// The server node this client targets.
    pub fn server_node_id(&self) -> NodeId {
        self.server_node_id
    }

    /// The currently configured response deadline.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout.get()
    }

    /// Override the response deadline for subsequent calls.
    pub fn set_response_timeout(&self, timeout: Duration) {
        self.response_timeout.set(timeout);
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Number of received responses that matched no pending call or came
    /// from an unexpected node.
    pub fn responses_ignored(&self) -> u64 {
        self.responses_ignored.get()
    }

    /// Close the client: outstanding calls fail with
    /// [`SessionError::SessionClosed`] and the endpoints are released.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!(specifier = %self.specifier, "client closed twice");
            return Err(SessionError::AlreadyClosed);
        }
        self.input.close();
        self.output.close();
        Ok(())
    }
}

/// Response pump: transport input → correlation table.
async fn pump<R, I, C>(
    specifier: DataSpecifier,
    input: Rc<I>,
    pending: PendingTable<R>,
    codec: C,
    server_node_id: NodeId,
    responses_ignored: Rc<Cell<u64>>,
) where
    R: serde::de::DeserializeOwned + 'static,
    I: TransportInput,
    C: MessageCodec,
{
    loop {
        let delivery = match input.receive().await {
            Ok(delivery) => delivery,
            Err(_) => break,
        };

        if delivery.source_node_id != Some(server_node_id) {
            responses_ignored.set(responses_ignored.get() + 1);
            tracing::debug!(
                specifier = %specifier,
                source = ?delivery.source_node_id,
                "ignoring response from unexpected node"
            );
            continue;
        }

        let envelope: TransferEnvelope<R> = match codec.decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                responses_ignored.set(responses_ignored.get() + 1);
                tracing::warn!(
                    specifier = %specifier,
                    error = %e,
                    "dropping malformed response payload"
                );
                continue;
            }
        };

        let slot = pending.borrow_mut().remove(&envelope.transfer_id);
        match slot {
            Some(slot) => slot.fulfill(Ok(envelope.value)),
            None => {
                responses_ignored.set(responses_ignored.get() + 1);
                tracing::debug!(
                    specifier = %specifier,
                    transfer_id = envelope.transfer_id,
                    "ignoring response that matches no pending call"
                );
            }
        }
    }

    // The input was severed; fail whatever is still outstanding.
    let orphaned: Vec<_> = pending.borrow_mut().drain().collect();
    for (_, slot) in orphaned {
        slot.fulfill(Err(SessionError::SessionClosed));
    }
}

/// Starting transfer-id for a new client.
///
/// Each client gets its own disjoint block so that two clients of the same
/// service on one node cannot observe each other's transfer-ids.
fn next_client_transfer_id_base() -> TransferId {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed) << 32
}
