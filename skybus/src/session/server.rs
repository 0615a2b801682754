//! Server: concurrent handler dispatch for one service.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tokio::sync::Notify;

use skybus_core::{DataSpecifier, MessageCodec, NodeId, Role, ServiceId, ServiceSchema};

use crate::error::SessionError;
use crate::transport::{Transport, TransportInput, TransportOutput};

use super::{RequestMetadata, TransferEnvelope, TransferId};

/// Serves requests for one service.
///
/// [`serve`](Server::serve) registers the handler and starts the dispatch
/// task; from that moment the server runs autonomously until
/// [`close`](Server::close). Each request is handled on its own task, so a
/// slow handler never stalls receipt of the next request. A handler that
/// returns `Ok` produces a response enveloped with the request's
/// transfer-id and sent back to the requesting node; a handler that fails
/// produces no response at all — the client times out and decides what to
/// do. Applications that want structured failure reporting model it in the
/// response payload type.
pub struct Server<S: ServiceSchema, T: Transport, C: MessageCodec> {
    specifier: DataSpecifier,
    input: Rc<T::Input>,
    output: Rc<T::Output>,
    codec: C,
    dispatch: RefCell<Option<tokio::task::JoinHandle<()>>>,
    in_flight: Rc<Cell<usize>>,
    drained: Rc<Notify>,
    closed: Cell<bool>,
    _service: std::marker::PhantomData<S>,
}

impl<S, T, C> Server<S, T, C>
where
    S: ServiceSchema,
    T: Transport,
    C: MessageCodec,
{
    /// Open a server for the given service.
    ///
    /// The server owns the request input and response output from here on,
    /// but stays idle until [`serve`](Server::serve) registers a handler.
    ///
    /// # Errors
    ///
    /// Fails if either role of the service cannot be mapped or the
    /// transport refuses to open the endpoints.
    pub fn open(transport: &T, service_id: ServiceId, codec: C) -> Result<Self, SessionError> {
        let specifier = DataSpecifier::Service {
            id: service_id,
            role: Role::Request,
        };
        let response_specifier = DataSpecifier::Service {
            id: service_id,
            role: Role::Response,
        };
        let input = transport.open_input(transport.mapper().map(specifier)?)?;
        let output = transport.open_output(transport.mapper().map(response_specifier)?)?;

        Ok(Self {
            specifier,
            input,
            output,
            codec,
            dispatch: RefCell::new(None),
            in_flight: Rc::new(Cell::new(0)),
            drained: Rc::new(Notify::new()),
            closed: Cell::new(false),
            _service: std::marker::PhantomData,
        })
    }

    /// Register the handler and start serving in the background.
    ///
    /// Must be called within a `tokio` local task context. The handler is
    /// invoked once per well-formed request; invocations run concurrently
    /// on their own tasks.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyServing`] if a handler is already
    /// registered, or [`SessionError::AlreadyClosed`] after close.
    pub fn serve<F, Fut, E>(&self, handler: F) -> Result<(), SessionError>
    where
        F: FnMut(S::Request, RequestMetadata) -> Fut + 'static,
        Fut: Future<Output = Result<S::Response, E>> + 'static,
        E: fmt::Display + 'static,
    {
        if self.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        let mut dispatch = self.dispatch.borrow_mut();
        if dispatch.is_some() {
            return Err(SessionError::AlreadyServing);
        }
        *dispatch = Some(tokio::task::spawn_local(dispatch_loop::<S, T::Input, T::Output, C, F, Fut, E>(
            self.specifier,
            self.input.clone(),
            self.output.clone(),
            self.codec.clone(),
            handler,
            self.in_flight.clone(),
            self.drained.clone(),
        )));
        Ok(())
    }

    /// The request-role data specifier this server is bound to.
    pub fn specifier(&self) -> DataSpecifier {
        self.specifier
    }

    /// Number of handler invocations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Close the server gracefully.
    ///
    /// After this returns, no further handler invocations will begin.
    /// Invocations already in progress are not interrupted; close waits
    /// for them to finish and their responses are still sent.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!(specifier = %self.specifier, "server closed twice");
            return Err(SessionError::AlreadyClosed);
        }

        // Stop admitting requests, then wait for the dispatch loop to
        // observe the severed input.
        self.input.close();
        let dispatch = self.dispatch.borrow_mut().take();
        if let Some(dispatch) = dispatch {
            if dispatch.await.is_err() {
                tracing::error!(specifier = %self.specifier, "server dispatch task panicked");
            }
        }

        // Drain handler invocations still in flight.
        while self.in_flight.get() > 0 {
            self.drained.notified().await;
        }

        self.output.close();
        Ok(())
    }
}

/// Dispatch loop: one iteration per incoming request.
#[allow(clippy::too_many_arguments)]
async fn dispatch_loop<S, I, O, C, F, Fut, E>(
    specifier: DataSpecifier,
    input: Rc<I>,
    output: Rc<O>,
    codec: C,
    mut handler: F,
    in_flight: Rc<Cell<usize>>,
    drained: Rc<Notify>,
) where
    S: ServiceSchema,
    I: TransportInput,
    O: TransportOutput + 'static,
    C: MessageCodec,
    F: FnMut(S::Request, RequestMetadata) -> Fut + 'static,
    Fut: Future<Output = Result<S::Response, E>> + 'static,
    E: fmt::Display + 'static,
{
    loop {
        let delivery = match input.receive().await {
            Ok(delivery) => delivery,
            Err(_) => break,
        };

        let Some(client_node_id) = delivery.source_node_id else {
            tracing::warn!(
                specifier = %specifier,
                "dropping request from anonymous node, no response address"
            );
            continue;
        };

        let envelope: TransferEnvelope<S::Request> = match codec.decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    specifier = %specifier,
                    error = %e,
                    "dropping malformed request payload"
                );
                continue;
            }
        };

        let metadata = RequestMetadata {
            client_node_id,
            timestamp: delivery.timestamp,
            transfer_id: envelope.transfer_id,
        };
        let invocation = handler(envelope.value, metadata);

        in_flight.set(in_flight.get() + 1);
        tokio::task::spawn_local(respond::<S, O, C, Fut, E>(
            specifier,
            invocation,
            output.clone(),
            codec.clone(),
            client_node_id,
            envelope.transfer_id,
            in_flight.clone(),
            drained.clone(),
        ));
    }
}

/// Runs one handler invocation to completion and sends the response.
#[allow(clippy::too_many_arguments)]
async fn respond<S, O, C, Fut, E>(
    specifier: DataSpecifier,
    invocation: Fut,
    output: Rc<O>,
    codec: C,
    client_node_id: NodeId,
    transfer_id: TransferId,
    in_flight: Rc<Cell<usize>>,
    drained: Rc<Notify>,
) where
    S: ServiceSchema,
    O: TransportOutput,
    C: MessageCodec,
    Fut: Future<Output = Result<S::Response, E>>,
    E: fmt::Display,
{
    match invocation.await {
        Ok(response) => {
            let envelope = TransferEnvelope {
                transfer_id,
                value: &response,
            };
            match codec.encode(&envelope) {
                Ok(payload) => {
                    if let Err(e) = output.send(&payload, Some(client_node_id)).await {
                        tracing::warn!(
                            specifier = %specifier,
                            client = %client_node_id,
                            error = %e,
                            "failed to send response"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        specifier = %specifier,
                        error = %e,
                        "failed to serialize response"
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                specifier = %specifier,
                client = %client_node_id,
                transfer_id,
                error = %e,
                "handler failed, request dropped without response"
            );
        }
    }

    in_flight.set(in_flight.get() - 1);
    if in_flight.get() == 0 {
        drained.notify_one();
    }
}
