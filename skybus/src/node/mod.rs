//! Top-level node composition.
//!
//! A [`Node`] owns exactly one transport and wires up the two functions
//! every conformant node must provide: the periodic heartbeat broadcast
//! and the node-info query responder. Both are operational before the
//! constructor returns — a node is never observably half-initialized.
//!
//! Application endpoints are created through the factory methods, either
//! with explicit identifiers or with the fixed identifiers declared by the
//! data type's schema.

mod heartbeat;

pub use heartbeat::HeartbeatPublisher;

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use skybus_core::{
    JsonCodec, MessageCodec, MessageSchema, NodeId, ServiceId, ServiceSchema, SubjectId,
};

use crate::error::SessionError;
use crate::session::{Client, Publisher, Server, Subscriber};
use crate::standard::{GetNodeInfo, NodeInfo};
use crate::transport::Transport;

/// Node-level configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Interval between heartbeat emissions.
    pub heartbeat_period: Duration,

    /// Queue capacity used by subscribers created without an explicit one.
    pub subscription_queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(1),
            subscription_queue_capacity: 64,
        }
    }
}

/// A protocol node: one transport plus the mandatory node functions.
///
/// The node owns its transport exclusively; closing the node closes the
/// transport. Endpoints created through the factories are owned by the
/// caller and should be closed before the node.
pub struct Node<T: Transport, C: MessageCodec> {
    transport: Rc<T>,
    info: Rc<NodeInfo>,
    codec: C,
    config: NodeConfig,
    heartbeat: HeartbeatPublisher<T, C>,
    info_server: Server<GetNodeInfo, T, C>,
    closed: Cell<bool>,
}

impl<T> Node<T, JsonCodec>
where
    T: Transport + 'static,
{
    /// Create a node with the default codec and configuration.
    ///
    /// # Errors
    ///
    /// Fails if the heartbeat publisher or the info server cannot be
    /// stood up; nothing stays half-open on failure.
    pub fn with_defaults(transport: T, info: NodeInfo) -> Result<Self, SessionError> {
        Self::new(transport, info, JsonCodec, NodeConfig::default())
    }
}

impl<T, C> Node<T, C>
where
    T: Transport + 'static,
    C: MessageCodec,
{
    /// Create a node owning `transport`.
    ///
    /// Must be called within a `tokio` local task context: the heartbeat
    /// emitter and the info server run as background tasks from here on.
    /// `info` is immutable for the node's lifetime and served verbatim on
    /// every node-info request.
    ///
    /// # Errors
    ///
    /// Fails if the heartbeat publisher or the info server cannot be
    /// stood up. A failure after the heartbeat started tears it down
    /// again, so the constructor either returns a fully functional node
    /// or leaves nothing behind.
    pub fn new(
        transport: T,
        info: NodeInfo,
        codec: C,
        config: NodeConfig,
    ) -> Result<Self, SessionError> {
        let transport = Rc::new(transport);
        let info = Rc::new(info);

        let heartbeat =
            HeartbeatPublisher::start(&*transport, codec.clone(), config.heartbeat_period)?;

        let info_server = match Self::start_info_server(&transport, &info, codec.clone()) {
            Ok(server) => server,
            Err(e) => {
                let _ = heartbeat.close();
                return Err(e);
            }
        };

        Ok(Self {
            transport,
            info,
            codec,
            config,
            heartbeat,
            info_server,
            closed: Cell::new(false),
        })
    }

    fn start_info_server(
        transport: &Rc<T>,
        info: &Rc<NodeInfo>,
        codec: C,
    ) -> Result<Server<GetNodeInfo, T, C>, SessionError> {
        let service_id = fixed_service_id::<GetNodeInfo>()?;
        let server = Server::open(&**transport, service_id, codec)?;

        // The info structure is immutable and behind an Rc, so concurrent
        // requests read it without any synchronization.
        let info = info.clone();
        server.serve(move |_request, metadata| {
            tracing::debug!(client = %metadata.client_node_id, "answering node-info request");
            let info = info.as_ref().clone();
            async move { Ok::<NodeInfo, Infallible>(info) }
        })?;
        Ok(server)
    }

    /// The node's immutable info structure.
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// The transport this node owns.
    ///
    /// The node manages the transport's lifecycle; callers should not
    /// close it directly.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The heartbeat publisher of this node.
    pub fn heartbeat(&self) -> &HeartbeatPublisher<T, C> {
        &self.heartbeat
    }

    /// The local node identifier, or `None` while anonymous.
    pub fn local_node_id(&self) -> Option<NodeId> {
        self.transport.local_node_id()
    }

    /// Assign the local node identifier; it can be set exactly once.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NodeIdAlreadySet`] on a second call,
    /// leaving the first value intact.
    pub fn set_local_node_id(&self, node_id: NodeId) -> Result<(), SessionError> {
        self.transport.set_local_node_id(node_id)
    }

    /// Create a publisher on an explicit subject.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range identifier or a transport refusal.
    pub fn make_publisher<M: MessageSchema>(
        &self,
        subject_id: u16,
    ) -> Result<Publisher<M, T, C>, SessionError> {
        self.ensure_open()?;
        Publisher::open(
            &*self.transport,
            SubjectId::new(subject_id)?,
            self.codec.clone(),
        )
    }

    /// Create a publisher on the subject the message type declares.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NoFixedPort`] if `M` declares no fixed
    /// subject.
    pub fn make_publisher_with_fixed_subject_id<M: MessageSchema>(
        &self,
    ) -> Result<Publisher<M, T, C>, SessionError> {
        self.make_publisher(fixed_subject_id::<M>()?.get())
    }

    /// Create a subscriber on an explicit subject.
    ///
    /// `queue_capacity` of `None` uses the node's configured default.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range identifier or a transport refusal.
    pub fn make_subscriber<M: MessageSchema>(
        &self,
        subject_id: u16,
        queue_capacity: Option<usize>,
    ) -> Result<Subscriber<M, T, C>, SessionError> {
        self.ensure_open()?;
        Subscriber::open(
            &*self.transport,
            SubjectId::new(subject_id)?,
            queue_capacity.unwrap_or(self.config.subscription_queue_capacity),
            self.codec.clone(),
        )
    }

    /// Create a subscriber on the subject the message type declares.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NoFixedPort`] if `M` declares no fixed
    /// subject.
    pub fn make_subscriber_with_fixed_subject_id<M: MessageSchema>(
        &self,
        queue_capacity: Option<usize>,
    ) -> Result<Subscriber<M, T, C>, SessionError> {
        self.make_subscriber(fixed_subject_id::<M>()?.get(), queue_capacity)
    }

    /// Create a client for an explicit service, targeting `server_node_id`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range identifier or a transport refusal.
    pub fn make_client<S: ServiceSchema>(
        &self,
        service_id: u16,
        server_node_id: NodeId,
    ) -> Result<Client<S, T, C>, SessionError> {
        self.ensure_open()?;
        Client::open(
            &*self.transport,
            ServiceId::new(service_id)?,
            server_node_id,
            self.codec.clone(),
        )
    }

    /// Create a client for the service the type declares.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NoFixedPort`] if `S` declares no fixed
    /// service.
    pub fn make_client_with_fixed_service_id<S: ServiceSchema>(
        &self,
        server_node_id: NodeId,
    ) -> Result<Client<S, T, C>, SessionError> {
        self.make_client(fixed_service_id::<S>()?.get(), server_node_id)
    }

    /// Create a server for an explicit service.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range identifier or a transport refusal.
    pub fn make_server<S: ServiceSchema>(
        &self,
        service_id: u16,
    ) -> Result<Server<S, T, C>, SessionError> {
        self.ensure_open()?;
        Server::open(
            &*self.transport,
            ServiceId::new(service_id)?,
            self.codec.clone(),
        )
    }

    /// Create a server for the service the type declares.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NoFixedPort`] if `S` declares no fixed
    /// service.
    pub fn make_server_with_fixed_service_id<S: ServiceSchema>(
        &self,
    ) -> Result<Server<S, T, C>, SessionError> {
        self.make_server(fixed_service_id::<S>()?.get())
    }

    /// Close the node: heartbeat first, then the info server, then the
    /// transport.
    ///
    /// Every sub-resource's close is attempted even if an earlier one
    /// fails; the first failure is reported. In particular the transport
    /// close always runs.
    ///
    /// # Errors
    ///
    /// Fails with the first close error encountered, or
    /// [`SessionError::AlreadyClosed`] if the node is already closed.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!("node closed twice");
            return Err(SessionError::AlreadyClosed);
        }

        let mut first_failure = None;
        if let Err(e) = self.heartbeat.close() {
            first_failure.get_or_insert(e);
        }
        if let Err(e) = self.info_server.close().await {
            first_failure.get_or_insert(e);
        }
        if let Err(e) = self.transport.close() {
            first_failure.get_or_insert(e);
        }

        match first_failure {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        Ok(())
    }
}

/// Read a schema's fixed subject, validating the range.
fn fixed_subject_id<M: MessageSchema>() -> Result<SubjectId, SessionError> {
    let id = M::FIXED_SUBJECT_ID.ok_or(SessionError::NoFixedPort { type_name: M::NAME })?;
    Ok(SubjectId::new(id)?)
}

/// Read a schema's fixed service, validating the range.
fn fixed_service_id<S: ServiceSchema>() -> Result<ServiceId, SessionError> {
    let id = S::FIXED_SERVICE_ID.ok_or(SessionError::NoFixedPort { type_name: S::NAME })?;
    Ok(ServiceId::new(id)?)
}
