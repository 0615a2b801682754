//! In-process loopback transport.
//!
//! All attachments of one [`LoopbackBus`] see each other's traffic through
//! shared memory: broadcast payloads reach every input open on the port
//! (including inputs of the sending node — loopback semantics), unicast
//! payloads reach only inputs whose transport carries the destination
//! node-id at delivery time.
//!
//! The loopback transport exists for tests, examples and single-process
//! deployments; it implements the full transport contract, including the
//! set-once node-id and loud double-close.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::SystemTime;

use async_trait::async_trait;
use skybus_core::{AddressMapper, NodeId, PortId, UdpPortMap};

use crate::error::SessionError;
use crate::session::NotifiedQueue;

use super::{Delivery, Transport, TransportInput, TransportOutput};

/// In-memory hub connecting any number of [`LoopbackTransport`]s.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    inner: Rc<RefCell<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    routes: HashMap<PortId, Vec<Route>>,
}

/// One registered input: who owns it and where its payloads go.
struct Route {
    owner: Rc<AttachmentState>,
    queue: Rc<NotifiedQueue<Delivery>>,
}

/// Per-attachment state shared by the transport and its outputs.
struct AttachmentState {
    node_id: RefCell<Option<NodeId>>,
    closed: Cell<bool>,
}

impl LoopbackBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new transport to the bus.
    pub fn attach(&self) -> LoopbackTransport {
        LoopbackTransport {
            bus: self.inner.clone(),
            state: Rc::new(AttachmentState {
                node_id: RefCell::new(None),
                closed: Cell::new(false),
            }),
            mapper: UdpPortMap,
        }
    }
}

/// One node's attachment to a [`LoopbackBus`].
pub struct LoopbackTransport {
    bus: Rc<RefCell<BusInner>>,
    state: Rc<AttachmentState>,
    mapper: UdpPortMap,
}

impl LoopbackTransport {
    /// Whether this attachment has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }
}

impl Transport for LoopbackTransport {
    type Input = LoopbackInput;
    type Output = LoopbackOutput;

    fn mapper(&self) -> &dyn AddressMapper {
        &self.mapper
    }

    fn open_input(&self, port: PortId) -> Result<Rc<Self::Input>, SessionError> {
        if self.state.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        let queue = Rc::new(NotifiedQueue::unbounded());
        self.bus
            .borrow_mut()
            .routes
            .entry(port)
            .or_default()
            .push(Route {
                owner: self.state.clone(),
                queue: queue.clone(),
            });
        Ok(Rc::new(LoopbackInput {
            bus: self.bus.clone(),
            port,
            queue,
        }))
    }

    fn open_output(&self, port: PortId) -> Result<Rc<Self::Output>, SessionError> {
        if self.state.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        Ok(Rc::new(LoopbackOutput {
            bus: self.bus.clone(),
            state: self.state.clone(),
            port,
            closed: Cell::new(false),
        }))
    }

    fn local_node_id(&self) -> Option<NodeId> {
        *self.state.node_id.borrow()
    }

    fn set_local_node_id(&self, node_id: NodeId) -> Result<(), SessionError> {
        if self.state.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }
        let mut current = self.state.node_id.borrow_mut();
        if let Some(current) = *current {
            return Err(SessionError::NodeIdAlreadySet { current });
        }
        *current = Some(node_id);
        Ok(())
    }

    fn close(&self) -> Result<(), SessionError> {
        if self.state.closed.get() {
            tracing::warn!("loopback transport closed twice");
            return Err(SessionError::AlreadyClosed);
        }
        self.state.closed.set(true);

        // Sever every input this attachment still has open so their
        // receive loops observe the close.
        let mut bus = self.bus.borrow_mut();
        for routes in bus.routes.values_mut() {
            routes.retain(|route| {
                if Rc::ptr_eq(&route.owner, &self.state) {
                    route.queue.close();
                    false
                } else {
                    true
                }
            });
        }
        bus.routes.retain(|_, routes| !routes.is_empty());
        Ok(())
    }
}

/// Receiving side of one port on a loopback attachment.
pub struct LoopbackInput {
    bus: Rc<RefCell<BusInner>>,
    port: PortId,
    queue: Rc<NotifiedQueue<Delivery>>,
}

#[async_trait(?Send)]
impl TransportInput for LoopbackInput {
    fn port(&self) -> PortId {
        self.port
    }

    async fn receive(&self) -> Result<Delivery, SessionError> {
        self.queue.recv().await.ok_or(SessionError::SessionClosed)
    }

    fn close(&self) {
        let mut bus = self.bus.borrow_mut();
        if let Some(routes) = bus.routes.get_mut(&self.port) {
            routes.retain(|route| !Rc::ptr_eq(&route.queue, &self.queue));
            if routes.is_empty() {
                bus.routes.remove(&self.port);
            }
        }
        self.queue.close();
    }
}

/// Sending side of one port on a loopback attachment.
pub struct LoopbackOutput {
    bus: Rc<RefCell<BusInner>>,
    state: Rc<AttachmentState>,
    port: PortId,
    closed: Cell<bool>,
}

#[async_trait(?Send)]
impl TransportOutput for LoopbackOutput {
    fn port(&self) -> PortId {
        self.port
    }

    async fn send(&self, payload: &[u8], destination: Option<NodeId>) -> Result<(), SessionError> {
        if self.closed.get() || self.state.closed.get() {
            return Err(SessionError::AlreadyClosed);
        }

        let source_node_id = *self.state.node_id.borrow();
        let targets: Vec<Rc<NotifiedQueue<Delivery>>> = {
            let bus = self.bus.borrow();
            match bus.routes.get(&self.port) {
                None => Vec::new(),
                Some(routes) => routes
                    .iter()
                    .filter(|route| !route.owner.closed.get())
                    .filter(|route| match destination {
                        None => true,
                        Some(node_id) => *route.owner.node_id.borrow() == Some(node_id),
                    })
                    .map(|route| route.queue.clone())
                    .collect(),
            }
        };

        let timestamp = SystemTime::now();
        for queue in targets {
            queue.push(Delivery {
                payload: payload.to_vec(),
                source_node_id,
                timestamp,
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(n: u16) -> PortId {
        PortId::new(n)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_listener_including_sender() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        let b = bus.attach();
        a.set_local_node_id(NodeId::new(1)).expect("first set");
        b.set_local_node_id(NodeId::new(2)).expect("first set");

        let input_a = a.open_input(port(20000)).expect("open input");
        let input_b = b.open_input(port(20000)).expect("open input");
        let output = a.open_output(port(20000)).expect("open output");

        output.send(b"hello", None).await.expect("send");

        let got_a = input_a.receive().await.expect("receive");
        let got_b = input_b.receive().await.expect("receive");
        assert_eq!(got_a.payload, b"hello");
        assert_eq!(got_b.payload, b"hello");
        assert_eq!(got_a.source_node_id, Some(NodeId::new(1)));
        assert_eq!(got_b.source_node_id, Some(NodeId::new(1)));
    }

    #[tokio::test]
    async fn test_unicast_skips_other_nodes() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        let b = bus.attach();
        let c = bus.attach();
        a.set_local_node_id(NodeId::new(1)).expect("first set");
        b.set_local_node_id(NodeId::new(2)).expect("first set");
        c.set_local_node_id(NodeId::new(3)).expect("first set");

        let input_b = b.open_input(port(16000)).expect("open input");
        let input_c = c.open_input(port(16000)).expect("open input");
        let output = a.open_output(port(16000)).expect("open output");

        output
            .send(b"direct", Some(NodeId::new(2)))
            .await
            .expect("send");

        assert_eq!(input_b.receive().await.expect("receive").payload, b"direct");
        assert!(input_c.queue.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_sender_has_no_source() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        let b = bus.attach();
        b.set_local_node_id(NodeId::new(2)).expect("first set");

        let input = b.open_input(port(17000)).expect("open input");
        let output = a.open_output(port(17000)).expect("open output");

        output.send(b"anon", None).await.expect("send");
        assert_eq!(input.receive().await.expect("receive").source_node_id, None);
    }

    #[tokio::test]
    async fn test_send_without_listeners_is_best_effort() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        let output = a.open_output(port(30000)).expect("open output");
        output.send(b"void", None).await.expect("send succeeds");
    }

    #[test]
    fn test_node_id_is_set_once() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        assert_eq!(transport.local_node_id(), None);

        transport.set_local_node_id(NodeId::new(9)).expect("first set");
        let err = transport
            .set_local_node_id(NodeId::new(10))
            .expect_err("second set must fail");
        assert!(matches!(
            err,
            SessionError::NodeIdAlreadySet {
                current
            } if current == NodeId::new(9)
        ));
        // The first value stays intact.
        assert_eq!(transport.local_node_id(), Some(NodeId::new(9)));
    }

    #[tokio::test]
    async fn test_close_severs_open_inputs() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        let input = transport.open_input(port(21000)).expect("open input");

        transport.close().expect("first close");
        let err = input.receive().await.expect_err("severed input");
        assert!(matches!(err, SessionError::SessionClosed));
    }

    #[test]
    fn test_double_close_is_loud() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        transport.close().expect("first close");
        assert!(matches!(
            transport.close(),
            Err(SessionError::AlreadyClosed)
        ));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_closed_output_refuses_to_send() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        let output = transport.open_output(port(18000)).expect("open output");
        output.close();
        assert!(matches!(
            output.send(b"late", None).await,
            Err(SessionError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn test_deliveries_preserve_send_order() {
        let bus = LoopbackBus::new();
        let transport = bus.attach();
        let input = transport.open_input(port(19000)).expect("open input");
        let output = transport.open_output(port(19000)).expect("open output");

        for i in 0..5u8 {
            output.send(&[i], None).await.expect("send");
        }
        for i in 0..5u8 {
            assert_eq!(input.receive().await.expect("receive").payload, vec![i]);
        }
    }
}
