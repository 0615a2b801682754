//! End-to-end request/response tests over the loopback transport.
//!
//! These exercise the full RPC flow: transfer-id allocation on the client,
//! concurrent handler dispatch on the server, correlation of out-of-order
//! responses, timeout cleanup and graceful close.

use std::rc::Rc;
use std::time::Duration;

use skybus::transport::loopback::{LoopbackBus, LoopbackTransport};
use skybus::transport::{Transport, TransportOutput};
use skybus::{
    message_types, service_types, DataSpecifier, JsonCodec, Node, NodeId, NodeInfo, Role,
    SessionError, TransferEnvelope,
};

message_types! {
    /// Echo request carrying an artificial handler delay.
    pub struct EchoRequest {
        /// Token echoed back verbatim.
        pub token: u32,
        /// How long the handler should pretend to work, in milliseconds.
        pub delay_ms: u64,
    }

    /// Echo response.
    pub struct EchoResponse {
        /// The request's token.
        pub token: u32,
    }
}

service_types! {
    /// Echo service used by the tests.
    pub service Echo @ 200 {
        request: EchoRequest,
        response: EchoResponse,
    }
}

type LoopbackNode = Node<LoopbackTransport, JsonCodec>;

const SERVER_NODE: NodeId = NodeId::new(2);

fn nodes(bus: &LoopbackBus) -> (LoopbackNode, LoopbackNode) {
    let client = Node::with_defaults(bus.attach(), NodeInfo::with_name("org.example.client"))
        .expect("client node");
    let server = Node::with_defaults(bus.attach(), NodeInfo::with_name("org.example.server"))
        .expect("server node");
    client.set_local_node_id(NodeId::new(1)).expect("node-id");
    server.set_local_node_id(SERVER_NODE).expect("node-id");
    (client, server)
}

/// Start an echo server that sleeps for the requested delay.
fn serve_echo(node: &LoopbackNode) -> skybus::Server<Echo, LoopbackTransport, JsonCodec> {
    let server = node.make_server::<Echo>(200).expect("server");
    server
        .serve(|request: EchoRequest, _metadata| async move {
            tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
            Ok::<EchoResponse, SessionError>(EchoResponse {
                token: request.token,
            })
        })
        .expect("serve");
    server
}

#[tokio::test(start_paused = true)]
async fn test_basic_roundtrip() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);
            let _server = serve_echo(&server_node);

            let client = client_node
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");

            let response = client
                .call(&EchoRequest {
                    token: 7,
                    delay_ms: 0,
                })
                .await
                .expect("call");
            assert_eq!(response.token, 7);
            assert_eq!(client.pending_calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_survive_out_of_order_responses() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);
            let _server = serve_echo(&server_node);

            let client = Rc::new(
                client_node
                    .make_client::<Echo>(200, SERVER_NODE)
                    .expect("client"),
            );

            // The first call's handler takes longer, so its response
            // arrives second.
            let slow_client = client.clone();
            let slow = tokio::task::spawn_local(async move {
                slow_client
                    .call(&EchoRequest {
                        token: 1,
                        delay_ms: 50,
                    })
                    .await
            });
            let fast_client = client.clone();
            let fast = tokio::task::spawn_local(async move {
                fast_client
                    .call(&EchoRequest {
                        token: 2,
                        delay_ms: 5,
                    })
                    .await
            });

            let slow = slow.await.expect("join").expect("slow call");
            let fast = fast.await.expect("join").expect("fast call");
            assert_eq!(slow.token, 1);
            assert_eq!(fast.token, 2);
            assert_eq!(client.pending_calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_call_without_server_times_out_and_cleans_up() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, _server_node) = nodes(&bus);

            // No server registered anywhere.
            let client = client_node
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");
            client.set_response_timeout(Duration::from_millis(100));

            let err = client
                .call(&EchoRequest {
                    token: 1,
                    delay_ms: 0,
                })
                .await
                .expect_err("nobody answers");
            assert!(matches!(err, SessionError::ResponseTimeout { .. }));
            // The correlation table is empty again.
            assert_eq!(client.pending_calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_response_with_unknown_transfer_id_is_ignored() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);

            // A fake server that answers with the wrong transfer-id.
            let response_port = server_node
                .transport()
                .mapper()
                .map(DataSpecifier::service(200, Role::Response).expect("valid"))
                .expect("mappable");
            let forge = server_node
                .transport()
                .open_output(response_port)
                .expect("raw output");

            let client = client_node
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");
            client.set_response_timeout(Duration::from_millis(100));

            let forged = serde_json::to_vec(&TransferEnvelope {
                transfer_id: 424_242,
                value: EchoResponse { token: 9 },
            })
            .expect("encode");
            forge
                .send(&forged, Some(NodeId::new(1)))
                .await
                .expect("send");

            let err = client
                .call(&EchoRequest {
                    token: 1,
                    delay_ms: 0,
                })
                .await
                .expect_err("forged response must not complete the call");
            assert!(matches!(err, SessionError::ResponseTimeout { .. }));
            assert!(client.responses_ignored() >= 1);
            assert_eq!(client.pending_calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_response_from_wrong_node_is_ignored() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);
            let _server = serve_echo(&server_node);

            // A rogue node floods the response port.
            let rogue = bus.attach();
            rogue.set_local_node_id(NodeId::new(66)).expect("node-id");
            let response_port = rogue
                .mapper()
                .map(DataSpecifier::service(200, Role::Response).expect("valid"))
                .expect("mappable");
            let rogue_out = rogue.open_output(response_port).expect("raw output");

            let client = client_node
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");

            for transfer_id in 0..8u64 {
                let payload = serde_json::to_vec(&TransferEnvelope {
                    transfer_id,
                    value: EchoResponse { token: 0 },
                })
                .expect("encode");
                rogue_out.send(&payload, None).await.expect("send");
            }

            // The genuine server still wins.
            let response = client
                .call(&EchoRequest {
                    token: 42,
                    delay_ms: 0,
                })
                .await
                .expect("call");
            assert_eq!(response.token, 42);
            assert!(client.responses_ignored() >= 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_server_close_drains_in_flight_handler() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);
            let server = Rc::new(serve_echo(&server_node));

            let client = Rc::new(
                client_node
                    .make_client::<Echo>(200, SERVER_NODE)
                    .expect("client"),
            );

            // Start a call whose handler is still running when we close.
            let call_client = client.clone();
            let call = tokio::task::spawn_local(async move {
                call_client
                    .call(&EchoRequest {
                        token: 5,
                        delay_ms: 50,
                    })
                    .await
            });
            while server.in_flight() == 0 {
                tokio::task::yield_now().await;
            }

            // Graceful close: the handler finishes and its response is
            // still delivered.
            server.close().await.expect("close");
            assert_eq!(server.in_flight(), 0);
            let response = call.await.expect("join").expect("in-flight call");
            assert_eq!(response.token, 5);

            // After close, nothing is dispatched any more.
            client.set_response_timeout(Duration::from_millis(50));
            let err = client
                .call(&EchoRequest {
                    token: 6,
                    delay_ms: 0,
                })
                .await
                .expect_err("server is gone");
            assert!(matches!(err, SessionError::ResponseTimeout { .. }));
            assert_eq!(server.in_flight(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_sends_no_response() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, server_node) = nodes(&bus);

            let server = server_node.make_server::<Echo>(200).expect("server");
            server
                .serve(|_request: EchoRequest, _metadata| async move {
                    Err::<EchoResponse, SessionError>(SessionError::SessionClosed)
                })
                .expect("serve");

            let client = client_node
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");
            client.set_response_timeout(Duration::from_millis(100));

            let err = client
                .call(&EchoRequest {
                    token: 3,
                    delay_ms: 0,
                })
                .await
                .expect_err("handler failure produces no response");
            assert!(matches!(err, SessionError::ResponseTimeout { .. }));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_second_serve_is_rejected() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (_client_node, server_node) = nodes(&bus);
            let server = serve_echo(&server_node);

            let err = server
                .serve(|_request: EchoRequest, _metadata| async move {
                    Ok::<EchoResponse, SessionError>(EchoResponse { token: 0 })
                })
                .expect_err("only one handler per server");
            assert!(matches!(err, SessionError::AlreadyServing));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_request_from_anonymous_node_is_dropped() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            // The requester never assigns itself a node-id, so the server
            // has no address to respond to.
            let anonymous = Node::with_defaults(
                bus.attach(),
                NodeInfo::with_name("org.example.anonymous"),
            )
            .expect("anonymous node");
            let server_node = Node::with_defaults(
                bus.attach(),
                NodeInfo::with_name("org.example.server"),
            )
            .expect("server node");
            server_node.set_local_node_id(SERVER_NODE).expect("node-id");
            let server = serve_echo(&server_node);

            let client = anonymous
                .make_client::<Echo>(200, SERVER_NODE)
                .expect("client");
            client.set_response_timeout(Duration::from_millis(100));

            let err = client
                .call(&EchoRequest {
                    token: 1,
                    delay_ms: 0,
                })
                .await
                .expect_err("anonymous requests are dropped");
            assert!(matches!(err, SessionError::ResponseTimeout { .. }));
            assert_eq!(server.in_flight(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_closing_client_fails_outstanding_calls() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = LoopbackBus::new();
            let (client_node, _server_node) = nodes(&bus);

            let client = Rc::new(
                client_node
                    .make_client::<Echo>(200, SERVER_NODE)
                    .expect("client"),
            );
            client.set_response_timeout(Duration::from_secs(3600));

            let call_client = client.clone();
            let call = tokio::task::spawn_local(async move {
                call_client
                    .call(&EchoRequest {
                        token: 1,
                        delay_ms: 0,
                    })
                    .await
            });
            while client.pending_calls() == 0 {
                tokio::task::yield_now().await;
            }

            client.close().expect("close");
            let err = call.await.expect("join").expect_err("aborted by close");
            assert!(matches!(err, SessionError::SessionClosed));
            assert_eq!(client.pending_calls(), 0);
        })
        .await;
}
