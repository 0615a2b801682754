//! Telemetry Example: pub/sub plus RPC between two nodes.
//!
//! Two nodes share an in-process loopback bus. The sensor node broadcasts
//! temperature samples and serves a calibration service; the monitor node
//! subscribes to the samples and calls the service.
//!
//! ```bash
//! cargo run --example telemetry
//! ```
//!
//! # Architecture
//!
//! The example shows:
//! - `message_types!` / `service_types!` macros for schema declarations
//! - `Node` construction with the mandatory heartbeat and info services
//! - publisher/subscriber factories for broadcast telemetry
//! - client/server factories for request/response calls
//! - node-info queries against the always-on responder

use std::time::Duration;

use skybus::transport::loopback::LoopbackBus;
use skybus::{
    message_types, service_types, GetNodeInfo, Node, NodeId, NodeInfo, SessionError,
};

// ============================================================================
// Configuration
// ============================================================================

const SENSOR_NODE_ID: NodeId = NodeId::new(11);
const MONITOR_NODE_ID: NodeId = NodeId::new(12);

const TEMPERATURE_SUBJECT: u16 = 2345;
const CALIBRATE_SERVICE: u16 = 120;

// ============================================================================
// Data Types
// ============================================================================

message_types! {
    /// One temperature sample.
    pub struct Temperature {
        /// Sample counter.
        pub seq: u32,
        /// Degrees Celsius.
        pub celsius: f64,
    }

    /// Calibration request.
    pub struct CalibrateRequest {
        /// Offset to apply to future samples.
        pub offset: f64,
    }

    /// Calibration acknowledgement.
    pub struct CalibrateResponse {
        /// Offset now in effect.
        pub applied: f64,
    }
}

service_types! {
    /// Sensor calibration service.
    pub service Calibrate {
        request: CalibrateRequest,
        response: CalibrateResponse,
    }
}

// ============================================================================
// Demo
// ============================================================================

async fn run() -> Result<(), SessionError> {
    let bus = LoopbackBus::new();

    // Both nodes come up with their heartbeat and info services running.
    let sensor = Node::with_defaults(bus.attach(), NodeInfo::with_name("org.example.sensor"))?;
    sensor.set_local_node_id(SENSOR_NODE_ID)?;
    let monitor = Node::with_defaults(bus.attach(), NodeInfo::with_name("org.example.monitor"))?;
    monitor.set_local_node_id(MONITOR_NODE_ID)?;

    // Sensor side: broadcast samples, serve calibration requests.
    let samples = sensor.make_publisher::<Temperature>(TEMPERATURE_SUBJECT)?;
    let calibration = sensor.make_server::<Calibrate>(CALIBRATE_SERVICE)?;
    calibration.serve(|request: CalibrateRequest, metadata| async move {
        println!(
            "[sensor]  calibration request from node {}: offset {:+.2}",
            metadata.client_node_id, request.offset
        );
        Ok::<CalibrateResponse, SessionError>(CalibrateResponse {
            applied: request.offset,
        })
    })?;

    // Monitor side: subscribe to samples, query the sensor.
    let feed = monitor.make_subscriber::<Temperature>(TEMPERATURE_SUBJECT, None)?;
    let calibrate = monitor.make_client::<Calibrate>(CALIBRATE_SERVICE, SENSOR_NODE_ID)?;
    let who_is_there =
        monitor.make_client_with_fixed_service_id::<GetNodeInfo>(SENSOR_NODE_ID)?;

    // Ask the sensor who it is, via the always-on info responder.
    let info = who_is_there.call(&skybus::GetNodeInfoRequest {}).await?;
    println!("[monitor] peer identified: {}\n", info.name);

    // Publish a few samples and watch them arrive.
    for seq in 0..5u32 {
        samples
            .publish(&Temperature {
                seq,
                celsius: 20.0 + f64::from(seq) * 0.25,
            })
            .await?;

        if let Some((sample, metadata)) = feed.receive().await {
            println!(
                "[monitor] sample #{} from node {:?}: {:.2} °C",
                sample.seq, metadata.source_node_id, sample.celsius
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Calibrate the sensor over RPC.
    let response = calibrate
        .call(&CalibrateRequest { offset: -0.75 })
        .await?;
    println!("\n[monitor] calibration applied: {:+.2}", response.applied);

    // Tear down: endpoints first, then the nodes (which close their
    // transports).
    samples.close()?;
    feed.close()?;
    calibrate.close()?;
    who_is_there.close()?;
    calibration.close().await?;
    sensor.close().await?;
    monitor.close().await?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt().init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to create Tokio runtime");

    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(async {
        if let Err(e) = run().await {
            eprintln!("telemetry example failed: {}", e);
            std::process::exit(1);
        }
    }));
}
