//! Periodic liveness announcement.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use skybus_core::{MessageCodec, MessageSchema, SubjectId};

use crate::error::SessionError;
use crate::session::Publisher;
use crate::standard::{Health, Heartbeat, Mode};
use crate::transport::Transport;

/// Emits the standard [`Heartbeat`] message at a fixed period.
///
/// Started by the node at construction and runs until closed. The reported
/// uptime derives from a monotonic clock and is additionally forced to
/// advance by at least one per emission, so the emitted values are strictly
/// increasing for the lifetime of the node — consecutive heartbeats are
/// always distinguishable and never out of order.
///
/// Health, mode and the vendor status byte are mutable at any time and are
/// picked up by the next emission.
pub struct HeartbeatPublisher<T: Transport, C: MessageCodec> {
    publisher: Rc<Publisher<Heartbeat, T, C>>,
    state: Rc<HeartbeatState>,
    period: Duration,
    task: RefCell<Option<tokio::task::JoinHandle<()>>>,
    closed: Cell<bool>,
}

/// Mutable heartbeat fields shared with the emission task.
struct HeartbeatState {
    started_at: Instant,
    health: Cell<Health>,
    mode: Cell<Mode>,
    vendor_specific_status_code: Cell<u8>,
    last_uptime: Cell<Option<u64>>,
}

impl HeartbeatState {
    fn make_message(&self) -> Heartbeat {
        let elapsed = self.started_at.elapsed().as_secs();
        let uptime = match self.last_uptime.get() {
            Some(previous) => elapsed.max(previous + 1),
            None => elapsed,
        };
        self.last_uptime.set(Some(uptime));
        Heartbeat {
            uptime: uptime.min(u32::MAX as u64) as u32,
            health: self.health.get(),
            mode: self.mode.get(),
            vendor_specific_status_code: self.vendor_specific_status_code.get(),
        }
    }
}

impl<T, C> HeartbeatPublisher<T, C>
where
    T: Transport + 'static,
    C: MessageCodec,
{
    /// Open the heartbeat publisher and start emitting.
    ///
    /// Must be called within a `tokio` local task context.
    pub(crate) fn start(transport: &T, codec: C, period: Duration) -> Result<Self, SessionError> {
        let subject_id = Heartbeat::FIXED_SUBJECT_ID.ok_or(SessionError::NoFixedPort {
            type_name: Heartbeat::NAME,
        })?;
        let publisher = Rc::new(Publisher::open(
            transport,
            SubjectId::new(subject_id)?,
            codec,
        )?);

        let state = Rc::new(HeartbeatState {
            started_at: Instant::now(),
            health: Cell::new(Health::Nominal),
            mode: Cell::new(Mode::Operational),
            vendor_specific_status_code: Cell::new(0),
            last_uptime: Cell::new(None),
        });

        let task = tokio::task::spawn_local(emit_loop(publisher.clone(), state.clone(), period));

        Ok(Self {
            publisher,
            state,
            period,
            task: RefCell::new(Some(task)),
            closed: Cell::new(false),
        })
    }

    /// The configured emission period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The health reported by subsequent heartbeats.
    pub fn health(&self) -> Health {
        self.state.health.get()
    }

    /// Update the reported health.
    pub fn set_health(&self, health: Health) {
        self.state.health.set(health);
    }

    /// The mode reported by subsequent heartbeats.
    pub fn mode(&self) -> Mode {
        self.state.mode.get()
    }

    /// Update the reported mode.
    pub fn set_mode(&self, mode: Mode) {
        self.state.mode.set(mode);
    }

    /// The vendor status byte reported by subsequent heartbeats.
    pub fn vendor_specific_status_code(&self) -> u8 {
        self.state.vendor_specific_status_code.get()
    }

    /// Update the vendor status byte.
    pub fn set_vendor_specific_status_code(&self, code: u8) {
        self.state.vendor_specific_status_code.set(code);
    }

    /// Render the message the next emission would send.
    ///
    /// Consumes one uptime value, so the next periodic emission reports a
    /// strictly larger one.
    pub fn make_message(&self) -> Heartbeat {
        self.state.make_message()
    }

    /// Stop emitting and release the publisher.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyClosed`] if called twice.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.closed.replace(true) {
            tracing::warn!("heartbeat publisher closed twice");
            return Err(SessionError::AlreadyClosed);
        }
        // The task only suspends between emissions, so aborting it never
        // cuts a publish in half.
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
        self.publisher.close()
    }
}

/// Emission task: one heartbeat per tick until aborted.
async fn emit_loop<T, C>(
    publisher: Rc<Publisher<Heartbeat, T, C>>,
    state: Rc<HeartbeatState>,
    period: Duration,
) where
    T: Transport,
    C: MessageCodec,
{
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let message = state.make_message();
        if let Err(e) = publisher.publish(&message).await {
            tracing::warn!(error = %e, "heartbeat emission failed, stopping");
            break;
        }
    }
}
