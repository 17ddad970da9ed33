//! The heartbeat task: proves liveness to the gateway at the interval
//! dictated by Hello, and detects when the server has stopped acking.

use crate::{model::Heartbeat, session::Session, transport::Transport};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Shared ack-tracking state between the heartbeat task and the connection
/// loop's reader (the only task that ever receives a `HeartbeatAck`).
#[derive(Debug, Default)]
pub struct HeartbeatState {
    ack_received: AtomicBool,
    last_sent: Mutex<Option<Instant>>,
    last_acked: Mutex<Option<Instant>>,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an acknowledgement arrived.
    ///
    /// A single ack satisfies *any* outstanding send, scheduled or
    /// on-demand — this crate tracks "at least one ack since the most
    /// recent scheduled send", not a strict request/response pairing.
    pub fn acknowledge(&self) {
        self.ack_received.store(true, Ordering::Release);
        *self.last_acked.lock().expect("last_acked poisoned") = Some(Instant::now());
    }

    /// The round-trip latency of the most recent acknowledged heartbeat, if
    /// both a send and an ack have been observed.
    pub fn latency(&self) -> Option<Duration> {
        let sent = (*self.last_sent.lock().expect("last_sent poisoned"))?;
        let acked = (*self.last_acked.lock().expect("last_acked poisoned"))?;

        acked.checked_duration_since(sent)
    }

    fn record_send(&self) {
        *self.last_sent.lock().expect("last_sent poisoned") = Some(Instant::now());
    }

    /// Clear the ack flag and return whether an ack had arrived since it was
    /// last cleared.
    fn take_acked(&self) -> bool {
        self.ack_received.swap(false, Ordering::AcqRel)
    }
}

/// Signal that no heartbeat acknowledgement arrived within one interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeartbeatLost;

/// Handle used by the connection loop to request an on-demand heartbeat
/// (when the server sends opcode 1) without owning the heartbeat task
/// itself.
#[derive(Clone)]
pub struct HeartbeatTrigger(mpsc::UnboundedSender<()>);

impl HeartbeatTrigger {
    /// Ask the heartbeat task to send immediately and reset its wake timer
    /// relative to that send.
    ///
    /// A trigger sent after the heartbeat task has stopped is silently
    /// dropped: the connection is already tearing down.
    pub fn request(&self) {
        let _ = self.0.send(());
    }
}

/// Runs the heartbeat loop for one connection.
///
/// Returns [`HeartbeatLost`] if two consecutive scheduled sends elapse with
/// no acknowledgement arriving in between. Runs until that happens or the
/// transport itself errors while sending.
pub async fn run(
    interval_ms: u64,
    session: Arc<Session>,
    transport: Transport,
    state: Arc<HeartbeatState>,
    mut trigger: mpsc::UnboundedReceiver<()>,
) -> Result<std::convert::Infallible, HeartbeatLost> {
    let interval = Duration::from_millis(interval_ms.max(1));

    // Instance-local RNG: jitter must never perturb a process-wide source
    // the host program might depend on for unrelated randomness.
    let mut rng = StdRng::from_entropy();
    let jitter = rng.gen::<f64>();

    let jittered_wait = interval.mul_f64(jitter);
    tokio::time::sleep(jittered_wait).await;

    let mut first = true;
    let mut deadline = tokio::time::Instant::now() + interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                if !first && !state.take_acked() {
                    return Err(HeartbeatLost);
                }

                send(&transport, &session, &state).await;
                first = false;
                deadline = tokio::time::Instant::now() + interval;
            }
            received = trigger.recv() => {
                if received.is_none() {
                    // The connection loop dropped its sender: we're
                    // shutting down, not losing heartbeats.
                    std::future::pending::<()>().await;
                }

                send(&transport, &session, &state).await;
                deadline = tokio::time::Instant::now() + interval;
            }
        }
    }
}

async fn send(transport: &Transport, session: &Session, state: &HeartbeatState) {
    let seq = session.last_sequence();
    let payload = Heartbeat::new(if seq == 0 { None } else { Some(seq) });

    state.record_send();

    // A send failure here means the transport itself is gone; the
    // connection loop's reader will observe the same failure on its next
    // `receive_frame` and drive the reconnect. There's nothing additional
    // for the heartbeat task to do but stop trying for this connection.
    if let Ok(text) = serde_json::to_string(&payload) {
        let _ = transport.send_text(text).await;
    }
}

/// Create a trigger/receiver pair for on-demand heartbeats.
pub fn trigger_channel() -> (HeartbeatTrigger, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HeartbeatTrigger(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::HeartbeatState;

    #[test]
    fn ack_flag_clears_on_take() {
        let state = HeartbeatState::new();
        assert!(!state.take_acked());

        state.acknowledge();
        assert!(state.take_acked());
        assert!(!state.take_acked());
    }

    #[test]
    fn latency_requires_both_send_and_ack() {
        let state = HeartbeatState::new();
        assert!(state.latency().is_none());

        state.record_send();
        assert!(state.latency().is_none());

        state.acknowledge();
        assert!(state.latency().is_some());
    }
}
