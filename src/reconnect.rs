//! Backoff between connection attempts, and the loop that drives
//! [`crate::connection::run`] across however many attempts it takes.

use crate::{
    config::Config,
    connection::{self, Outcome, RetryClass},
    dispatch::Callback,
    error::{GatewayError, GatewayInterrupt},
    session::Session,
    stage::StageCell,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{atomic::{AtomicU64, Ordering}, Arc};
use std::time::Duration;
use tokio::sync::oneshot;

const BASE_MS: u64 = 1_000;
const CAP_MS: u64 = 60_000;
const INVALIDATING_MIN_MS: u64 = 1_000;
const INVALIDATING_MAX_MS: u64 = 5_000;

/// Exponential backoff with full jitter for transient failures, plus a
/// separate uniform delay for session-invalidating ones.
///
/// Resets to the base delay whenever a connection reaches Ready or Resumed,
/// so a long-lived connection doesn't inherit a stale, inflated delay from
/// an unrelated earlier failure.
#[derive(Debug, Default)]
pub struct Backoff {
    current_ms: AtomicU64,
}

impl Backoff {
    /// Create a backoff starting at the base delay.
    pub fn new() -> Self {
        Self {
            current_ms: AtomicU64::new(BASE_MS),
        }
    }

    /// Reset to the base delay.
    pub fn reset(&self) {
        self.current_ms.store(BASE_MS, Ordering::Release);
    }

    /// Sleep for the current transient delay (with full jitter), then
    /// double it, capped at [`CAP_MS`].
    pub async fn wait_transient(&self) {
        let current = self.current_ms.load(Ordering::Acquire);
        let mut rng = StdRng::from_entropy();
        let jittered = rng.gen_range(0..=current);

        tokio::time::sleep(Duration::from_millis(jittered)).await;

        let next = current.saturating_mul(2).min(CAP_MS);
        self.current_ms.store(next, Ordering::Release);
    }

    /// Sleep for a uniform delay between 1 and 5 seconds.
    ///
    /// Session-invalidating failures don't grow the backoff: the next
    /// attempt identifies fresh regardless of how long we wait, so there's
    /// no accumulating connection state to protect the server from.
    pub async fn wait_session_invalidating(&self) {
        let mut rng = StdRng::from_entropy();
        let delay = rng.gen_range(INVALIDATING_MIN_MS..=INVALIDATING_MAX_MS);

        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// The terminal result of driving a connection across however many retries
/// it took.
#[derive(Debug)]
pub enum FinalOutcome {
    /// A fatal error was encountered; no further attempts will be made.
    Fatal(GatewayError),
    /// Automatic reconnection is disabled and a recoverable interrupt
    /// occurred.
    Interrupt(GatewayInterrupt),
    /// The caller asked for a cooperative shutdown.
    Shutdown,
}

/// Drive connection attempts against `gateway_url` until a fatal error, an
/// interrupt (with reconnection disabled), or a shutdown request ends the
/// loop.
pub async fn run(
    config: Arc<Config>,
    gateway_url: String,
    session: Arc<Session>,
    stage: Arc<StageCell>,
    on_dispatch: Callback,
    backoff: Arc<Backoff>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> FinalOutcome {
    loop {
        let (tripwire_tx, tripwire_rx) = oneshot::channel();

        // A resuming session dials the URL its last READY handed us; a fresh
        // one falls back to the externally-supplied gateway URL, since
        // re-fetching it is outside this crate's scope (§1 Out of scope).
        let attempt_url = session
            .resume_gateway_url()
            .filter(|_| session.mode() == crate::session::Mode::Resuming)
            .map(|url| url.to_string())
            .unwrap_or_else(|| gateway_url.clone());

        // Each attempt gets its own shutdown tripwire so `connection::run`
        // can race it independently; if the real shutdown fires while we're
        // between attempts (sleeping in backoff), the `select!` below
        // catches it instead.
        let attempt = tokio::select! {
            outcome = connection::run(
                Arc::clone(&config),
                &attempt_url,
                Arc::clone(&session),
                Arc::clone(&stage),
                Arc::clone(&on_dispatch),
                Arc::clone(&backoff),
                tripwire_rx,
            ) => outcome,
            _ = &mut shutdown_rx => {
                let _ = tripwire_tx.send(());
                return FinalOutcome::Shutdown;
            }
        };

        drop(tripwire_tx);

        match attempt {
            Outcome::Retry(RetryClass::Transient) => {
                tokio::select! {
                    _ = backoff.wait_transient() => {}
                    _ = &mut shutdown_rx => return FinalOutcome::Shutdown,
                }
            }
            Outcome::Retry(RetryClass::SessionInvalidating) => {
                tokio::select! {
                    _ = backoff.wait_session_invalidating() => {}
                    _ = &mut shutdown_rx => return FinalOutcome::Shutdown,
                }
            }
            Outcome::Fatal(error) => return FinalOutcome::Fatal(error),
            Outcome::Interrupt(interrupt) => return FinalOutcome::Interrupt(interrupt),
            Outcome::Shutdown => return FinalOutcome::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Backoff;
    use std::sync::atomic::Ordering;

    #[test]
    fn reset_restores_base_delay() {
        let backoff = Backoff::new();
        backoff.current_ms.store(30_000, Ordering::Release);
        backoff.reset();
        assert_eq!(backoff.current_ms.load(Ordering::Acquire), super::BASE_MS);
    }

    #[tokio::test]
    async fn transient_wait_doubles_and_caps() {
        let backoff = Backoff::new();

        for _ in 0..10 {
            backoff.wait_transient().await;
        }

        assert_eq!(backoff.current_ms.load(Ordering::Acquire), super::CAP_MS);
    }
}
