//! Per-connection mutable state that survives across reconnects.

use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Mutex,
};

/// Whether the next connection should identify fresh or attempt to resume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Mode {
    /// Identify to establish a brand-new session.
    Fresh = 0,
    /// Resume the existing session.
    Resuming = 1,
}

impl Mode {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Resuming,
            _ => Self::Fresh,
        }
    }
}

/// Mutable state for the current (or about-to-be-resumed) gateway session.
///
/// Shared between the connection loop's reader and the heartbeat task; all
/// fields are accessed through atomics or a `std::sync::Mutex` rather than
/// assuming single-threaded cooperative scheduling, since this crate targets
/// general (possibly multi-threaded) `tokio` runtimes.
#[derive(Debug)]
pub struct Session {
    session_id: Mutex<Option<Box<str>>>,
    resume_gateway_url: Mutex<Option<Box<str>>>,
    last_sequence: AtomicU64,
    heartbeat_interval_ms: AtomicU64,
    mode: AtomicU8,
}

impl Session {
    /// Create a fresh, empty session.
    pub fn new() -> Self {
        Self {
            session_id: Mutex::new(None),
            resume_gateway_url: Mutex::new(None),
            last_sequence: AtomicU64::new(0),
            heartbeat_interval_ms: AtomicU64::new(0),
            mode: AtomicU8::new(Mode::Fresh as u8),
        }
    }

    /// The current session id, if any READY has been received yet.
    pub fn session_id(&self) -> Option<Box<str>> {
        self.session_id.lock().expect("session_id poisoned").clone()
    }

    /// The resume gateway URL announced by the last READY, if any.
    pub fn resume_gateway_url(&self) -> Option<Box<str>> {
        self.resume_gateway_url
            .lock()
            .expect("resume_gateway_url poisoned")
            .clone()
    }

    /// The last observed dispatch sequence, or `0` if none has been seen.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Set the last observed sequence.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `seq` would move the sequence backwards; the
    /// spec requires monotonicity within one session and a regression here
    /// indicates a bug in the connection loop, not a real gateway event.
    pub fn set_last_sequence(&self, seq: u64) {
        let previous = self.last_sequence.swap(seq, Ordering::AcqRel);
        debug_assert!(
            seq >= previous,
            "sequence must be monotonically non-decreasing (was {previous}, got {seq})",
        );
    }

    /// The heartbeat interval announced by the last Hello, in milliseconds.
    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms.load(Ordering::Acquire)
    }

    /// Set the heartbeat interval.
    pub fn set_heartbeat_interval_ms(&self, interval_ms: u64) {
        self.heartbeat_interval_ms.store(interval_ms, Ordering::Release);
    }

    /// The current identify-vs-resume mode.
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Record a successful READY: store the session id and resume URL and
    /// switch to [`Mode::Resuming`] for subsequent connections.
    pub fn mark_ready(&self, session_id: impl Into<Box<str>>, resume_gateway_url: impl Into<Box<str>>) {
        *self.session_id.lock().expect("session_id poisoned") = Some(session_id.into());
        *self
            .resume_gateway_url
            .lock()
            .expect("resume_gateway_url poisoned") = Some(resume_gateway_url.into());
        self.mode.store(Mode::Resuming as u8, Ordering::Release);
    }

    /// Invalidate the session: clear the identifying fields and reset the
    /// sequence, switching back to [`Mode::Fresh`].
    ///
    /// Called when the server sends `InvalidSession` with `resumable =
    /// false`.
    pub fn invalidate(&self) {
        *self.session_id.lock().expect("session_id poisoned") = None;
        *self
            .resume_gateway_url
            .lock()
            .expect("resume_gateway_url poisoned") = None;
        self.last_sequence.store(0, Ordering::Release);
        self.mode.store(Mode::Fresh as u8, Ordering::Release);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
