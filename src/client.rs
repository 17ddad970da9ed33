//! The public entry point: ties configuration, session, and the reconnect
//! controller together behind a single handle.

use crate::{
    config::Config,
    dispatch::Callback,
    error::{GatewayError, GatewayInterrupt},
    model::DispatchEvent,
    reconnect::{self, Backoff, FinalOutcome},
    session::Session,
    stage::{Stage, StageCell},
};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// What driving a [`Client`] to completion produced.
#[derive(Debug)]
pub enum RunOutcome {
    /// A fatal error ended the connection for good.
    Fatal(GatewayError),
    /// Automatic reconnection is disabled and a recoverable interrupt
    /// occurred; the caller decides whether to call [`Client::run`] again.
    Interrupt(GatewayInterrupt),
    /// [`Client::shutdown`] was called.
    Shutdown,
}

impl From<FinalOutcome> for RunOutcome {
    fn from(outcome: FinalOutcome) -> Self {
        match outcome {
            FinalOutcome::Fatal(error) => Self::Fatal(error),
            FinalOutcome::Interrupt(interrupt) => Self::Interrupt(interrupt),
            FinalOutcome::Shutdown => Self::Shutdown,
        }
    }
}

/// A Discord Gateway client: one connection lifecycle, not a multi-shard
/// cluster.
///
/// Construct with [`Client::new`], register a dispatch handler with
/// [`Client::on_dispatch`], then drive the connection by calling
/// [`Client::run`] with the initial gateway URL (fetched by the caller —
/// the HTTP GET against `/gateway/bot` is outside this crate's scope).
pub struct Client {
    config: Arc<Config>,
    session: Arc<Session>,
    stage: Arc<StageCell>,
    backoff: Arc<Backoff>,
    callback: Mutex<Option<Callback>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Client {
    /// Build a new client from the given configuration.
    ///
    /// No connection is opened until [`Client::run`] is called.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(Session::new()),
            stage: Arc::new(StageCell::new()),
            backoff: Arc::new(Backoff::new()),
            callback: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Register the dispatch handler invoked for every received event.
    ///
    /// Only one handler is supported at a time; a later call replaces the
    /// earlier one rather than accumulating both.
    pub fn on_dispatch<F>(&self, handler: F)
    where
        F: Fn(DispatchEvent) + Send + Sync + 'static,
    {
        *self.callback.lock().expect("callback poisoned") = Some(Arc::new(handler));
    }

    /// The current observable connection stage.
    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    /// Whether a session id has been established (i.e. at least one READY
    /// has been received since the last non-resumable invalidation).
    pub fn has_session(&self) -> bool {
        self.session.session_id().is_some()
    }

    /// Drive the connection lifecycle until a fatal error, a caller-opted-out
    /// interrupt, or [`Client::shutdown`] ends it.
    ///
    /// `fresh_gateway_url` is used for the very first connection attempt and
    /// for any attempt that must identify fresh; once a session exists,
    /// reconnection attempts prefer the session's `resume_gateway_url`
    /// instead.
    ///
    /// # Panics
    ///
    /// Panics if called again while a previous call is still running.
    pub async fn run(&self, fresh_gateway_url: impl Into<String>) -> RunOutcome {
        let callback = self
            .callback
            .lock()
            .expect("callback poisoned")
            .clone()
            .unwrap_or_else(|| Arc::new(|_event| {}));

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.shutdown.lock().expect("shutdown poisoned");
            assert!(guard.is_none(), "Client::run is already in progress");
            *guard = Some(tx);
        }

        let gateway_url = self
            .session
            .resume_gateway_url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| fresh_gateway_url.into());

        let outcome = reconnect::run(
            Arc::clone(&self.config),
            gateway_url,
            Arc::clone(&self.session),
            Arc::clone(&self.stage),
            callback,
            Arc::clone(&self.backoff),
            rx,
        )
        .await;

        self.shutdown.lock().expect("shutdown poisoned").take();

        outcome.into()
    }

    /// Ask a running [`Client::run`] call to shut down cooperatively.
    ///
    /// Closes the transport with code 1000 and returns without retrying.
    /// Calling this when no run is in progress is a no-op.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().expect("shutdown poisoned").take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::config::Config;

    #[test]
    fn starts_disconnected_without_a_session() {
        let client = Client::new(Config::builder("Bot t").build());
        assert_eq!(client.stage(), crate::stage::Stage::Disconnected);
        assert!(!client.has_session());
    }

    #[test]
    fn shutdown_without_a_run_in_progress_is_a_no_op() {
        let client = Client::new(Config::builder("Bot t").build());
        client.shutdown();
    }
}
