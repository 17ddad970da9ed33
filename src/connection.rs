//! The connection-level state machine: one pass through Connecting →
//! AwaitingHello → Authenticating → Operating → Closing for a single
//! websocket connection.
//!
//! One call to [`run`] owns exactly one connection. The caller (the
//! reconnect controller) decides, from the returned [`Outcome`], whether and
//! how to call `run` again.

use crate::{
    close::{self, CloseClassification},
    compression::Decoder,
    config::Config,
    dispatch::{self, Callback},
    error::{GatewayError, GatewayErrorKind, GatewayInterrupt},
    heartbeat::{self, HeartbeatLost, HeartbeatState},
    model::{DispatchEvent, Envelope, GatewayEvent, Identify, IdentifyInfo, Resume},
    reconnect::Backoff,
    session::{Mode, Session},
    stage::{Stage, StageCell},
    transport::{self, Frame, Transport},
};
use std::sync::Arc;

/// What happened to a connection, and what the reconnect controller should
/// do in response.
#[derive(Debug)]
pub enum Outcome {
    /// The connection ended in a way that should be retried.
    Retry(RetryClass),
    /// The connection failed in a way that must not be retried.
    Fatal(GatewayError),
    /// Automatic reconnection is disabled and a recoverable interrupt
    /// occurred; the caller decides what to do next.
    Interrupt(GatewayInterrupt),
    /// The caller asked the connection to shut down cooperatively.
    Shutdown,
}

/// The backoff bucket a retryable outcome falls into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Exponential backoff with jitter, doubling from a 1s base up to a 60s
    /// cap.
    Transient,
    /// A uniform 1-5s delay: the session itself is no longer usable and a
    /// fresh identify is coming next, so there's no connection state worth
    /// backing off slowly for.
    SessionInvalidating,
}

/// Run a single connection attempt against `gateway_url`.
///
/// `session` persists across calls (the reconnect controller owns it); its
/// [`Session::mode`] at the time Hello is received decides whether this
/// attempt identifies fresh or resumes.
pub async fn run(
    config: Arc<Config>,
    gateway_url: &str,
    session: Arc<Session>,
    stage: Arc<StageCell>,
    on_dispatch: Callback,
    backoff: Arc<Backoff>,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Outcome {
    stage.set(Stage::Handshaking);

    let url = transport::build_url(gateway_url, config.zlib_stream());

    let transport = match Transport::connect(&url).await {
        Ok(transport) => transport,
        Err(error) => return to_outcome(&config, error),
    };

    run_with_transport(config, transport, session, stage, on_dispatch, backoff, shutdown).await
}

/// The body of [`run`], parameterized over an already-open [`Transport`]
/// instead of dialing one itself.
///
/// Split out so connection-loop tests can drive the state machine over a
/// [`Transport::fake`] pair without touching a real socket.
#[allow(clippy::too_many_arguments)]
async fn run_with_transport(
    config: Arc<Config>,
    transport: Transport,
    session: Arc<Session>,
    stage: Arc<StageCell>,
    on_dispatch: Callback,
    backoff: Arc<Backoff>,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Outcome {
    let mut decoder = Decoder::new(config.zlib_stream());

    let hello_interval = tokio::select! {
        result = await_hello(&transport, &mut decoder, &session) => match result {
            Ok(interval) => interval,
            Err(error) => {
                transport.close(close_code_for(&error), "expected hello").await;
                return to_outcome(&config, error);
            }
        },
        _ = &mut shutdown => {
            transport.close(1000, "shutting down").await;
            return Outcome::Shutdown;
        }
    };

    session.set_heartbeat_interval_ms(hello_interval);

    let resuming = session.mode() == Mode::Resuming && session.session_id().is_some();
    stage.set(if resuming { Stage::Resuming } else { Stage::Identifying });

    if let Err(error) = authenticate(&config, &transport, &session, resuming).await {
        transport.close(close_code_for(&error), "failed to authenticate").await;
        return to_outcome(&config, error);
    }

    let heartbeat_state = Arc::new(HeartbeatState::new());
    let (trigger, trigger_rx) = heartbeat::trigger_channel();
    let mut heartbeat_task = tokio::spawn(heartbeat::run(
        hello_interval,
        Arc::clone(&session),
        transport.clone(),
        Arc::clone(&heartbeat_state),
        trigger_rx,
    ));

    let outcome = operate(
        &config,
        &transport,
        &mut decoder,
        &session,
        &stage,
        &on_dispatch,
        &backoff,
        &trigger,
        &heartbeat_state,
        &mut heartbeat_task,
        &mut shutdown,
    )
    .await;

    heartbeat_task.abort();
    stage.set(Stage::Disconnected);

    outcome
}

async fn await_hello(
    transport: &Transport,
    decoder: &mut Decoder,
    session: &Session,
) -> Result<u64, GatewayError> {
    loop {
        let text = match next_payload(transport, decoder, session).await? {
            Some(text) => text,
            None => continue,
        };

        let envelope: Envelope = serde_json::from_str(&text).map_err(|source| {
            GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None })
                .with_source(source)
        })?;

        let event = GatewayEvent::from_envelope(envelope).map_err(|source| {
            GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None })
                .with_source(source)
        })?;

        if let GatewayEvent::Hello { heartbeat_interval } = event {
            return Ok(heartbeat_interval);
        }

        tracing::warn!("received a non-Hello event before the handshake completed");
    }
}

async fn authenticate(
    config: &Config,
    transport: &Transport,
    session: &Session,
    resuming: bool,
) -> Result<(), GatewayError> {
    if resuming {
        let session_id = session.session_id().expect("checked by caller");
        let payload = Resume::new(config.token(), session_id.to_string(), session.last_sequence());

        let text = serde_json::to_string(&payload).expect("Resume always serializes");
        transport.send_text(text).await
    } else {
        let payload = Identify::new(IdentifyInfo {
            token: config.token().to_owned(),
            intents: config.intents().bits(),
            properties: config.identify_properties().clone(),
            presence: config.presence().cloned(),
            large_threshold: config.large_threshold(),
            compress: false,
        });

        let text = serde_json::to_string(&payload).expect("Identify always serializes");
        transport.send_text(text).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn operate(
    config: &Config,
    transport: &Transport,
    decoder: &mut Decoder,
    session: &Session,
    stage: &StageCell,
    on_dispatch: &Callback,
    backoff: &Backoff,
    trigger: &heartbeat::HeartbeatTrigger,
    heartbeat_state: &HeartbeatState,
    heartbeat_task: &mut tokio::task::JoinHandle<Result<std::convert::Infallible, HeartbeatLost>>,
    shutdown: &mut tokio::sync::oneshot::Receiver<()>,
) -> Outcome {
    loop {
        tokio::select! {
            payload = next_payload(transport, decoder, session) => {
                match payload {
                    Ok(Some(text)) => {
                        match handle_payload(&text, session, stage, on_dispatch, backoff, trigger, heartbeat_state) {
                            Ok(Some(pending)) => {
                                transport.close(pending.0, pending.1).await;
                                return to_outcome(config, pending.2);
                            }
                            Ok(None) => continue,
                            Err(error) => {
                                transport.close(close_code_for(&error), "malformed payload").await;
                                return to_outcome(config, error);
                            }
                        }
                    }
                    Ok(None) => continue,
                    Err(error) => {
                        let error = aggregate_with_heartbeat(error, heartbeat_task).await;
                        return to_outcome(config, error);
                    }
                }
            }
            joined = &mut *heartbeat_task => {
                let error = match joined {
                    Ok(Err(HeartbeatLost)) => GatewayError::from_kind(GatewayErrorKind::HeartbeatLost),
                    Ok(Ok(never)) => match never {},
                    Err(join_error) => {
                        GatewayError::from_kind(GatewayErrorKind::HeartbeatLost).with_source(join_error)
                    }
                };

                transport.close(close_code_for(&error), "heartbeat lost").await;
                return to_outcome(config, error);
            }
            _ = &mut *shutdown => {
                transport.close(1000, "shutting down").await;
                return Outcome::Shutdown;
            }
        }
    }
}

/// If the heartbeat task has *also* already failed by the time the reader
/// notices its own failure, fold both into one [`GatewayErrorKind::Multiple`]
/// instead of silently discarding whichever one `select!` didn't pick.
///
/// Only checks a task that has already finished (`is_finished`); a live
/// heartbeat task is left running for the caller to abort, since polling it
/// further here would just be racing `select!` a second time.
async fn aggregate_with_heartbeat(
    reader_error: GatewayError,
    heartbeat_task: &mut tokio::task::JoinHandle<Result<std::convert::Infallible, HeartbeatLost>>,
) -> GatewayError {
    if !heartbeat_task.is_finished() {
        return reader_error;
    }

    let heartbeat_error = match heartbeat_task.await {
        Ok(Err(HeartbeatLost)) => GatewayError::from_kind(GatewayErrorKind::HeartbeatLost),
        Ok(Ok(never)) => match never {},
        Err(join_error) => {
            GatewayError::from_kind(GatewayErrorKind::HeartbeatLost).with_source(join_error)
        }
    };

    GatewayError::from_kind(GatewayErrorKind::Multiple(vec![reader_error, heartbeat_error]))
}

/// A close the connection loop wants to perform before returning, paired
/// with the error that should drive the next [`Outcome`].
type PendingClose = (u16, &'static str, GatewayError);

#[allow(clippy::too_many_arguments)]
fn handle_payload(
    text: &str,
    session: &Session,
    stage: &StageCell,
    on_dispatch: &Callback,
    backoff: &Backoff,
    trigger: &heartbeat::HeartbeatTrigger,
    heartbeat_state: &HeartbeatState,
) -> Result<Option<PendingClose>, GatewayError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(|source| {
        GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None }).with_source(source)
    })?;

    let event = GatewayEvent::from_envelope(envelope).map_err(|source| {
        GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None }).with_source(source)
    })?;

    match event {
        GatewayEvent::Hello { .. } => {
            tracing::debug!("ignoring unexpected second Hello");

            Ok(None)
        }
        GatewayEvent::Heartbeat => {
            trigger.request();
            Ok(None)
        }
        GatewayEvent::HeartbeatAck => {
            heartbeat_state.acknowledge();
            Ok(None)
        }
        GatewayEvent::Reconnect => {
            let error = GatewayError::from_kind(GatewayErrorKind::GatewayReconnect);
            let code = close_code_for(&error);

            Ok(Some((code, "reconnect requested", error)))
        }
        GatewayEvent::InvalidSession { resumable } => {
            if !resumable {
                session.invalidate();
            }

            let error = GatewayError::from_kind(GatewayErrorKind::SessionInvalidated { resumable });
            let code = close_code_for(&error);

            Ok(Some((code, "session invalidated", error)))
        }
        GatewayEvent::Dispatch { seq, event_type, data } => {
            session.set_last_sequence(seq);

            match event_type.as_str() {
                "READY" => {
                    let session_id = data
                        .get("session_id")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default();
                    let resume_gateway_url = data
                        .get("resume_gateway_url")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default();

                    session.mark_ready(session_id, resume_gateway_url);
                    stage.set(Stage::Connected);
                    backoff.reset();
                }
                "RESUMED" => {
                    stage.set(Stage::Connected);
                    backoff.reset();
                }
                _ => {}
            }

            dispatch::emit(
                on_dispatch,
                DispatchEvent {
                    name: event_type,
                    data,
                    seq,
                },
            );

            Ok(None)
        }
    }
}

async fn next_payload(
    transport: &Transport,
    decoder: &mut Decoder,
    session: &Session,
) -> Result<Option<String>, GatewayError> {
    match transport.receive_frame().await? {
        Frame::Text(text) => decoder.feed_text(text).map_err(|source| {
            GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None }).with_source(source)
        }),
        Frame::Binary(bytes) => decoder.feed_binary(&bytes).map_err(|source| {
            GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None }).with_source(source)
        }),
        Frame::Close { code, reason } => Err(classify_close(code, reason, session)),
    }
}

/// Classify a received close frame into a [`GatewayError`], invalidating
/// `session` when the code falls into [`CloseClassification::SessionInvalidating`]
/// — the same session fields op-9 `resumable = false` clears, since both mean
/// the same thing to the next connection attempt: identify fresh.
fn classify_close(code: Option<u16>, reason: Option<String>, session: &Session) -> GatewayError {
    let Some(code) = code else {
        return GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None });
    };

    match close::classify(code) {
        CloseClassification::Fatal => match code {
            close::AUTHENTICATION_FAILED => {
                GatewayError::from_kind(GatewayErrorKind::AuthenticationFailed { reason })
            }
            close::DISALLOWED_INTENTS => {
                GatewayError::from_kind(GatewayErrorKind::PrivilegedIntents { disallowed: true })
            }
            close::INVALID_INTENTS => {
                GatewayError::from_kind(GatewayErrorKind::PrivilegedIntents { disallowed: false })
            }
            _ => GatewayError::from_kind(GatewayErrorKind::ClientError {
                close_code: Some(code),
            }),
        },
        CloseClassification::SessionInvalidating => {
            session.invalidate();
            GatewayError::from_kind(GatewayErrorKind::SessionInvalidated { resumable: false })
        }
        CloseClassification::Transient => {
            GatewayError::from_kind(GatewayErrorKind::ConnectionClosed {
                close_code: Some(code),
            })
        }
    }
}

/// The close code the client should send when tearing down its own side of
/// the connection in response to `error`.
///
/// Per the gateway's close-code contract, the client only ever sends one of
/// two codes: `1000` for an intentional shutdown or a non-resumable
/// invalidation (nothing worth preserving), and `4000` for anything where the
/// client wants the next attempt to resume.
fn close_code_for(error: &GatewayError) -> u16 {
    if error.is_fatal() || error.is_session_invalidating() {
        1000
    } else {
        4000
    }
}

fn to_outcome(config: &Config, error: GatewayError) -> Outcome {
    if error.is_fatal() {
        return Outcome::Fatal(error);
    }

    if !config.reconnect() {
        return match GatewayInterrupt::from_kind(error.kind()) {
            Some(interrupt) => Outcome::Interrupt(interrupt),
            None => Outcome::Fatal(error),
        };
    }

    if error.is_session_invalidating() {
        Outcome::Retry(RetryClass::SessionInvalidating)
    } else {
        Outcome::Retry(RetryClass::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_close_code_is_transient_retry() {
        let config = Config::builder("t").build();
        let session = Session::new();
        let error = classify_close(Some(1006), None, &session);
        assert!(matches!(
            to_outcome(&config, error),
            Outcome::Retry(RetryClass::Transient)
        ));
    }

    #[test]
    fn invalid_seq_close_code_invalidates_session() {
        let config = Config::builder("t").build();
        let session = Session::new();
        session.mark_ready("abc", "wss://resume.example");
        session.set_last_sequence(42);

        let error = classify_close(Some(4007), None, &session);

        assert!(matches!(
            to_outcome(&config, error),
            Outcome::Retry(RetryClass::SessionInvalidating)
        ));
        assert_eq!(session.mode(), Mode::Fresh);
        assert!(session.session_id().is_none());
        assert!(session.resume_gateway_url().is_none());
    }

    #[test]
    fn rate_limited_and_session_timed_out_also_invalidate_session() {
        for code in [close::RATE_LIMITED, close::SESSION_TIMED_OUT] {
            let session = Session::new();
            session.mark_ready("abc", "wss://resume.example");

            classify_close(Some(code), None, &session);

            assert!(session.session_id().is_none(), "code {code}");
        }
    }

    #[test]
    fn authentication_failure_is_fatal() {
        let config = Config::builder("t").build();
        let session = Session::new();
        let error = classify_close(Some(4004), None, &session);
        assert!(matches!(to_outcome(&config, error), Outcome::Fatal(_)));
    }

    #[test]
    fn disabled_reconnect_surfaces_interrupt_for_recoverable_kinds() {
        let config = Config::builder("t").reconnect(false).build();
        let error = GatewayError::from_kind(GatewayErrorKind::HeartbeatLost);
        assert!(matches!(to_outcome(&config, error), Outcome::Interrupt(_)));
    }

    #[test]
    fn close_code_for_fatal_and_non_resumable_invalidation_is_1000() {
        let fatal = GatewayError::from_kind(GatewayErrorKind::AuthenticationFailed { reason: None });
        assert_eq!(close_code_for(&fatal), 1000);

        let invalidated = GatewayError::from_kind(GatewayErrorKind::SessionInvalidated {
            resumable: false,
        });
        assert_eq!(close_code_for(&invalidated), 1000);
    }

    #[test]
    fn close_code_for_resumable_outcomes_is_4000() {
        let reconnect = GatewayError::from_kind(GatewayErrorKind::GatewayReconnect);
        assert_eq!(close_code_for(&reconnect), 4000);

        let heartbeat_lost = GatewayError::from_kind(GatewayErrorKind::HeartbeatLost);
        assert_eq!(close_code_for(&heartbeat_lost), 4000);

        let resumable_invalidation = GatewayError::from_kind(GatewayErrorKind::SessionInvalidated {
            resumable: true,
        });
        assert_eq!(close_code_for(&resumable_invalidation), 4000);
    }

    /// Drives `run_with_transport` over a [`Transport::fake`] pair through
    /// Hello → Identify → Ready, a server-requested heartbeat, a Reconnect,
    /// and the subsequent attempt's Resume, asserting on the dispatch events
    /// and session state the real connection loop produces at each step.
    ///
    /// No real socket, no real Discord: `FakePeer` plays the gateway side
    /// entirely in-process.
    #[tokio::test]
    async fn full_lifecycle_hello_identify_ready_reconnect_resume() {
        let config = Arc::new(Config::builder("Bot t").zlib_stream(false).build());
        let session = Arc::new(Session::new());
        let stage = Arc::new(StageCell::new());
        let backoff = Arc::new(Backoff::new());

        let received = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let received_for_callback = Arc::clone(&received);
        let on_dispatch: Callback = Arc::new(move |event| {
            received_for_callback
                .lock()
                .expect("received poisoned")
                .push(event.name);
        });

        // First attempt: fresh identify.
        let (transport, peer) = Transport::fake();
        let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let run_task = tokio::spawn(run_with_transport(
            Arc::clone(&config),
            transport,
            Arc::clone(&session),
            Arc::clone(&stage),
            Arc::clone(&on_dispatch),
            Arc::clone(&backoff),
            shutdown_rx,
        ));

        peer.send_text(r#"{"op":10,"d":{"heartbeat_interval":45000}}"#);

        let identify = peer.recv().await.expect("client sends Identify");
        match identify {
            Frame::Text(text) => {
                assert!(text.contains(r#""op":2"#), "expected Identify, got {text}");
            }
            other => panic!("expected a text frame, got {other:?}"),
        }

        assert_eq!(stage.get(), Stage::Identifying);

        peer.send_text(
            r#"{"op":0,"s":1,"t":"READY","d":{"session_id":"sess-1","resume_gateway_url":"wss://resume.example"}}"#,
        );

        // Drain until the dispatch callback has actually observed READY:
        // the heartbeat task and the reader both run on the same executor,
        // so a single yield isn't guaranteed to be enough.
        for _ in 0..100 {
            if received.lock().expect("received poisoned").contains(&"READY".to_owned()) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(
            received.lock().expect("received poisoned").as_slice(),
            ["READY"]
        );
        assert_eq!(stage.get(), Stage::Connected);
        assert_eq!(session.mode(), Mode::Resuming);
        assert_eq!(session.session_id().as_deref(), Some("sess-1"));
        assert_eq!(
            session.resume_gateway_url().as_deref(),
            Some("wss://resume.example")
        );

        // Server requests an on-demand heartbeat (op 1); the client must
        // answer with one without the connection tearing down.
        peer.send_text(r#"{"op":1}"#);

        let heartbeat_reply = peer.recv().await.expect("client answers the heartbeat request");
        match heartbeat_reply {
            Frame::Text(text) => assert!(text.contains(r#""op":1"#), "expected Heartbeat, got {text}"),
            other => panic!("expected a text frame, got {other:?}"),
        }

        // Server asks the client to reconnect and resume.
        peer.send_text(r#"{"op":7}"#);

        let outcome = run_task.await.expect("run_with_transport task panicked");
        assert!(matches!(
            outcome,
            Outcome::Retry(RetryClass::Transient)
        ));
        assert_eq!(session.mode(), Mode::Resuming);
        assert_eq!(session.session_id().as_deref(), Some("sess-1"));

        // Second attempt: the session is still resumable, so this attempt
        // must send Resume, not Identify.
        let (transport, peer) = Transport::fake();
        let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let run_task = tokio::spawn(run_with_transport(
            Arc::clone(&config),
            transport,
            Arc::clone(&session),
            Arc::clone(&stage),
            Arc::clone(&on_dispatch),
            Arc::clone(&backoff),
            shutdown_rx,
        ));

        peer.send_text(r#"{"op":10,"d":{"heartbeat_interval":45000}}"#);

        let resume = peer.recv().await.expect("client sends Resume");
        match resume {
            Frame::Text(text) => {
                assert!(text.contains(r#""op":6"#), "expected Resume, got {text}");
                assert!(text.contains("sess-1"));
            }
            other => panic!("expected a text frame, got {other:?}"),
        }

        assert_eq!(stage.get(), Stage::Resuming);

        peer.send_text(r#"{"op":0,"s":2,"t":"RESUMED","d":{}}"#);

        for _ in 0..100 {
            if received.lock().expect("received poisoned").contains(&"RESUMED".to_owned()) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(stage.get(), Stage::Connected);
        assert_eq!(
            received.lock().expect("received poisoned").as_slice(),
            ["READY", "RESUMED"]
        );

        // Tear the second connection down cooperatively so the spawned task
        // and its heartbeat task exit instead of leaking past the test.
        drop(peer);
        let _ = run_task.await;
    }
}
