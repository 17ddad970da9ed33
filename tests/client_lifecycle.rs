//! Exercises the parts of [`portcullis::Client`] that don't require a live
//! connection: construction, stage/session introspection, dispatch-handler
//! registration, and cooperative shutdown as a no-op when nothing is
//! running. A full Hello-to-Ready-to-Resume run isn't covered here since
//! `Client::run` dials a real websocket; see `DESIGN.md` for why this crate
//! doesn't abstract the transport behind a fake for end-to-end tests.

use portcullis::{Client, Config, Stage};

fn client() -> Client {
    Client::new(Config::builder("Bot token").build())
}

#[test]
fn new_client_has_no_session_and_is_disconnected() {
    let client = client();

    assert_eq!(client.stage(), Stage::Disconnected);
    assert!(!client.has_session());
}

#[test]
fn dispatch_handler_can_be_registered_and_replaced() {
    let client = client();

    client.on_dispatch(|_event| {});
    // A second registration replaces the first rather than accumulating;
    // this must not panic or deadlock on the same callback mutex.
    client.on_dispatch(|_event| {});
}

#[test]
fn shutdown_without_a_run_in_progress_is_a_no_op() {
    let client = client();
    client.shutdown();
    client.shutdown();
}
