#![allow(
    clippy::let_unit_value,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::semicolon_if_nothing_returned,
    clippy::used_underscore_binding
)]
#![deny(
    clippy::all,
    clippy::missing_const_for_fn,
    clippy::pedantic,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused,
    warnings
)]
#![doc = include_str!("../README.md")]

mod client;
mod close;
mod compression;
mod config;
mod connection;
mod dispatch;
mod error;
mod heartbeat;
mod intents;
mod model;
mod reconnect;
mod session;
mod stage;
mod transport;

pub use self::{
    client::{Client, RunOutcome},
    close::CloseClassification,
    config::{
        Config, ConfigBuilder, LargeThresholdError, LargeThresholdErrorType,
        LARGE_THRESHOLD_MAXIMUM, LARGE_THRESHOLD_MINIMUM,
    },
    dispatch::Callback,
    error::{GatewayError, GatewayErrorKind, GatewayInterrupt},
    heartbeat::HeartbeatState,
    intents::Intents,
    model::{DispatchEvent, IdentifyProperties},
    reconnect::Backoff,
    session::{Mode, Session},
    stage::Stage,
};

/// Discord API version this crate speaks.
pub const API_VERSION: u8 = 10;

/// Discord's stable, non-sharded gateway endpoint.
///
/// The `/gateway/bot` REST endpoint this crate deliberately does not call
/// (see the crate-level docs) mainly exists to report shard counts and the
/// session-start ratelimit; its `url` field is this same constant in
/// practice, so a caller with no shards to coordinate can hand this straight
/// to [`Client::run`].
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg";

#[cfg(not(any(feature = "native", feature = "rustls-native-roots", feature = "rustls-webpki-roots")))]
compile_error!(
    "Either the `native`, `rustls-native-roots` or `rustls-webpki-roots` feature must be enabled."
);

#[cfg(not(feature = "compression"))]
compile_error!("The `compression` feature is currently required (zlib-stream is always compiled in; Config::zlib_stream toggles it at runtime).");
