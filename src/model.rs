//! The gateway wire format: inbound/outbound payload shapes and opcodes.
//!
//! Dispatch payloads are forwarded to the caller as opaque JSON (this crate
//! does not model Discord's hundreds of event bodies); only the handful of
//! control payloads the connection loop itself must act on are typed.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A gateway opcode.
///
/// Kept as a plain `u8` newtype rather than a `bitflags`/`repr(u8)` enum with
/// exhaustive variants: unrecognized opcodes must round-trip harmlessly
/// rather than fail to parse, since Discord may add opcodes this crate
/// doesn't yet know about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpCode(pub u8);

impl OpCode {
    pub const DISPATCH: OpCode = OpCode(0);
    pub const HEARTBEAT: OpCode = OpCode(1);
    pub const IDENTIFY: OpCode = OpCode(2);
    pub const PRESENCE_UPDATE: OpCode = OpCode(3);
    pub const RECONNECT: OpCode = OpCode(7);
    pub const RESUME: OpCode = OpCode(6);
    pub const INVALID_SESSION: OpCode = OpCode(9);
    pub const HELLO: OpCode = OpCode(10);
    pub const HEARTBEAT_ACK: OpCode = OpCode(11);
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A gateway payload envelope as received from the wire, before the opcode
/// has been classified.
///
/// Matches the `op`/`d`/`s`/`t` shape Discord's documentation describes:
/// `s` is only ever present on dispatch payloads, `t` only on dispatch
/// payloads naming the event.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// A classified inbound gateway event, after `op` has been interpreted.
#[derive(Debug)]
pub enum GatewayEvent {
    /// `op = 0`. Carries the event name, sequence, and raw payload body.
    Dispatch {
        seq: u64,
        event_type: String,
        data: serde_json::Value,
    },
    /// `op = 1`. The server is requesting an immediate heartbeat.
    Heartbeat,
    /// `op = 7`. The server wants the client to reconnect and resume.
    Reconnect,
    /// `op = 9`. `d` is whether the session may be resumed.
    InvalidSession { resumable: bool },
    /// `op = 10`. Carries the heartbeat interval in milliseconds.
    Hello { heartbeat_interval: u64 },
    /// `op = 11`. Acknowledges a previously sent heartbeat.
    HeartbeatAck,
}

/// Error produced when an [`Envelope`] can't be classified into a
/// [`GatewayEvent`].
#[derive(Debug)]
pub struct UnknownOpCode(pub u8);

impl Display for UnknownOpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized inbound opcode {}", self.0)
    }
}

impl std::error::Error for UnknownOpCode {}

impl GatewayEvent {
    /// Classify a deserialized envelope.
    ///
    /// Unknown opcodes are rejected rather than silently ignored: a change
    /// to the gateway protocol this crate doesn't understand yet should be
    /// visible, not swallowed.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, UnknownOpCode> {
        Ok(match envelope.op {
            0 => GatewayEvent::Dispatch {
                seq: envelope.s.unwrap_or_default(),
                event_type: envelope.t.unwrap_or_default(),
                data: envelope.d,
            },
            1 => GatewayEvent::Heartbeat,
            7 => GatewayEvent::Reconnect,
            9 => GatewayEvent::InvalidSession {
                resumable: envelope.d.as_bool().unwrap_or(false),
            },
            10 => {
                let heartbeat_interval = envelope
                    .d
                    .get("heartbeat_interval")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or_default();

                GatewayEvent::Hello { heartbeat_interval }
            }
            11 => GatewayEvent::HeartbeatAck,
            other => return Err(UnknownOpCode(other)),
        })
    }
}

/// `os`/`browser`/`device` identification properties sent with [`Identify`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl IdentifyProperties {
    /// Build a new set of properties.
    pub fn new(os: impl Into<String>, browser: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
        }
    }
}

/// Outbound `op = 2` payload: establishes a brand-new session.
#[derive(Debug, Serialize)]
pub struct Identify {
    pub op: u8,
    pub d: IdentifyInfo,
}

/// The body of an [`Identify`] payload.
#[derive(Debug, Serialize)]
pub struct IdentifyInfo {
    pub token: String,
    pub intents: u64,
    pub properties: IdentifyProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<serde_json::Value>,
    pub large_threshold: u16,
    pub compress: bool,
}

impl Identify {
    pub fn new(info: IdentifyInfo) -> Self {
        Self {
            op: OpCode::IDENTIFY.0,
            d: info,
        }
    }
}

/// Outbound `op = 6` payload: resumes an existing session.
#[derive(Debug, Serialize)]
pub struct Resume {
    pub op: u8,
    pub d: ResumeInfo,
}

#[derive(Debug, Serialize)]
pub struct ResumeInfo {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

impl Resume {
    pub fn new(token: impl Into<String>, session_id: impl Into<String>, seq: u64) -> Self {
        Self {
            op: OpCode::RESUME.0,
            d: ResumeInfo {
                token: token.into(),
                session_id: session_id.into(),
                seq,
            },
        }
    }
}

/// Outbound/inbound `op = 1` payload: the heartbeat.
#[derive(Debug, Serialize)]
pub struct Heartbeat {
    pub op: u8,
    pub d: Option<u64>,
}

impl Heartbeat {
    pub fn new(seq: Option<u64>) -> Self {
        Self {
            op: OpCode::HEARTBEAT.0,
            d: seq,
        }
    }
}

/// A dispatch event forwarded to the caller's handler.
///
/// The data body is forwarded verbatim; this crate does not cache or
/// interpret it beyond routing by `name`.
#[derive(Clone, Debug)]
pub struct DispatchEvent {
    /// The `t` field: the event's name, e.g. `"MESSAGE_CREATE"`.
    pub name: String,
    /// The raw `d` body.
    pub data: serde_json::Value,
    /// The `s` sequence this dispatch was received at.
    pub seq: u64,
}
