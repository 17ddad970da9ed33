//! The error taxonomy surfaced by the gateway client.
//!
//! Every fallible operation in this crate eventually bottoms out in a
//! [`GatewayError`]: a `kind` identifying what went wrong plus an optional
//! boxed `source`. This mirrors how the rest of the Twilight ecosystem shapes
//! its errors, so callers get a stable `kind` to match on without losing the
//! underlying cause for logging.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Error produced by the gateway client.
#[derive(Debug)]
pub struct GatewayError {
    pub(crate) kind: GatewayErrorKind,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
}

impl GatewayError {
    /// Create an error with no source.
    pub(crate) fn from_kind(kind: GatewayErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Attach a source to an error, consuming and returning it.
    pub(crate) fn with_source(
        mut self,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Immutable reference to the type of error that occurred.
    pub const fn kind(&self) -> &GatewayErrorKind {
        &self.kind
    }

    /// Consume the error, returning its kind and source separately.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (GatewayErrorKind, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }

    /// Whether this error is fatal: the connection must not be retried.
    ///
    /// A [`GatewayErrorKind::Multiple`] is fatal if any constituent is, so a
    /// reader failure racing a heartbeat-lost signal can't accidentally hide
    /// a fatal close behind a retryable one.
    pub fn is_fatal(&self) -> bool {
        match &self.kind {
            GatewayErrorKind::AuthenticationFailed { .. }
            | GatewayErrorKind::PrivilegedIntents { .. } => true,
            GatewayErrorKind::Multiple(errors) => errors.iter().any(GatewayError::is_fatal),
            _ => false,
        }
    }

    /// Whether this error should be recovered from by resuming the existing
    /// session rather than starting a fresh one.
    pub fn is_resumable(&self) -> bool {
        match &self.kind {
            GatewayErrorKind::GatewayReconnect | GatewayErrorKind::HeartbeatLost => true,
            GatewayErrorKind::SessionInvalidated { resumable } => *resumable,
            GatewayErrorKind::Multiple(errors) => {
                !self.is_fatal() && errors.iter().any(GatewayError::is_resumable)
            }
            _ => false,
        }
    }

    /// Whether this error invalidates the session outright and requires a
    /// fresh identify.
    pub fn is_session_invalidating(&self) -> bool {
        match &self.kind {
            GatewayErrorKind::SessionInvalidated { resumable: false } => true,
            GatewayErrorKind::Multiple(errors) => {
                !self.is_fatal() && errors.iter().any(GatewayError::is_session_invalidating)
            }
            _ => false,
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            GatewayErrorKind::AuthenticationFailed { reason } => {
                f.write_str("authentication with the gateway failed")?;

                if let Some(reason) = reason {
                    f.write_str(": ")?;
                    f.write_str(reason)?;
                }

                Ok(())
            }
            GatewayErrorKind::PrivilegedIntents { disallowed } => {
                if *disallowed {
                    f.write_str("the current application is not allowlisted for one or more of the requested privileged intents")
                } else {
                    f.write_str("one or more of the requested intents are not valid")
                }
            }
            GatewayErrorKind::ClientError { close_code } => {
                f.write_str("the gateway closed the connection with an unclassifiable or client-side error")?;

                if let Some(code) = close_code {
                    write!(f, " (code {code})")?;
                }

                Ok(())
            }
            GatewayErrorKind::ConnectionClosed { close_code } => {
                f.write_str("the websocket connection closed")?;

                if let Some(code) = close_code {
                    write!(f, " (code {code})")?;
                }

                Ok(())
            }
            GatewayErrorKind::HeartbeatLost => {
                f.write_str("no heartbeat acknowledgement was received within one interval")
            }
            GatewayErrorKind::GatewayReconnect => {
                f.write_str("the gateway requested a reconnect")
            }
            GatewayErrorKind::SessionInvalidated { resumable } => {
                write!(f, "the session was invalidated (resumable: {resumable})")
            }
            GatewayErrorKind::Multiple(errors) => {
                write!(f, "{} concurrent tasks failed: ", errors.len())?;

                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }

                    Display::fmt(error, f)?;
                }

                Ok(())
            }
        }
    }
}

impl StdError for GatewayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`GatewayError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum GatewayErrorKind {
    /// The provided authorization token was rejected (close code 4004).
    AuthenticationFailed {
        /// Reason string provided by the server's close frame, if any.
        reason: Option<String>,
    },
    /// The configured intents are invalid or disallowed for this application
    /// (close codes 4013/4014).
    PrivilegedIntents {
        /// `true` for "disallowed" (4014), `false` for "invalid" (4013).
        disallowed: bool,
    },
    /// An unexpected protocol violation occurred that could not be
    /// classified as transient; the connection is not retryable.
    ClientError {
        /// Close code that produced this error, if the failure originated
        /// from a close frame.
        close_code: Option<u16>,
    },
    /// The transport closed outside of the other classified close codes.
    /// The reconnect controller decides whether to retry.
    ConnectionClosed {
        /// Close code reported by the transport, if any.
        close_code: Option<u16>,
    },
    /// No heartbeat acknowledgement arrived within one heartbeat interval.
    HeartbeatLost,
    /// The gateway sent opcode 7 (Reconnect).
    GatewayReconnect,
    /// The gateway sent opcode 9 (InvalidSession).
    SessionInvalidated {
        /// Whether the server indicated the session may be resumed.
        resumable: bool,
    },
    /// More than one concurrent task (the reader and the heart) failed; all
    /// constituent errors are reported together so none are silently
    /// discarded.
    Multiple(Vec<GatewayError>),
}

/// The subset of [`GatewayErrorKind`] that is recoverable when automatic
/// reconnection is disabled.
///
/// This is the "abstract parent" of the three recoverable error kinds
/// described by the gateway's reconnection contract: a caller that opts out
/// of automatic reconnection (`reconnect: false`) receives one of these
/// instead of having the connection silently re-established.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum GatewayInterrupt {
    /// No heartbeat acknowledgement arrived in time.
    HeartbeatLost,
    /// The gateway asked the client to reconnect.
    GatewayReconnect,
    /// The session was invalidated.
    SessionInvalidated {
        /// Whether the session may be resumed.
        resumable: bool,
    },
}

impl GatewayInterrupt {
    /// Attempt to interpret an error's kind as a recoverable interrupt.
    ///
    /// Returns `None` for fatal or unclassified kinds, which callers should
    /// treat as non-recoverable instead.
    pub const fn from_kind(kind: &GatewayErrorKind) -> Option<Self> {
        match kind {
            GatewayErrorKind::HeartbeatLost => Some(Self::HeartbeatLost),
            GatewayErrorKind::GatewayReconnect => Some(Self::GatewayReconnect),
            GatewayErrorKind::SessionInvalidated { resumable } => {
                Some(Self::SessionInvalidated {
                    resumable: *resumable,
                })
            }
            _ => None,
        }
    }
}

impl Display for GatewayInterrupt {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::HeartbeatLost => f.write_str("heartbeat lost"),
            Self::GatewayReconnect => f.write_str("gateway requested reconnect"),
            Self::SessionInvalidated { resumable } => {
                write!(f, "session invalidated (resumable: {resumable})")
            }
        }
    }
}

impl StdError for GatewayInterrupt {}

#[cfg(test)]
mod tests {
    use super::{GatewayError, GatewayErrorKind, GatewayInterrupt};

    #[test]
    fn fatal_kinds() {
        let auth = GatewayError::from_kind(GatewayErrorKind::AuthenticationFailed {
            reason: None,
        });
        assert!(auth.is_fatal());

        let intents = GatewayError::from_kind(GatewayErrorKind::PrivilegedIntents {
            disallowed: true,
        });
        assert!(intents.is_fatal());

        let closed = GatewayError::from_kind(GatewayErrorKind::ConnectionClosed {
            close_code: Some(1006),
        });
        assert!(!closed.is_fatal());
    }

    #[test]
    fn resumable_vs_invalidating() {
        let resumable = GatewayError::from_kind(GatewayErrorKind::SessionInvalidated {
            resumable: true,
        });
        assert!(resumable.is_resumable());
        assert!(!resumable.is_session_invalidating());

        let fresh = GatewayError::from_kind(GatewayErrorKind::SessionInvalidated {
            resumable: false,
        });
        assert!(!fresh.is_resumable());
        assert!(fresh.is_session_invalidating());
    }

    #[test]
    fn interrupt_conversion() {
        assert_eq!(
            GatewayInterrupt::from_kind(&GatewayErrorKind::HeartbeatLost),
            Some(GatewayInterrupt::HeartbeatLost)
        );
        assert_eq!(
            GatewayInterrupt::from_kind(&GatewayErrorKind::AuthenticationFailed { reason: None }),
            None
        );
    }
}
