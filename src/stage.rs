//! The externally observable connection stage.
//!
//! [`Stage`] is telemetry only: the connection loop's actual control flow is
//! driven by [`crate::model::GatewayEvent`] and [`crate::error::GatewayError`],
//! not by matching on a `Stage` value. It exists so a caller inspecting a
//! running connection (e.g. for a status page) has something more specific
//! than "connected or not".

use std::{
    convert::TryFrom,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::atomic::{AtomicU8, Ordering},
};

/// Reason a raw integer could not be converted into a [`Stage`].
#[derive(Clone, Debug)]
pub enum StageConversionError {
    /// The integer doesn't map to any stage.
    InvalidInteger {
        /// The value that was provided.
        value: u8,
    },
}

impl Display for StageConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::InvalidInteger { value } => write!(f, "the integer {value} is not a valid stage"),
        }
    }
}

impl Error for StageConversionError {}

/// The current connection stage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    /// Fully connected and operating: Ready or Resumed has been received.
    Connected,
    /// No live connection, whether because one hasn't been opened yet or
    /// because the connection loop has stopped retrying.
    Disconnected,
    /// The websocket handshake is underway, up to and including receiving
    /// Hello.
    Handshaking,
    /// Identify has been sent; waiting on Ready.
    Identifying,
    /// Resume has been sent; waiting on Resumed (or a fresh Hello/Ready if
    /// the resume is rejected).
    Resuming,
}

impl Default for Stage {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Handshaking => "Handshaking",
            Self::Identifying => "Identifying",
            Self::Resuming => "Resuming",
        })
    }
}

impl TryFrom<u8> for Stage {
    type Error = StageConversionError;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        Ok(match num {
            0 => Self::Connected,
            1 => Self::Disconnected,
            2 => Self::Handshaking,
            3 => Self::Identifying,
            4 => Self::Resuming,
            other => return Err(StageConversionError::InvalidInteger { value: other }),
        })
    }
}

/// An atomically-readable [`Stage`], shared between the connection loop and
/// anything introspecting it (e.g. a status page) without needing a lock.
#[derive(Debug)]
pub struct StageCell(AtomicU8);

impl StageCell {
    /// Create a cell starting at [`Stage::Disconnected`].
    pub const fn new() -> Self {
        Self(AtomicU8::new(Stage::Disconnected as u8))
    }

    /// Read the current stage.
    pub fn get(&self) -> Stage {
        Stage::try_from(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Set the current stage.
    pub fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Release);
    }
}

impl Default for StageCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Stage;
    use std::convert::TryFrom;

    #[test]
    fn conversion_round_trips() {
        assert_eq!(Stage::Connected, Stage::try_from(0).unwrap());
        assert_eq!(Stage::Disconnected, Stage::try_from(1).unwrap());
        assert_eq!(Stage::Handshaking, Stage::try_from(2).unwrap());
        assert_eq!(Stage::Identifying, Stage::try_from(3).unwrap());
        assert_eq!(Stage::Resuming, Stage::try_from(4).unwrap());
        assert!(Stage::try_from(5).is_err());
    }

    #[test]
    fn formatting() {
        assert_eq!("Connected", Stage::Connected.to_string());
        assert_eq!("Resuming", Stage::Resuming.to_string());
    }

    #[test]
    fn cell_starts_disconnected_and_tracks_updates() {
        use super::StageCell;

        let cell = StageCell::new();
        assert_eq!(cell.get(), Stage::Disconnected);

        cell.set(Stage::Handshaking);
        assert_eq!(cell.get(), Stage::Handshaking);
    }
}
