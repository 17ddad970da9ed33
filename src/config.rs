//! Immutable per-connection configuration.

use crate::{intents::Intents, model::IdentifyProperties};
use std::{
    env::consts::OS,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Minimum value of an acceptable [`Config::large_threshold`].
pub const LARGE_THRESHOLD_MINIMUM: u16 = 50;
/// Maximum value of an acceptable [`Config::large_threshold`].
pub const LARGE_THRESHOLD_MAXIMUM: u16 = 250;

/// Large threshold configuration is invalid.
///
/// Returned by [`ConfigBuilder::large_threshold`].
#[derive(Debug)]
pub struct LargeThresholdError {
    kind: LargeThresholdErrorType,
}

impl LargeThresholdError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &LargeThresholdErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[allow(clippy::unused_self)]
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        None
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (LargeThresholdErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, None)
    }
}

impl Display for LargeThresholdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            LargeThresholdErrorType::TooFew { .. } => {
                write!(f, "provided large threshold value is fewer than {LARGE_THRESHOLD_MINIMUM}")
            }
            LargeThresholdErrorType::TooMany { .. } => {
                write!(f, "provided large threshold value is more than {LARGE_THRESHOLD_MAXIMUM}")
            }
        }
    }
}

impl Error for LargeThresholdError {}

/// Type of [`LargeThresholdError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum LargeThresholdErrorType {
    /// Provided large threshold value is too few in number.
    TooFew {
        /// Provided value.
        value: u16,
    },
    /// Provided large threshold value is too many in number.
    TooMany {
        /// Provided value.
        value: u16,
    },
}

/// Configuration used to authenticate and operate a gateway connection.
///
/// Build one with [`Config::builder`].
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) token: String,
    pub(crate) intents: Intents,
    pub(crate) zlib_stream: bool,
    pub(crate) large_threshold: u16,
    pub(crate) presence: Option<serde_json::Value>,
    pub(crate) identify_properties: IdentifyProperties,
    pub(crate) reconnect: bool,
}

impl Config {
    /// Start building a new configuration for the given token.
    ///
    /// The token is sent verbatim as the `Authorization` header value of the
    /// `Identify` payload's bearer; callers are responsible for prefixing it
    /// with the authentication scheme Discord expects (e.g. `"Bot "`).
    pub fn builder(token: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(token.into())
    }

    /// The configured token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The configured intents.
    pub const fn intents(&self) -> Intents {
        self.intents
    }

    /// Whether zlib-stream transport compression is enabled.
    pub const fn zlib_stream(&self) -> bool {
        self.zlib_stream
    }

    /// Whether the reconnect controller will automatically retry recoverable
    /// failures.
    pub const fn reconnect(&self) -> bool {
        self.reconnect
    }

    pub(crate) const fn large_threshold(&self) -> u16 {
        self.large_threshold
    }

    pub(crate) fn presence(&self) -> Option<&serde_json::Value> {
        self.presence.as_ref()
    }

    pub(crate) fn identify_properties(&self) -> &IdentifyProperties {
        &self.identify_properties
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    fn new(token: String) -> Self {
        Self(Config {
            token,
            intents: Intents::empty(),
            zlib_stream: true,
            large_threshold: LARGE_THRESHOLD_MINIMUM,
            presence: None,
            identify_properties: IdentifyProperties::new("portcullis", "portcullis", OS),
            reconnect: true,
        })
    }

    /// Consume the builder, returning the completed configuration.
    #[must_use = "must be used to construct the config"]
    pub fn build(self) -> Config {
        self.0
    }

    /// Set the intents requested on identify.
    pub const fn intents(mut self, intents: Intents) -> Self {
        self.0.intents = intents;
        self
    }

    /// Enable or disable zlib-stream transport compression.
    pub const fn zlib_stream(mut self, enabled: bool) -> Self {
        self.0.zlib_stream = enabled;
        self
    }

    /// Set the large-guild member threshold.
    ///
    /// Returns a [`LargeThresholdErrorType::TooFew`] error type if the
    /// provided value is below [`LARGE_THRESHOLD_MINIMUM`].
    ///
    /// Returns a [`LargeThresholdErrorType::TooMany`] error type if the
    /// provided value is above [`LARGE_THRESHOLD_MAXIMUM`].
    #[allow(clippy::missing_const_for_fn)]
    pub fn large_threshold(mut self, threshold: u16) -> Result<Self, LargeThresholdError> {
        match threshold {
            0..=49 => {
                return Err(LargeThresholdError {
                    kind: LargeThresholdErrorType::TooFew { value: threshold },
                })
            }
            50..=250 => {}
            251..=u16::MAX => {
                return Err(LargeThresholdError {
                    kind: LargeThresholdErrorType::TooMany { value: threshold },
                })
            }
        }

        self.0.large_threshold = threshold;
        Ok(self)
    }

    /// Set the initial presence sent on identify.
    pub fn presence(mut self, presence: serde_json::Value) -> Self {
        self.0.presence = Some(presence);
        self
    }

    /// Override the default `os`/`browser`/`device` identification
    /// properties.
    pub fn identify_properties(mut self, properties: IdentifyProperties) -> Self {
        self.0.identify_properties = properties;
        self
    }

    /// Enable or disable automatic reconnection.
    ///
    /// When disabled, the client surfaces [`GatewayInterrupt`]-convertible
    /// errors to the caller instead of transparently resuming or
    /// re-identifying.
    ///
    /// [`GatewayInterrupt`]: crate::error::GatewayInterrupt
    pub const fn reconnect(mut self, enabled: bool) -> Self {
        self.0.reconnect = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = Config::builder("Bot token").build();
        assert_eq!(config.token(), "Bot token");
        assert_eq!(config.intents(), Intents::empty());
        assert!(config.zlib_stream());
        assert!(config.reconnect());
        assert_eq!(config.large_threshold(), LARGE_THRESHOLD_MINIMUM);
    }

    #[test]
    fn rejects_too_few() {
        let error = Config::builder("t").large_threshold(10).unwrap_err();
        assert!(matches!(
            error.kind(),
            LargeThresholdErrorType::TooFew { value: 10 }
        ));
    }

    #[test]
    fn rejects_too_many() {
        let error = Config::builder("t").large_threshold(300).unwrap_err();
        assert!(matches!(
            error.kind(),
            LargeThresholdErrorType::TooMany { value: 300 }
        ));
    }
}
