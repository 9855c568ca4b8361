//! Stub server configuration types and constants.

use std::ops::RangeInclusive;

use crate::error::{Result, StubError};

/// First port of the ephemeral range.
pub const EPHEMERAL_PORT_MIN: u16 = 49152;

/// Last port the stub will pick from the ephemeral range.
pub const EPHEMERAL_PORT_MAX: u16 = 65534;

/// Default number of ports tried before giving up.
pub const DEFAULT_MAX_BIND_ATTEMPTS: usize = 5;

/// Default host name used in the advertised URI.
pub const DEFAULT_HOST: &str = "localhost";

/// Configuration for an [`HttpStub`](crate::HttpStub).
///
/// The defaults match what most tests want: a random port from the
/// ephemeral range, five bind attempts, a `localhost` URI, and no limit on
/// request body size.
///
/// # Example
///
/// ```
/// use httpstub::StubConfig;
///
/// let config = StubConfig::new()
///     .with_port_range(50000..=50100)
///     .with_max_bind_attempts(10);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Host name placed in the advertised URI. The socket always binds loopback.
    pub host: String,
    /// Ports to pick from, inclusive on both ends.
    pub port_range: RangeInclusive<u16>,
    /// How many random ports to try before failing.
    pub max_bind_attempts: usize,
    /// Largest request body the stub will read, in bytes. `None` reads
    /// bodies of any size.
    pub max_body_size: Option<usize>,
}

impl StubConfig {
    /// Create a configuration with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_range: EPHEMERAL_PORT_MIN..=EPHEMERAL_PORT_MAX,
            max_bind_attempts: DEFAULT_MAX_BIND_ATTEMPTS,
            max_body_size: None,
        }
    }

    /// Set the host name used in the advertised URI.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the range of candidate ports.
    #[must_use]
    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }

    /// Set the maximum number of bind attempts.
    #[must_use]
    pub const fn with_max_bind_attempts(mut self, attempts: usize) -> Self {
        self.max_bind_attempts = attempts;
        self
    }

    /// Cap the request body size.
    ///
    /// Requests with a larger body are answered with `413 Payload Too Large`
    /// and are not captured.
    #[must_use]
    pub const fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = Some(size);
        self
    }

    /// Check that the configuration can be used to start a stub.
    pub fn validate(&self) -> Result<()> {
        if self.port_range.is_empty() {
            return Err(StubError::invalid_config(format!(
                "port range {}..={} is empty",
                self.port_range.start(),
                self.port_range.end()
            )));
        }
        if *self.port_range.start() == 0 {
            return Err(StubError::invalid_config("port 0 is not a bindable stub port"));
        }
        if self.max_bind_attempts == 0 {
            return Err(StubError::invalid_config("max_bind_attempts must be at least 1"));
        }
        if self.host.is_empty() {
            return Err(StubError::invalid_config("host must not be empty"));
        }
        Ok(())
    }
}

impl Default for StubConfig {
    fn default() -> Self {
        Self::new()
    }
}
