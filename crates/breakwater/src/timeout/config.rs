// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of a [`TimeoutManager`][super::TimeoutManager].
///
/// Only [`default_timeout`][Self::default_timeout] is used by the manager itself. The connect,
/// read and write timeouts are carried for transport clients that configure their own sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeoutConfig {
    /// Timeout applied when a call does not request one.
    pub default_timeout: Duration,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Timeout for reading a response.
    pub read_timeout: Duration,

    /// Timeout for writing a request.
    pub write_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// Sets the timeout applied when a call does not request one.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Returns a copy with a zero default timeout replaced by 30 seconds.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            default_timeout: if self.default_timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                self.default_timeout
            },
            ..self
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TimeoutConfig::default();

        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_and_normalize() {
        let config = TimeoutConfig::default()
            .default_timeout(Duration::ZERO)
            .connect_timeout(Duration::from_secs(1))
            .read_timeout(Duration::from_secs(2))
            .write_timeout(Duration::from_secs(3))
            .normalized();

        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.write_timeout, Duration::from_secs(3));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_fills_defaults() {
        let config: TimeoutConfig =
            serde_json::from_str(r#"{ "default_timeout": { "secs": 5, "nanos": 0 } }"#).unwrap();

        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }
}
