//! Client configuration and protocol constants.

use crate::error::{Result, RiapError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire protocol constants.
pub struct FrameConfig;

impl FrameConfig {
    /// Encoded requests up to this many bytes use the short `j` frame.
    pub const SHORT_FRAME_MAX_LEN: usize = 1000;
    pub const LINE_TERMINATOR: &'static [u8] = b"\r\n";
    pub const SHORT_FRAME_PREFIX: u8 = b'j';
    pub const LONG_FRAME_PREFIX: u8 = b'J';
    /// Longest accepted `J<length>` header line, terminator included.
    pub const MAX_HEADER_LINE_LEN: u64 = 32;
}

/// Configuration for a [`RiapClient`](crate::RiapClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ClientConfig {
    /// Additional connect attempts after the first one.
    pub retries: u32,
    /// Pause between connect attempts, in seconds on the wire.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    /// Maximum number of cached connections.
    pub connection_cache_size: usize,
    /// Deadline for one connect or spawn. `None` waits forever.
    #[serde(with = "option_duration_secs")]
    pub connect_timeout: Option<Duration>,
    /// Deadline for one send+receive cycle. `None` waits forever.
    #[serde(with = "option_duration_secs")]
    pub io_timeout: Option<Duration>,
    /// Largest response length a peer may declare.
    pub max_response_size: usize,
}

impl ClientConfig {
    pub const DEFAULT_RETRIES: u32 = 2;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
    pub const DEFAULT_CONNECTION_CACHE_SIZE: usize = 32;
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of additional connect attempts.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the pause between connect attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the connection cache capacity.
    pub fn with_connection_cache_size(mut self, size: usize) -> Self {
        self.connection_cache_size = size;
        self
    }

    /// Set or clear the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set or clear the exchange deadline.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the largest accepted response length.
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connection_cache_size == 0 {
            return Err(RiapError::Config {
                message: "connection_cache_size must be positive".to_string(),
            });
        }
        if self.max_response_size == 0 {
            return Err(RiapError::Config {
                message: "max_response_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            connection_cache_size: Self::DEFAULT_CONNECTION_CACHE_SIZE,
            connect_timeout: Some(Self::DEFAULT_CONNECT_TIMEOUT),
            io_timeout: Some(Self::DEFAULT_IO_TIMEOUT),
            max_response_size: Self::DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// `Duration` as fractional seconds.
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// `Option<Duration>` as fractional seconds, `null` for none.
mod option_duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
