//! Transfer configuration.
//!
//! Both ends are configured with plain structs that carry sensible defaults;
//! the CLI in `main.rs` maps its flags onto them.  Call `validate` before
//! building an engine; constructors do so and refuse invalid settings.

use std::time::Duration;

use thiserror::Error;

use crate::codec::Encoding;

/// Bytes read from the source per message.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be greater than zero")]
    ZeroWindow,
    #[error("send timeout must be greater than zero")]
    ZeroSendTimeout,
    #[error("receive wait must be greater than zero")]
    ZeroReceiveWait,
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("idle timeout must be greater than zero")]
    ZeroIdleTimeout,
    #[error("start timeout must be greater than zero")]
    ZeroStartTimeout,
}

/// Settings for one outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Maximum number of unacknowledged messages (and their sequence span).
    pub window_size: usize,
    /// Age of the oldest unacknowledged message that forces a go-back-N rewind.
    pub send_timeout: Duration,
    /// Upper bound on one wait for a peer response.
    pub receive_wait: Duration,
    /// Bytes per message.
    pub chunk_size: usize,
    /// Honour selective acknowledgments.
    pub sack: bool,
    pub encoding: Encoding,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            send_timeout: Duration::from_millis(500),
            receive_wait: Duration::from_millis(50),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sack: false,
            encoding: Encoding::Text,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::ZeroSendTimeout);
        }
        if self.receive_wait.is_zero() {
            return Err(ConfigError::ZeroReceiveWait);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

/// Settings for the reference receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Number of sequence numbers buffered beyond the cumulative boundary.
    /// Must match the sender's window size.
    pub window_size: usize,
    /// Report held-but-not-contiguous sequence numbers in acks.
    pub sack: bool,
    pub encoding: Encoding,
    /// Give up if no valid frame arrives this long after starting.  `None`
    /// waits for the sender indefinitely.
    pub start_timeout: Option<Duration>,
    /// Once the stream has begun, give up when nothing arrives for this long
    /// before it completes.
    pub idle_timeout: Duration,
    /// After completion, keep answering retransmissions until the link has
    /// been quiet this long.
    pub linger: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            sack: false,
            encoding: Encoding::Text,
            start_timeout: None,
            idle_timeout: Duration::from_secs(10),
            linger: Duration::from_secs(2),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.idle_timeout.is_zero() || self.linger.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        if self.start_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroStartTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SenderConfig::default().validate(), Ok(()));
        assert_eq!(ReceiverConfig::default().validate(), Ok(()));
    }

    #[test]
    fn sender_rejects_zero_values() {
        let base = SenderConfig::default();
        let cases = [
            (
                SenderConfig {
                    window_size: 0,
                    ..base.clone()
                },
                ConfigError::ZeroWindow,
            ),
            (
                SenderConfig {
                    send_timeout: Duration::ZERO,
                    ..base.clone()
                },
                ConfigError::ZeroSendTimeout,
            ),
            (
                SenderConfig {
                    receive_wait: Duration::ZERO,
                    ..base.clone()
                },
                ConfigError::ZeroReceiveWait,
            ),
            (
                SenderConfig {
                    chunk_size: 0,
                    ..base
                },
                ConfigError::ZeroChunkSize,
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn receiver_rejects_zero_window() {
        let config = ReceiverConfig {
            window_size: 0,
            ..ReceiverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn receiver_rejects_zero_start_timeout() {
        let config = ReceiverConfig {
            start_timeout: Some(Duration::ZERO),
            ..ReceiverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroStartTimeout));
    }
}
