//! Player configuration.

use std::time::Duration;

use cadence_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for the decode worker and its sample buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds of decoded audio the session buffer can hold.
    pub look_ahead_secs: u32,
    /// Buffered seconds at which the worker stops decoding and waits.
    pub throttle_secs: u32,
    /// Upper bound on a single backpressure wait, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            look_ahead_secs: 30,
            throttle_secs: 25,
            backoff_ms: 2500,
        }
    }
}

impl PlayerConfig {
    /// Check that the values describe a usable buffer.
    pub fn validate(&self) -> Result<()> {
        if self.look_ahead_secs == 0 {
            return Err(Error::InvalidArgument(
                "look_ahead_secs must be greater than 0".to_string(),
            ));
        }
        if self.throttle_secs == 0 || self.throttle_secs >= self.look_ahead_secs {
            return Err(Error::InvalidArgument(format!(
                "throttle_secs must be in 1..{} (got {})",
                self.look_ahead_secs, self.throttle_secs
            )));
        }
        if self.backoff_ms == 0 {
            return Err(Error::InvalidArgument(
                "backoff_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Ring buffer capacity in samples for a stream of the given shape.
    pub fn capacity_samples(&self, sample_rate: u32, channels: usize) -> usize {
        sample_rate as usize * channels * self.look_ahead_secs as usize
    }

    /// Occupancy in samples at which decoding is throttled.
    pub fn threshold_samples(&self, sample_rate: u32, channels: usize) -> usize {
        sample_rate as usize * channels * self.throttle_secs as usize
    }
}
