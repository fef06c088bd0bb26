use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Write path settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WritePathConfig {
    /// Number of worker shards. Writes touching the same row always land on
    /// the same shard, so this bounds write parallelism, not ordering.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on how long shutdown waits for queued writes (ms)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for WritePathConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl WritePathConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > 256 {
            return Err(Error::Config(ConfigError::Message(
                "write_path.workers must be between 1 and 256".into(),
            )));
        }
        if self.drain_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "write_path.drain_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_workers() -> usize {
    4
}
// in ms
fn default_drain_timeout_ms() -> u64 {
    30_000
}
