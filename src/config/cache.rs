use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Sizing hints for the value cache map
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Must be a power of two greater than one
    #[serde(default = "default_shard_amount")]
    pub shard_amount: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            shard_amount: default_shard_amount(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shard_amount < 2 || !self.shard_amount.is_power_of_two() {
            return Err(Error::Config(ConfigError::Message(format!(
                "cache.shard_amount {} must be a power of two greater than 1",
                self.shard_amount
            ))));
        }
        Ok(())
    }
}

fn default_initial_capacity() -> usize {
    4096
}
fn default_shard_amount() -> usize {
    64
}
