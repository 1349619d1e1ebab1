//! Engine provisioning.
//!
//! Pools and queues are sized once at startup; running past these limits
//! is a deployment error, so they are validated up front.

use clap::Args;

use crate::arena::NULL_INDEX;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct EngineConfig {
    /// Number of instruments; ticker ids run from 0 to instruments - 1
    #[arg(long, default_value_t = 8)]
    pub instruments: u32,

    /// Maximum concurrently resting orders per instrument
    #[arg(long, default_value_t = 65_536)]
    pub max_orders: u32,

    /// Maximum concurrently live price levels per instrument
    #[arg(long, default_value_t = 4_096)]
    pub max_price_levels: u32,

    /// Capacity of each SPSC ring (requests, responses, market updates)
    #[arg(long, default_value_t = 262_144)]
    pub queue_capacity: usize,

    /// Pin the engine thread to the last available CPU core
    #[arg(long, default_value_t = false)]
    pub pin_core: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.instruments == 0 {
            return Err(EngineError::InvalidConfig("instruments must be non-zero".into()));
        }
        if self.max_orders == 0 || self.max_orders >= NULL_INDEX {
            return Err(EngineError::InvalidConfig(format!(
                "max_orders must be in 1..{NULL_INDEX}, got {}",
                self.max_orders
            )));
        }
        if self.max_price_levels == 0 || self.max_price_levels >= NULL_INDEX {
            return Err(EngineError::InvalidConfig(format!(
                "max_price_levels must be in 1..{NULL_INDEX}, got {}",
                self.max_price_levels
            )));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::InvalidConfig("queue_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: 8,
            max_orders: 65_536,
            max_price_levels: 4_096,
            queue_capacity: 262_144,
            pin_core: false,
        }
    }
}
