//! Engine configuration.
//!
//! `EngineConfig` is resolved once by the calling tool (file, flags, defaults)
//! and handed to the engine. Nothing in this crate reads the environment or
//! the filesystem to configure itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{CleanupMode, ConflictStrategy};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Retry-with-backoff policy shared by provider calls and store batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            multiplier: 2,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            multiplier: 1,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * multiplier^retry`, capped
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(retry);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Total attempts including the first one
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Process-wide engine defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub max_depth: usize,
    pub recursive: bool,
    pub conflict_strategy: ConflictStrategy,
    pub cleanup_mode: CleanupMode,
    pub continue_on_batch_error: bool,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            max_depth: DEFAULT_MAX_DEPTH,
            recursive: true,
            conflict_strategy: ConflictStrategy::default(),
            cleanup_mode: CleanupMode::default(),
            continue_on_batch_error: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config payload and validate it
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be at least 1".into()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(Error::InvalidInput(
                "max_concurrent_batches must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidInput("max_depth must be at least 1".into()));
        }
        if self.retry.multiplier == 0 {
            return Err(Error::InvalidInput(
                "retry.multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
