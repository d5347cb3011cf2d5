//! Engine configuration
//!
//! Sources, highest priority last:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `DELTA_I18N_*` environment variables (`DELTA_I18N_RETRY_LIMIT=5`)

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{DeltaError, DeltaResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolved neighbours sent on each side of a chunk as terminology context.
    pub context_window_size: usize,
    /// Attempts per chunk before a transport failure is final.
    pub retry_limit: u32,
    /// Maximum external translation calls in flight.
    pub concurrency_limit: usize,
    /// Memory entries unseen for more revisions than this are pruned.
    pub prune_after_revisions: u64,
    /// Let machine output replace human-confirmed entries.
    pub allow_provenance_override: bool,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window_size: 2,
            retry_limit: 3,
            concurrency_limit: 4,
            prune_after_revisions: 5,
            allow_provenance_override: false,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
        }
    }
}

impl EngineConfig {
    pub const ENV_PREFIX: &'static str = "DELTA_I18N_";

    /// Defaults overlaid with `DELTA_I18N_*` environment variables.
    pub fn load() -> DeltaResult<Self> {
        Self::extract(Self::figment(None))
    }

    /// Defaults, then the TOML file at `path` if it exists, then the environment.
    pub fn load_from(path: &Path) -> DeltaResult<Self> {
        Self::extract(Self::figment(Some(path)))
    }

    /// Build the figment provider chain.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path.filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX))
    }

    fn extract(figment: Figment) -> DeltaResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DeltaResult<()> {
        if self.concurrency_limit == 0 {
            return Err(DeltaError::Config(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(DeltaError::Config("retry_limit must be at least 1".to_string()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(DeltaError::Config(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_limit,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Exponential backoff for transient provider failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff is capped here.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        EngineConfig::default().retry_policy()
    }
}
