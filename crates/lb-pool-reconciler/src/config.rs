//! Reconciler tuning knobs.

use std::time::Duration;

use serde::Deserialize;

/// Capped exponential backoff settings for the retry wrapper.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Delay before the first re-invocation (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between re-invocations (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each transient failure
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl BackoffConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> u32 {
    2
}

/// Reconciler configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Interval between status fetches while a resource is pending (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Backoff applied to transiently failing mutations
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Overall operation timeout used when the caller does not supply one (seconds)
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl ReconcilerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backoff: BackoffConfig::default(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_operation_timeout_secs() -> u64 {
    600 // 10 minutes, matching the control plane's typical provisioning time
}
