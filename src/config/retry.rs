use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 means unlimited attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single attempt timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.timeout_ms must be greater than 0"
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by remote call site
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryPolicies {
    // Re-registering a one-shot watch after a notification; an exhausted
    // round is logged and started over
    #[serde(default = "default_rearm_policy")]
    pub rearm: BackoffPolicy,

    // Initial top-down load triggered by watch()
    #[serde(default = "default_initial_load_policy")]
    pub initial_load: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            rearm: default_rearm_policy(),
            initial_load: default_initial_load_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.rearm.validate("retry.rearm")?;
        self.initial_load.validate("retry.initial_load")?;
        Ok(())
    }
}

fn default_rearm_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 10,
        timeout_ms: 2000,
        base_delay_ms: 50,
        max_delay_ms: 2000,
    }
}
fn default_initial_load_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 5000,
        base_delay_ms: 100,
        max_delay_ms: 5000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    1000
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
