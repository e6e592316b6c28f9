//! Configuration Management
//!
//! Tuning parameters for coordinators. None of them affect correctness.
//! Defaults: 100 spins before yielding, 1ns park between capacity checks.

use crate::coordinator::{
    check_buffer_size, BusySpin, ConfiguredWait, CoordinatorError, Result, SpinThenYield,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for `CoordinatorConfig::from_env`
pub const ENV_PREFIX: &str = "RINGCOND_";

/// Which built-in wait strategy consumers use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    BusySpin,
    #[default]
    SpinThenYield,
}

impl FromStr for WaitStrategyKind {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "busy_spin" | "busy-spin" | "spin" => Ok(Self::BusySpin),
            "spin_then_yield" | "spin-then-yield" | "yield" => Ok(Self::SpinThenYield),
            other => Err(CoordinatorError::InvalidConfig(format!(
                "unknown wait strategy: {other}"
            ))),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Ring size in slots, must be a power of 2
    pub buffer_size: usize,
    /// Wait strategy built by `wait_strategy()`
    pub wait_strategy: WaitStrategyKind,
    /// Busy polls before a spin-then-yield consumer yields
    pub spin_tries: u32,
    /// Park interval while a producer waits for capacity, in nanoseconds
    pub claim_park_nanos: u64,
    /// Empty merger rotations before the merger yields
    pub merge_retry_budget: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            wait_strategy: WaitStrategyKind::default(),
            spin_tries: SpinThenYield::DEFAULT_SPIN_TRIES,
            claim_park_nanos: 1,
            merge_retry_budget: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Default configuration with a custom buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Defaults overridden by `RINGCOND_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from `lookup`, keyed by upper-case field name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BUFFER_SIZE") {
            self.buffer_size = parse_field("BUFFER_SIZE", &value)?;
        }
        if let Some(value) = lookup("WAIT_STRATEGY") {
            self.wait_strategy = value.parse()?;
        }
        if let Some(value) = lookup("SPIN_TRIES") {
            self.spin_tries = parse_field("SPIN_TRIES", &value)?;
        }
        if let Some(value) = lookup("CLAIM_PARK_NANOS") {
            self.claim_park_nanos = parse_field("CLAIM_PARK_NANOS", &value)?;
        }
        if let Some(value) = lookup("MERGE_RETRY_BUDGET") {
            self.merge_retry_budget = parse_field("MERGE_RETRY_BUDGET", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// `InvalidBufferSize` for a buffer that is not a power of 2,
    /// `InvalidConfig` for a zero park interval or retry budget
    pub fn validate(&self) -> Result<()> {
        check_buffer_size(self.buffer_size)?;
        if self.claim_park_nanos == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "claim_park_nanos must be at least 1".to_string(),
            ));
        }
        if self.merge_retry_budget == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "merge_retry_budget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Park interval for producers waiting on capacity
    pub fn claim_park(&self) -> Duration {
        Duration::from_nanos(self.claim_park_nanos)
    }

    /// The configured wait strategy
    pub fn wait_strategy(&self) -> ConfiguredWait {
        match self.wait_strategy {
            WaitStrategyKind::BusySpin => ConfiguredWait::BusySpin(BusySpin),
            WaitStrategyKind::SpinThenYield => {
                ConfiguredWait::SpinThenYield(SpinThenYield::new(self.spin_tries))
            }
        }
    }
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CoordinatorError::InvalidConfig(format!("{ENV_PREFIX}{name}: cannot parse {value:?}"))
    })
}
