//! Configuration for payment submission and recovery.

use crate::error::{PaymentError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// Timing and identity settings shared by the orchestrator and the resolver.
///
/// Durations are expressed in (possibly fractional) seconds when read from or
/// written to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Sale system identifier issued by the acquirer.
    pub sale_id: String,
    /// Point-of-interaction (terminal) identifier.
    pub poi_id: String,
    /// Delay between consecutive status queries.
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub poll_interval: Duration,
    /// Total time allowed for recovery, measured from the first query.
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub budget: Duration,
    /// How long a single status query may wait for its response.
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub attempt_timeout: Duration,
    /// How long to wait for the direct payment response before recovering.
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub payment_response_timeout: Duration,
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub login_timeout: Duration,
}

fn serialize_secs<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.as_secs_f64())
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            sale_id: String::new(),
            poi_id: String::new(),
            poll_interval: Duration::from_secs(10),
            budget: Duration::from_secs(90),
            attempt_timeout: Duration::from_secs(30),
            payment_response_timeout: Duration::from_secs(120),
            login_timeout: Duration::from_secs(60),
        }
    }
}

impl ReconcileConfig {
    /// Loads a JSON config file; missing fields keep their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_identity(mut self, sale_id: impl Into<String>, poi_id: impl Into<String>) -> Self {
        self.sale_id = sale_id.into();
        self.poi_id = poi_id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_payment_response_timeout(mut self, timeout: Duration) -> Self {
        self.payment_response_timeout = timeout;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PaymentError::ConfigError(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval >= self.budget {
            return Err(PaymentError::ConfigError(format!(
                "poll_interval ({:?}) must be shorter than budget ({:?})",
                self.poll_interval, self.budget
            )));
        }
        if self.attempt_timeout.is_zero()
            || self.payment_response_timeout.is_zero()
            || self.login_timeout.is_zero()
        {
            return Err(PaymentError::ConfigError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
