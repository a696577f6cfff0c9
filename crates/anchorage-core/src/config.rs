//! Decision engine configuration.
//!
//! All tunables live on [`DecisionConfig`], a plain serde struct with
//! TOML round-trip support. Defaults match the documented behavior of
//! each component; `validate()` rejects inconsistent combinations
//! before they reach the engine.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::engine::FusionAlgorithm;
use crate::error::ConfigError;
use crate::request::PolicyExpression;

/// Retention windows for recorded decisions and attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// TTL for successfully completed decisions, in days.
    pub successful_ttl_days: i64,
    /// TTL for failed decisions, in days.
    pub failed_ttl_days: i64,
    /// TTL for decision attempts, in days.
    pub attempt_ttl_days: i64,
    /// Hard cap on retained records; oldest are dropped first.
    pub max_records: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            successful_ttl_days: 7,
            failed_ttl_days: 30,
            attempt_ttl_days: 1,
            max_records: 10_000,
        }
    }
}

impl RetentionPolicy {
    /// TTL for successful decisions.
    pub fn successful_ttl(&self) -> Duration {
        Duration::days(self.successful_ttl_days)
    }

    /// TTL for failed decisions.
    pub fn failed_ttl(&self) -> Duration {
        Duration::days(self.failed_ttl_days)
    }

    /// TTL for attempts.
    pub fn attempt_ttl(&self) -> Duration {
        Duration::days(self.attempt_ttl_days)
    }
}

/// Configuration for the placement decision core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Score fusion algorithm.
    pub algorithm: FusionAlgorithm,
    /// Scheduler score weight in percent. Together with `cel_weight`
    /// must sum to 100.
    pub scheduler_weight: f64,
    /// Policy score weight in percent.
    pub cel_weight: f64,
    /// Inclusion threshold on the final score.
    pub minimum_score: f64,
    /// Overall decision deadline in seconds.
    pub max_decision_time_secs: u64,
    /// Emit audit records for completed decisions.
    pub enable_audit_logging: bool,
    /// Lifetime of resource reservations, in minutes.
    pub reservation_window_minutes: i64,
    /// Additive score boost applied by Prefer overrides.
    pub preference_boost: f64,
    /// Additive score penalty applied by Avoid overrides.
    pub avoidance_penalty: f64,
    /// Cap on active overrides per placement.
    pub max_active_overrides_per_placement: usize,
    /// Minimum selected workspace count. Zero disables the bound.
    pub minimum_workspaces: usize,
    /// Maximum selected workspace count. Zero disables the bound.
    pub maximum_workspaces: usize,
    /// Fraction of workspace capacity an allocation may use, in (0, 1].
    pub resource_overcommit_threshold: f64,
    /// Override cleanup tick interval in seconds.
    pub cleanup_interval_secs: u64,
    /// Per-tick budget for override cleanup, in seconds.
    pub cleanup_timeout_secs: u64,
    /// Record purge tick interval in seconds.
    pub purge_interval_secs: u64,
    /// Always-on policy expressions, evaluated before the request's
    /// own. Kept last with `retention` so the TOML form stays valid.
    pub default_cel_expressions: Vec<PolicyExpression>,
    /// Retention windows for the recorder.
    pub retention: RetentionPolicy,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            algorithm: FusionAlgorithm::WeightedScore,
            scheduler_weight: 60.0,
            cel_weight: 40.0,
            minimum_score: 50.0,
            max_decision_time_secs: 30,
            enable_audit_logging: true,
            default_cel_expressions: Vec::new(),
            reservation_window_minutes: 30,
            preference_boost: 20.0,
            avoidance_penalty: 15.0,
            max_active_overrides_per_placement: 10,
            minimum_workspaces: 0,
            maximum_workspaces: 0,
            resource_overcommit_threshold: 0.8,
            cleanup_interval_secs: 60,
            cleanup_timeout_secs: 10,
            purge_interval_secs: 3600,
            retention: RetentionPolicy::default(),
        }
    }
}

impl DecisionConfig {
    /// Reservation lifetime.
    pub fn reservation_window(&self) -> Duration {
        Duration::minutes(self.reservation_window_minutes)
    }

    /// Overall decision deadline.
    pub fn max_decision_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_decision_time_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.scheduler_weight + self.cel_weight - 100.0).abs() > f64::EPSILON {
            return Err(ConfigError::InvalidValue {
                key: "scheduler_weight".into(),
                message: format!(
                    "weights must sum to 100, got {} + {}",
                    self.scheduler_weight, self.cel_weight
                ),
            });
        }
        if !(0.0..=100.0).contains(&self.minimum_score) {
            return Err(ConfigError::InvalidValue {
                key: "minimum_score".into(),
                message: format!("must be in [0, 100], got {}", self.minimum_score),
            });
        }
        if self.max_decision_time_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_decision_time_secs".into(),
                message: "must be positive".into(),
            });
        }
        if self.reservation_window_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "reservation_window_minutes".into(),
                message: "must be positive".into(),
            });
        }
        if self.preference_boost < 0.0 || self.avoidance_penalty < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "preference_boost".into(),
                message: "override deltas must be non-negative".into(),
            });
        }
        if !(self.resource_overcommit_threshold > 0.0
            && self.resource_overcommit_threshold <= 1.0)
        {
            return Err(ConfigError::InvalidValue {
                key: "resource_overcommit_threshold".into(),
                message: format!(
                    "must be in (0, 1], got {}",
                    self.resource_overcommit_threshold
                ),
            });
        }
        if self.maximum_workspaces > 0 && self.minimum_workspaces > self.maximum_workspaces {
            return Err(ConfigError::InvalidValue {
                key: "minimum_workspaces".into(),
                message: format!(
                    "minimum ({}) exceeds maximum ({})",
                    self.minimum_workspaces, self.maximum_workspaces
                ),
            });
        }
        if self.cleanup_interval_secs == 0 || self.purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cleanup_interval_secs".into(),
                message: "background intervals must be positive".into(),
            });
        }
        for expr in &self.default_cel_expressions {
            if expr.name.is_empty() || expr.expression.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "default_cel_expressions".into(),
                    message: "expressions need a name and a body".into(),
                });
            }
        }
        Ok(())
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Save the configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = self.to_toml_string()?;
        std::fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
