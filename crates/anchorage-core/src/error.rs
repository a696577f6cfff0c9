//! Core error types for anchorage-core.
//!
//! This module defines the error hierarchy using thiserror. Each
//! subsystem has its own error enum; `CoreError` is the top-level type
//! surfaced by the public operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for anchorage-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Structural or semantic input violations
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Conflicting overrides on the same placement
    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// Opaque failures from injected storage backends
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Expression compilation or evaluation failures
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A decision overran its deadline or was cancelled
    #[error("Decision deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    /// An override was applied past its expiration
    #[error("Override '{id}' expired at {expired_at}")]
    OverrideExpired {
        id: String,
        expired_at: DateTime<Utc>,
    },

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A score fell outside [0, 100]
    #[error("Score '{field}' for workspace '{workspace}' out of range: {value}")]
    ScoreOutOfRange {
        workspace: String,
        field: String,
        value: f64,
    },

    /// The same workspace was selected more than once
    #[error("Workspace '{0}' selected more than once")]
    DuplicateWorkspace(String),

    /// Decision timestamp lies in the future
    #[error("Decision time {decision_time} is in the future (now: {now})")]
    DecisionTimeInFuture {
        decision_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Selected workspace count outside the configured bounds
    #[error("Selected {count} workspaces, expected between {min} and {max}")]
    WorkspaceCountOutOfBounds {
        count: usize,
        min: usize,
        max: usize,
    },

    /// Negative resource allocation
    #[error("Negative {resource} allocation for workspace '{workspace}'")]
    NegativeAllocation { workspace: String, resource: String },

    /// Allocation exceeds the overcommit threshold of workspace capacity
    #[error(
        "{resource} allocation {requested} for workspace '{workspace}' exceeds limit {limit}"
    )]
    AllocationExceedsCapacity {
        workspace: String,
        resource: String,
        requested: i64,
        limit: i64,
    },

    /// Reservation ID missing on an allocation
    #[error("Missing reservation ID for workspace '{0}'")]
    MissingReservation(String),

    /// Reservation already expired
    #[error("Reservation for workspace '{workspace}' expired at {expired_at}")]
    ReservationExpired {
        workspace: String,
        expired_at: DateTime<Utc>,
    },

    /// Selected set does not honor the applied override
    #[error("Override inconsistency: {0}")]
    OverrideInconsistent(String),

    /// Workspace lacks a required label
    #[error("Workspace '{workspace}' missing required label '{label}'")]
    MissingLabel { workspace: String, label: String },

    /// Workspace lies in a forbidden region
    #[error("Workspace '{workspace}' is in forbidden region '{region}'")]
    ForbiddenRegion { workspace: String, region: String },

    /// Invalid time range in a history query
    #[error("Invalid time range: end ({end}) must not precede start ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Empty collection where at least one element is required
    #[error("Empty collection: {0}")]
    EmptyCollection(String),
}

/// Conflict errors raised when creating or updating overrides, or when
/// validation finds a critical decision-level conflict.
#[derive(Error, Debug)]
pub enum ConflictError {
    /// A critical conflict between two overrides on the same placement
    #[error(
        "Critical conflict on placement '{placement_id}' between overrides '{first}' and '{second}': {message}"
    )]
    Critical {
        placement_id: String,
        first: String,
        second: String,
        message: String,
    },

    /// A critical conflict detected on a decision
    #[error("Critical conflict on decision '{decision_id}': {message}")]
    Decision {
        decision_id: String,
        message: String,
    },
}

/// Opaque failures from injected storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Write failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Purge failed
    #[error("Purge failed: {0}")]
    PurgeFailed(String),

    /// Backend unavailable
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Expression compilation and evaluation failures.
///
/// These are captured on the per-pair evaluation result and never fail
/// the decision as a whole.
#[derive(Error, Debug, Clone)]
pub enum EvaluationError {
    /// Expression failed to compile
    #[error("Failed to compile expression '{name}': {message}")]
    Compile { name: String, message: String },

    /// Expression failed to evaluate against a candidate context
    #[error("Failed to evaluate expression '{name}' for workspace '{workspace}': {message}")]
    Evaluate {
        name: String,
        workspace: String,
        message: String,
    },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: String, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
