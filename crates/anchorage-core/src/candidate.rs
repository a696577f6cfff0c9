//! Scored candidate workspaces handed in by the upstream scheduler.
//!
//! Candidates are read-only input: the engine never mutates them, it
//! only copies what it needs into the decision it produces.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ResourceRequirements;

/// Hierarchical name of a logical cluster (e.g. `root:org:team`).
pub type WorkspaceName = String;

/// Resource capacity of a workspace. CPU in millicores, memory and
/// storage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkspaceCapacity {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
    pub storage_bytes: i64,
}

impl WorkspaceCapacity {
    /// Create a new capacity snapshot.
    pub fn new(cpu_millis: i64, memory_bytes: i64, storage_bytes: i64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            storage_bytes,
        }
    }

    /// A zero capacity (unknown or unreported).
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Per-resource utilization ratios in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceUtilization {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
}

/// A workspace the scheduler considered plausible and scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Workspace identity.
    pub workspace: WorkspaceName,
    /// Scheduler score in [0, 100].
    pub score: f64,
    /// Current readiness.
    pub ready: bool,
    /// Workspace labels.
    pub labels: HashMap<String, String>,
    /// Last heartbeat observed by the scheduler.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Available capacity.
    pub capacity: WorkspaceCapacity,
    /// Current load.
    pub usage: WorkspaceCapacity,
    /// Allocation the scheduler suggests for this workload.
    pub suggested_allocation: ResourceRequirements,
}

impl ScoredCandidate {
    /// Create a ready candidate with the given score and no labels.
    pub fn new(workspace: impl Into<WorkspaceName>, score: f64) -> Self {
        Self {
            workspace: workspace.into(),
            score,
            ready: true,
            labels: HashMap::new(),
            last_heartbeat: None,
            capacity: WorkspaceCapacity::zero(),
            usage: WorkspaceCapacity::zero(),
            suggested_allocation: ResourceRequirements::default(),
        }
    }

    /// Set the available capacity.
    pub fn with_capacity(mut self, capacity: WorkspaceCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the current load.
    pub fn with_usage(mut self, usage: WorkspaceCapacity) -> Self {
        self.usage = usage;
        self
    }

    /// Set the suggested allocation.
    pub fn with_allocation(mut self, allocation: ResourceRequirements) -> Self {
        self.suggested_allocation = allocation;
        self
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Utilization ratios derived from usage over capacity.
    /// Resources with zero capacity report zero utilization.
    pub fn utilization(&self) -> ResourceUtilization {
        fn ratio(used: i64, total: i64) -> f64 {
            if total <= 0 {
                0.0
            } else {
                used as f64 / total as f64
            }
        }
        ResourceUtilization {
            cpu: ratio(self.usage.cpu_millis, self.capacity.cpu_millis),
            memory: ratio(self.usage.memory_bytes, self.capacity.memory_bytes),
            storage: ratio(self.usage.storage_bytes, self.capacity.storage_bytes),
        }
    }
}
