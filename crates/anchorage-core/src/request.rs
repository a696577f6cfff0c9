//! Placement requests and the policy expressions they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::WorkspaceName;

/// Resource requirements of a workload. CPU in millicores, memory and
/// storage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequirements {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
    pub storage_bytes: i64,
}

impl ResourceRequirements {
    /// Create new requirements.
    pub fn new(cpu_millis: i64, memory_bytes: i64, storage_bytes: i64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            storage_bytes,
        }
    }
}

/// A declarative policy rule evaluated against a per-candidate context
/// by the external expression evaluator. The expression text is opaque
/// to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyExpression {
    /// Expression name, used in rationale and results.
    pub name: String,
    /// Expression source text.
    pub expression: String,
    /// Weight contributed to the policy score when the expression is
    /// truthy, in [0, 100].
    pub weight: f64,
    /// When true, a false (or errored) evaluation disqualifies the
    /// candidate.
    #[serde(default)]
    pub required: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl PolicyExpression {
    /// Create a soft preference with the given weight.
    pub fn new(name: impl Into<String>, expression: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            weight: weight.clamp(0.0, 100.0),
            required: false,
            description: String::new(),
        }
    }

    /// Mark the expression as required.
    pub fn require(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Scheduler sub-request carried by a placement request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerRequest {
    /// Workload priority.
    pub priority: i32,
    /// Resource requirements of the workload.
    pub requirements: ResourceRequirements,
    /// Maximum number of placements. Zero means no limit.
    pub max_placements: usize,
}

impl SchedulerRequest {
    /// Create a new scheduler sub-request.
    pub fn new(priority: i32, requirements: ResourceRequirements, max_placements: usize) -> Self {
        Self {
            priority,
            requirements,
            max_placements,
        }
    }
}

/// A request to place a workload across candidate workspaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Unique request ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Workspace the request originated from.
    pub source_workspace: WorkspaceName,
    /// Scheduler sub-request.
    pub scheduler: SchedulerRequest,
    /// Policy expressions evaluated per candidate, in addition to the
    /// engine's configured defaults.
    pub cel_expressions: Vec<PolicyExpression>,
    /// Decision deadline. When earlier than the engine's own budget it
    /// bounds the decision.
    pub deadline: Option<DateTime<Utc>>,
    /// Maximum retries the host reconciler will attempt.
    pub max_retries: u32,
    /// Current retry counter, maintained by the host.
    pub current_retry: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PlacementRequest {
    /// Create a new request with a fresh ID.
    pub fn new(
        name: impl Into<String>,
        source_workspace: impl Into<WorkspaceName>,
        scheduler: SchedulerRequest,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source_workspace: source_workspace.into(),
            scheduler,
            cel_expressions: Vec::new(),
            deadline: None,
            max_retries: 0,
            current_retry: 0,
            created_at: Utc::now(),
        }
    }

    /// Add a policy expression.
    pub fn with_expression(mut self, expression: PolicyExpression) -> Self {
        self.cel_expressions.push(expression);
        self
    }

    /// Set the decision deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_weight_clamped() {
        let over = PolicyExpression::new("spread", "workspace.ready", 150.0);
        assert_eq!(over.weight, 100.0);

        let under = PolicyExpression::new("spread", "workspace.ready", -5.0);
        assert_eq!(under.weight, 0.0);
    }

    #[test]
    fn test_request_builder() {
        let request = PlacementRequest::new(
            "deploy-api",
            "root:org:source",
            SchedulerRequest::new(10, ResourceRequirements::new(500, 1_000_000, 0), 2),
        )
        .with_expression(PolicyExpression::new("ready", "workspace.ready", 80.0).require());

        assert!(!request.id.is_empty());
        assert_eq!(request.scheduler.max_placements, 2);
        assert_eq!(request.cel_expressions.len(), 1);
        assert!(request.cel_expressions[0].required);
    }
}
