//! Placement decisions and the explainability data they carry.
//!
//! A [`PlacementDecision`] is the primary output of the engine: ordered
//! selected and rejected sets, a rationale, the evaluated policy
//! results, lifecycle events, and advisory conflicts attached by the
//! validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::{WorkspaceCapacity, WorkspaceName};
use crate::evaluator::ExpressionValue;
use crate::overrides::PlacementOverride;

/// Decision lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionStatus {
    Pending,
    Complete,
    Error,
    Overridden,
    RolledBack,
}

impl DecisionStatus {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Complete => "complete",
            DecisionStatus::Error => "error",
            DecisionStatus::Overridden => "overridden",
            DecisionStatus::RolledBack => "rolled_back",
        }
    }

    /// Whether the decision ended in a non-error terminal state.
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Complete | DecisionStatus::Overridden | DecisionStatus::RolledBack
        )
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A soft resource hold attached to a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
    pub storage_bytes: i64,
    /// Reservation ID surfaced to downstream reconcilers.
    pub reservation_id: String,
    /// When the hold lapses if not acted on.
    pub expires_at: DateTime<Utc>,
}

impl ResourceAllocation {
    /// Create an allocation with a fresh reservation ID.
    pub fn reserve(
        cpu_millis: i64,
        memory_bytes: i64,
        storage_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            storage_bytes,
            reservation_id: uuid::Uuid::new_v4().to_string(),
            expires_at,
        }
    }
}

/// Result of evaluating one policy expression against one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    /// Expression name.
    pub expression_name: String,
    /// Raw expression text.
    pub expression: String,
    /// The value the evaluator produced. A failed evaluation records
    /// `Bool(false)` alongside its error.
    pub value: ExpressionValue,
    /// Derived numeric score: the expression weight if truthy, else 0.
    pub score: f64,
    /// Whether evaluation succeeded.
    pub success: bool,
    /// Evaluator error, if any.
    pub error: Option<String>,
    /// Evaluation duration in milliseconds.
    pub duration_ms: u64,
    /// Workspace the result was computed for.
    pub workspace: WorkspaceName,
}

/// A workspace chosen to host the workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacePlacement {
    /// Workspace identity.
    pub workspace: WorkspaceName,
    /// Scheduler score, passed through unchanged.
    pub scheduler_score: f64,
    /// Aggregated policy score in [0, 100].
    pub cel_score: f64,
    /// Fused final score in [0, 100].
    pub final_score: f64,
    /// Allocated resources with reservation.
    pub allocation: ResourceAllocation,
    /// Capacity snapshot taken from the candidate, used by resource
    /// validation.
    pub capacity: WorkspaceCapacity,
    /// Human-readable selection reason.
    pub reason: String,
    /// Per-expression results that produced the policy score.
    pub expression_results: Vec<PolicyEvaluationResult>,
}

/// A candidate that was not selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub workspace: WorkspaceName,
    pub scheduler_score: f64,
    pub cel_score: f64,
    pub final_score: f64,
    /// Human-readable rejection reason.
    pub reason: String,
    pub expression_results: Vec<PolicyEvaluationResult>,
}

/// Why and how the engine decided what it decided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionRationale {
    /// One-line summary.
    pub summary: String,
    /// Per-candidate scheduler factors.
    pub scheduler_factors: Vec<String>,
    /// Per-candidate policy factors.
    pub policy_factors: Vec<String>,
    /// Factors added by applied overrides.
    pub override_factors: Vec<String>,
    /// Weighting description, e.g. `scheduler=60% policy=40%`.
    pub weighting: String,
}

/// Decision lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionEventType {
    Started,
    SchedulerEvaluated,
    CelEvaluated,
    OverrideApplied,
    Completed,
    Error,
    RolledBack,
}

impl DecisionEventType {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionEventType::Started => "started",
            DecisionEventType::SchedulerEvaluated => "scheduler_evaluated",
            DecisionEventType::CelEvaluated => "cel_evaluated",
            DecisionEventType::OverrideApplied => "override_applied",
            DecisionEventType::Completed => "completed",
            DecisionEventType::Error => "error",
            DecisionEventType::RolledBack => "rolled_back",
        }
    }
}

/// One step in a decision's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event_type: DecisionEventType,
    pub at: DateTime<Utc>,
    pub message: String,
    /// Opaque key/value details.
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl DecisionEvent {
    /// Create an event stamped now.
    pub fn new(event_type: DecisionEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            at: Utc::now(),
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    /// Attach a detail value.
    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Severity of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictSeverity {
    Low,
    Medium,
    Critical,
}

/// Kinds of decision-level conflicts the validator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    ResourceOvercommit,
    AntiAffinity,
    PolicyViolation,
}

/// A conflict detected on a decision. Critical conflicts fail
/// validation; the rest ride along as advisory data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub message: String,
}

impl PlacementConflict {
    /// Create a conflict.
    pub fn new(kind: ConflictKind, severity: ConflictSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }

    /// Whether this conflict fails validation.
    pub fn is_critical(&self) -> bool {
        self.severity == ConflictSeverity::Critical
    }
}

/// The primary output of the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementDecision {
    /// Decision ID.
    pub id: String,
    /// ID of the request that produced this decision.
    pub request_id: String,
    /// Selected workspaces, ordered by final score descending.
    pub selected: Vec<WorkspacePlacement>,
    /// Rejected candidates with reasons.
    pub rejected: Vec<RejectedCandidate>,
    /// When the decision was made.
    pub decision_time: DateTime<Utc>,
    /// How long the decision took, in milliseconds.
    pub duration_ms: u64,
    /// Rationale.
    pub rationale: DecisionRationale,
    /// Every per-pair policy evaluation result.
    pub policy_results: Vec<PolicyEvaluationResult>,
    /// Override applied to this decision, if any.
    pub override_applied: Option<PlacementOverride>,
    /// Error message when status is `Error`.
    pub error: Option<String>,
    /// Lifecycle status.
    pub status: DecisionStatus,
    /// Lifecycle events accumulated while the decision was made.
    #[serde(default)]
    pub events: Vec<DecisionEvent>,
    /// Non-critical conflicts attached by the validator.
    #[serde(default)]
    pub advisories: Vec<PlacementConflict>,
}

impl PlacementDecision {
    /// Create a fresh pending decision for a request.
    pub fn new(request_id: impl Into<String>, decision_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            selected: Vec::new(),
            rejected: Vec::new(),
            decision_time,
            duration_ms: 0,
            rationale: DecisionRationale::default(),
            policy_results: Vec::new(),
            override_applied: None,
            error: None,
            status: DecisionStatus::Pending,
            events: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Append a lifecycle event.
    pub fn push_event(&mut self, event: DecisionEvent) {
        self.events.push(event);
    }

    /// Names of the selected workspaces, in selection order.
    pub fn selected_workspaces(&self) -> Vec<&str> {
        self.selected.iter().map(|p| p.workspace.as_str()).collect()
    }

    /// Find a selected placement by workspace name.
    pub fn placement(&self, workspace: &str) -> Option<&WorkspacePlacement> {
        self.selected.iter().find(|p| p.workspace == workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(DecisionStatus::Complete.as_str(), "complete");
        assert_eq!(DecisionStatus::RolledBack.as_str(), "rolled_back");
        assert!(DecisionStatus::Overridden.is_successful());
        assert!(!DecisionStatus::Error.is_successful());
    }

    #[test]
    fn test_reservation_ids_unique() {
        let expires = Utc::now() + chrono::Duration::minutes(30);
        let a = ResourceAllocation::reserve(100, 0, 0, expires);
        let b = ResourceAllocation::reserve(100, 0, 0, expires);
        assert!(!a.reservation_id.is_empty());
        assert_ne!(a.reservation_id, b.reservation_id);
    }

    #[test]
    fn test_event_details() {
        let event = DecisionEvent::new(DecisionEventType::Started, "decision started")
            .with_detail("request_id", "req-1")
            .with_detail("candidates", 3);
        assert_eq!(event.details.get("request_id").unwrap(), "req-1");
        assert_eq!(event.details.get("candidates").unwrap(), 3);
    }

    #[test]
    fn test_decision_accessors() {
        let mut decision = PlacementDecision::new("req-1", Utc::now());
        assert_eq!(decision.status, DecisionStatus::Pending);
        assert!(decision.selected_workspaces().is_empty());

        decision.push_event(DecisionEvent::new(DecisionEventType::Started, "started"));
        assert_eq!(decision.events.len(), 1);
    }
}
