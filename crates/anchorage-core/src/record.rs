//! Recorded decisions, attempts, and the history query shapes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::WorkspaceName;
use crate::decision::{DecisionStatus, PlacementDecision};
use crate::error::ValidationError;

/// An entry in the append-only decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The recorded decision.
    pub decision: PlacementDecision,
    /// Monotonically increasing version assigned by the recorder.
    pub version: u64,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
    /// Retention TTL in seconds, chosen by decision status.
    pub ttl_secs: i64,
    /// `recorded_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Build a record for a decision with the given TTL.
    pub fn new(decision: PlacementDecision, version: u64, recorded_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            decision,
            version,
            recorded_at,
            ttl_secs: ttl.num_seconds(),
            expires_at: recorded_at + ttl,
        }
    }

    /// Whether the record has outlived its TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Phase a decision attempt reached before finishing or failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionPhase {
    Started,
    PolicyEvaluation,
    Fusion,
    Selection,
    Validation,
    Recording,
    Completed,
}

impl DecisionPhase {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPhase::Started => "started",
            DecisionPhase::PolicyEvaluation => "policy_evaluation",
            DecisionPhase::Fusion => "fusion",
            DecisionPhase::Selection => "selection",
            DecisionPhase::Validation => "validation",
            DecisionPhase::Recording => "recording",
            DecisionPhase::Completed => "completed",
        }
    }
}

/// One attempt at making a decision, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionAttempt {
    pub id: String,
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Phase the attempt reached.
    pub phase: DecisionPhase,
    pub success: bool,
    pub error: Option<String>,
    /// Coarse error classification used as a metric label.
    pub error_kind: Option<String>,
}

impl DecisionAttempt {
    /// Start a new attempt for a request.
    pub fn start(request_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            phase: DecisionPhase::Started,
            success: false,
            error: None,
            error_kind: None,
        }
    }

    /// Mark the attempt successful at the given phase.
    pub fn succeed(mut self, phase: DecisionPhase) -> Self {
        self.phase = phase;
        self.success = true;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Mark the attempt failed at the given phase.
    pub fn fail(
        mut self,
        phase: DecisionPhase,
        error: impl Into<String>,
        error_kind: impl Into<String>,
    ) -> Self {
        self.phase = phase;
        self.success = false;
        self.error = Some(error.into());
        self.error_kind = Some(error_kind.into());
        self.completed_at = Some(Utc::now());
        self
    }
}

/// Inclusive time range filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Validate that the range is well-formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start > self.end {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Whether an instant falls inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Sort key for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    DecisionTime,
    RecordedTime,
    Duration,
    RequestId,
}

/// Sort direction for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filter, sort, and pagination for decision history queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Only records for this request.
    pub request_id: Option<String>,
    /// Only records whose decision ID appears here (empty = all).
    pub decision_ids: Vec<String>,
    /// Only records that selected this workspace.
    pub workspace: Option<WorkspaceName>,
    /// Only records in one of these statuses (empty = all).
    pub statuses: Vec<DecisionStatus>,
    /// Only records whose decision time falls in this range.
    pub time_range: Option<TimeRange>,
    /// Records to skip.
    pub offset: usize,
    /// Maximum records to return. Zero means no limit.
    pub limit: usize,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl HistoryQuery {
    /// Query matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one request.
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    /// Validate the query.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(range) = &self.time_range {
            range.validate()?;
        }
        Ok(())
    }

    /// Whether a record passes the filter portion of the query.
    pub fn matches(&self, record: &DecisionRecord) -> bool {
        if let Some(request_id) = &self.request_id {
            if &record.decision.request_id != request_id {
                return false;
            }
        }
        if !self.decision_ids.is_empty() && !self.decision_ids.contains(&record.decision.id) {
            return false;
        }
        if let Some(workspace) = &self.workspace {
            if !record
                .decision
                .selected
                .iter()
                .any(|p| &p.workspace == workspace)
            {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.decision.status) {
            return false;
        }
        if let Some(range) = &self.time_range {
            if !range.contains(record.decision.decision_time) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_expiry() {
        let decision = PlacementDecision::new("req-1", Utc::now());
        let recorded_at = Utc::now() - Duration::days(8);
        let record = DecisionRecord::new(decision, 1, recorded_at, Duration::days(7));
        assert!(record.is_expired_at(Utc::now()));
        assert_eq!(record.ttl_secs, 7 * 24 * 3600);
    }

    #[test]
    fn test_time_range_validation() {
        let now = Utc::now();
        let inverted = TimeRange {
            start: now,
            end: now - Duration::hours(1),
        };
        assert!(inverted.validate().is_err());

        let ok = TimeRange {
            start: now - Duration::hours(1),
            end: now,
        };
        assert!(ok.validate().is_ok());
        assert!(ok.contains(now - Duration::minutes(30)));
        assert!(!ok.contains(now + Duration::minutes(1)));
    }

    #[test]
    fn test_query_filters() {
        let mut decision = PlacementDecision::new("req-1", Utc::now());
        decision.status = DecisionStatus::Complete;
        let record = DecisionRecord::new(decision, 1, Utc::now(), Duration::days(7));

        assert!(HistoryQuery::all().matches(&record));
        assert!(HistoryQuery::for_request("req-1").matches(&record));
        assert!(!HistoryQuery::for_request("req-2").matches(&record));

        let mut by_status = HistoryQuery::all();
        by_status.statuses = vec![DecisionStatus::Error];
        assert!(!by_status.matches(&record));
    }

    #[test]
    fn test_attempt_lifecycle() {
        let attempt = DecisionAttempt::start("req-1");
        assert!(!attempt.success);
        assert!(attempt.completed_at.is_none());

        let failed = attempt.fail(DecisionPhase::Validation, "bad scores", "validation");
        assert!(!failed.success);
        assert_eq!(failed.phase, DecisionPhase::Validation);
        assert_eq!(failed.error_kind.as_deref(), Some("validation"));
    }
}
