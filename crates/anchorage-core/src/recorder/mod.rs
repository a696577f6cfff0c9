//! Append-only decision history with metrics and retention.
//!
//! The recorder owns the authoritative in-memory history and writes
//! through to the injected storage backend. Queries are served from
//! memory under the read lock; the purge loop runs under the write
//! lock.

mod metrics;

pub use metrics::{DecisionMetrics, DurationStat, LabeledCount, MetricsSnapshot};

use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::RetentionPolicy;
use crate::decision::{DecisionStatus, PlacementDecision};
use crate::error::Result;
use crate::events::{EmittedEvent, EventRecorder, EventSeverity};
use crate::record::{DecisionAttempt, DecisionRecord, HistoryQuery, SortField, SortOrder};
use crate::storage::DecisionStorage;
use crate::tasks::BackgroundTask;

/// Handle to the background purge loop.
pub type PurgeHandle = BackgroundTask;

/// Outcome of one purge run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PurgeSummary {
    pub removed_records: usize,
    pub removed_attempts: usize,
}

#[derive(Default)]
struct HistoryStore {
    records: Vec<DecisionRecord>,
    attempts: Vec<DecisionAttempt>,
    next_version: u64,
}

/// Records decisions and attempts, serves history queries, and keeps
/// the metric counters.
pub struct DecisionRecorder {
    retention: RetentionPolicy,
    state: RwLock<HistoryStore>,
    storage: Arc<dyn DecisionStorage>,
    events: Arc<dyn EventRecorder>,
    metrics: Arc<DecisionMetrics>,
}

impl DecisionRecorder {
    /// Create a recorder with the given retention policy, storage
    /// backend, and event sink.
    pub fn new(
        retention: RetentionPolicy,
        storage: Arc<dyn DecisionStorage>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            retention,
            state: RwLock::new(HistoryStore::default()),
            storage,
            events,
            metrics: Arc::new(DecisionMetrics::new()),
        }
    }

    /// Shared handle to the metric counters.
    pub fn metrics(&self) -> Arc<DecisionMetrics> {
        self.metrics.clone()
    }

    /// Rebuild the in-memory history from storage, e.g. after a
    /// restart. The version counter resumes past the highest stored
    /// version. Returns how many records were loaded.
    pub fn load_from_storage(&self) -> Result<usize> {
        let mut records = self.storage.load_records()?;
        records.sort_by(|a, b| a.version.cmp(&b.version));
        let mut state = self.state.write().unwrap();
        let count = records.len();
        state.next_version = records
            .last()
            .map(|r| r.version)
            .unwrap_or(state.next_version)
            .max(state.next_version);
        state.records = records;
        Ok(count)
    }

    /// Record a decision. The in-memory history always takes the
    /// record; a storage write-through failure is surfaced after the
    /// fact.
    pub fn record_decision(&self, decision: &PlacementDecision) -> Result<DecisionRecord> {
        let now = Utc::now();
        let ttl = if decision.status == DecisionStatus::Error {
            self.retention.failed_ttl()
        } else {
            self.retention.successful_ttl()
        };

        let record = {
            let mut state = self.state.write().unwrap();
            state.next_version += 1;
            let record = DecisionRecord::new(decision.clone(), state.next_version, now, ttl);
            state.records.push(record.clone());
            record
        };

        let workspaces = decision.selected_workspaces();
        self.metrics
            .record_decision(decision.status.as_str(), &workspaces, decision.duration_ms);

        let stored = self.storage.store_record(&record);
        self.metrics.record_storage_op("store_record", stored.is_ok());

        match decision.status {
            DecisionStatus::Error => self.emit_decision_event(
                EventSeverity::Warning,
                "PlacementDecisionError",
                format!(
                    "decision {} for request {} failed: {}",
                    decision.id,
                    decision.request_id,
                    decision.error.as_deref().unwrap_or("unknown error")
                ),
            ),
            _ => self.emit_decision_event(
                EventSeverity::Normal,
                "PlacementDecisionRecorded",
                format!(
                    "decision {} for request {} recorded with {} placement(s)",
                    decision.id,
                    decision.request_id,
                    decision.selected.len()
                ),
            ),
        }

        stored?;
        Ok(record)
    }

    /// Record one decision attempt.
    pub fn record_decision_attempt(&self, attempt: &DecisionAttempt) -> Result<()> {
        self.state.write().unwrap().attempts.push(attempt.clone());
        self.metrics.record_attempt(
            attempt.success,
            attempt.error_kind.as_deref().unwrap_or("none"),
        );

        let stored = self.storage.store_attempt(attempt);
        self.metrics
            .record_storage_op("store_attempt", stored.is_ok());
        stored?;
        Ok(())
    }

    /// Query the decision history with filtering, sorting, and
    /// pagination.
    pub fn query_decision_history(&self, query: &HistoryQuery) -> Result<Vec<DecisionRecord>> {
        if let Err(e) = query.validate() {
            self.metrics.record_query_op("history", false);
            return Err(e.into());
        }

        let state = self.state.read().unwrap();
        let mut matched: Vec<DecisionRecord> = state
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        drop(state);

        sort_records(&mut matched, query.sort_by, query.sort_order);

        let start = query.offset.min(matched.len());
        let end = if query.limit == 0 {
            matched.len()
        } else {
            (start + query.limit).min(matched.len())
        };
        let page = matched[start..end].to_vec();

        self.metrics.record_query_op("history", true);
        Ok(page)
    }

    /// Snapshot of every metric counter.
    pub fn get_decision_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop records past their TTL and attempts past the attempt TTL,
    /// then enforce the record cap (oldest dropped first).
    pub fn purge_old_records(&self) -> Result<PurgeSummary> {
        let now = Utc::now();
        let mut summary = PurgeSummary::default();

        {
            let mut state = self.state.write().unwrap();
            let before = state.records.len();
            state.records.retain(|r| !r.is_expired_at(now));
            summary.removed_records += before - state.records.len();

            let attempt_cutoff = now - self.retention.attempt_ttl();
            let before = state.attempts.len();
            state.attempts.retain(|a| a.started_at > attempt_cutoff);
            summary.removed_attempts += before - state.attempts.len();

            if state.records.len() > self.retention.max_records {
                let excess = state.records.len() - self.retention.max_records;
                state.records.drain(0..excess);
                summary.removed_records += excess;
            }
        }

        let purged = self.storage.purge_expired(now, &self.retention);
        self.metrics
            .record_storage_op("purge", purged.is_ok());
        self.metrics.record_purge();
        purged?;
        Ok(summary)
    }

    /// Spawn the periodic purge loop.
    pub fn spawn_purge(self: &Arc<Self>, interval: StdDuration) -> PurgeHandle {
        let weak = Arc::downgrade(self);
        BackgroundTask::spawn("record-purge", interval, move || {
            if let Some(recorder) = weak.upgrade() {
                match recorder.purge_old_records() {
                    Ok(summary) if summary.removed_records > 0 || summary.removed_attempts > 0 => {
                        tracing::debug!(
                            removed_records = summary.removed_records,
                            removed_attempts = summary.removed_attempts,
                            "purged old decision records"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("record purge failed: {e}"),
                }
            }
        })
    }

    /// Emit an event to the host. Best-effort: failures are logged and
    /// counted against nothing.
    pub fn emit_decision_event(
        &self,
        severity: EventSeverity,
        reason: &str,
        message: impl Into<String>,
    ) {
        let event = EmittedEvent::new(severity, reason, message);
        match self.events.emit(&event) {
            Ok(()) => self.metrics.record_event(severity.as_str()),
            Err(e) => tracing::warn!(reason, "event emission failed: {e}"),
        }
    }

    /// Number of records currently held.
    pub fn record_count(&self) -> usize {
        self.state.read().unwrap().records.len()
    }
}

fn sort_records(records: &mut [DecisionRecord], field: SortField, order: SortOrder) {
    records.sort_by(|a, b| {
        let ordering = match field {
            SortField::DecisionTime => a.decision.decision_time.cmp(&b.decision.decision_time),
            SortField::RecordedTime => a.recorded_at.cmp(&b.recorded_at),
            SortField::Duration => a.decision.duration_ms.cmp(&b.decision.duration_ms),
            SortField::RequestId => a
                .decision
                .request_id
                .cmp(&b.decision.request_id)
                .then(a.recorded_at.cmp(&b.recorded_at)),
        };
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}
