//! In-process decision metrics.
//!
//! The core maintains labelled counters itself; export wiring is the
//! host's concern. Snapshots are plain serde structs a host can map
//! onto whatever metrics system it runs.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A labelled counter sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledCount {
    pub labels: Vec<(String, String)>,
    pub value: u64,
}

/// Duration sum/count pair per label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationStat {
    pub label: String,
    pub total_ms: u64,
    pub count: u64,
}

/// Point-in-time view of every metric family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// `placement_decisions_total{status, workspace}`
    pub decisions_total: Vec<LabeledCount>,
    /// `placement_decision_duration_seconds{status}` as sum/count
    pub decision_duration: Vec<DurationStat>,
    /// `placement_decision_attempts_total{success, error_type}`
    pub attempts_total: Vec<LabeledCount>,
    /// `decision_storage_ops_total{op, status}`
    pub storage_ops_total: Vec<LabeledCount>,
    /// `decision_query_ops_total{query_type, status}`
    pub query_ops_total: Vec<LabeledCount>,
    /// `decision_purge_ops_total`
    pub purge_ops_total: u64,
    /// `decision_events_emitted_total{event_type}`
    pub events_emitted_total: Vec<LabeledCount>,
}

impl MetricsSnapshot {
    /// Sum of `placement_decisions_total` across all labels.
    pub fn total_decisions(&self) -> u64 {
        self.decisions_total.iter().map(|c| c.value).sum()
    }
}

#[derive(Default)]
struct MetricsInner {
    decisions_total: HashMap<(String, String), u64>,
    decision_duration: HashMap<String, (u64, u64)>,
    attempts_total: HashMap<(String, String), u64>,
    storage_ops_total: HashMap<(String, String), u64>,
    query_ops_total: HashMap<(String, String), u64>,
    purge_ops_total: u64,
    events_emitted_total: HashMap<String, u64>,
}

/// Thread-safe metric counters for the recorder.
#[derive(Default)]
pub struct DecisionMetrics {
    inner: Mutex<MetricsInner>,
}

impl DecisionMetrics {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a recorded decision: one sample per selected workspace
    /// (or one with an empty workspace label when nothing was
    /// selected), plus its duration.
    pub fn record_decision(&self, status: &str, workspaces: &[&str], duration_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        if workspaces.is_empty() {
            *inner
                .decisions_total
                .entry((status.to_string(), String::new()))
                .or_insert(0) += 1;
        } else {
            for workspace in workspaces {
                *inner
                    .decisions_total
                    .entry((status.to_string(), (*workspace).to_string()))
                    .or_insert(0) += 1;
            }
        }
        let duration = inner.decision_duration.entry(status.to_string()).or_insert((0, 0));
        duration.0 += duration_ms;
        duration.1 += 1;
    }

    /// Count a decision attempt.
    pub fn record_attempt(&self, success: bool, error_kind: &str) {
        let key = (success.to_string(), error_kind.to_string());
        *self
            .inner
            .lock()
            .unwrap()
            .attempts_total
            .entry(key)
            .or_insert(0) += 1;
    }

    /// Count a storage operation.
    pub fn record_storage_op(&self, op: &str, ok: bool) {
        let key = (op.to_string(), status_label(ok).to_string());
        *self
            .inner
            .lock()
            .unwrap()
            .storage_ops_total
            .entry(key)
            .or_insert(0) += 1;
    }

    /// Count a query operation.
    pub fn record_query_op(&self, query_type: &str, ok: bool) {
        let key = (query_type.to_string(), status_label(ok).to_string());
        *self
            .inner
            .lock()
            .unwrap()
            .query_ops_total
            .entry(key)
            .or_insert(0) += 1;
    }

    /// Count a purge run.
    pub fn record_purge(&self) {
        self.inner.lock().unwrap().purge_ops_total += 1;
    }

    /// Count an emitted event.
    pub fn record_event(&self, event_type: &str) {
        *self
            .inner
            .lock()
            .unwrap()
            .events_emitted_total
            .entry(event_type.to_string())
            .or_insert(0) += 1;
    }

    /// Capture a snapshot of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();

        fn pair_counts(
            map: &HashMap<(String, String), u64>,
            first: &str,
            second: &str,
        ) -> Vec<LabeledCount> {
            let mut out: Vec<_> = map
                .iter()
                .map(|((a, b), value)| LabeledCount {
                    labels: vec![
                        (first.to_string(), a.clone()),
                        (second.to_string(), b.clone()),
                    ],
                    value: *value,
                })
                .collect();
            out.sort_by(|a, b| a.labels.cmp(&b.labels));
            out
        }

        let mut decision_duration: Vec<_> = inner
            .decision_duration
            .iter()
            .map(|(label, (total_ms, count))| DurationStat {
                label: label.clone(),
                total_ms: *total_ms,
                count: *count,
            })
            .collect();
        decision_duration.sort_by(|a, b| a.label.cmp(&b.label));

        let mut events_emitted_total: Vec<_> = inner
            .events_emitted_total
            .iter()
            .map(|(event_type, value)| LabeledCount {
                labels: vec![("event_type".to_string(), event_type.clone())],
                value: *value,
            })
            .collect();
        events_emitted_total.sort_by(|a, b| a.labels.cmp(&b.labels));

        MetricsSnapshot {
            decisions_total: pair_counts(&inner.decisions_total, "status", "workspace"),
            decision_duration,
            attempts_total: pair_counts(&inner.attempts_total, "success", "error_type"),
            storage_ops_total: pair_counts(&inner.storage_ops_total, "op", "status"),
            query_ops_total: pair_counts(&inner.query_ops_total, "query_type", "status"),
            purge_ops_total: inner.purge_ops_total,
            events_emitted_total,
        }
    }
}

fn status_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
