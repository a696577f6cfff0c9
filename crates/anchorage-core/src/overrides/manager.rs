//! Override lifecycle management and application.
//!
//! The manager owns every override. Creation, update, deletion and
//! expiry take the write lock; application snapshots what it needs and
//! mutates only the caller's clone of the decision.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::cancel::Deadline;
use crate::config::DecisionConfig;
use crate::decision::{
    DecisionEvent, DecisionEventType, DecisionStatus, PlacementDecision, RejectedCandidate,
    ResourceAllocation, WorkspacePlacement,
};
use crate::error::{ConflictError, CoreError, Result, ValidationError};
use crate::overrides::{
    check_conflict, OverrideAction, OverrideHistoryEntry, OverrideRequest, OverrideType,
    PlacementOverride,
};
use crate::storage::OverrideStorage;
use crate::tasks::BackgroundTask;

/// Handle to the background cleanup loop.
pub type CleanupHandle = BackgroundTask;

/// Custom validation hook run on every create and update.
pub type OverrideValidatorFn =
    Box<dyn Fn(&PlacementOverride) -> Result<(), ValidationError> + Send + Sync>;

#[derive(Default)]
struct OverrideState {
    /// Every known override, active or expired.
    overrides: HashMap<String, PlacementOverride>,
    /// Active override IDs per placement, priority-sorted.
    by_placement: HashMap<String, Vec<String>>,
    /// Append-only lifecycle log.
    history: Vec<OverrideHistoryEntry>,
}

impl OverrideState {
    /// Re-sort a placement's active list: priority descending, ties
    /// broken by newer creation time.
    fn resort(&mut self, placement_id: &str) {
        let overrides = &self.overrides;
        if let Some(ids) = self.by_placement.get_mut(placement_id) {
            ids.sort_by(|a, b| {
                let oa = &overrides[a];
                let ob = &overrides[b];
                ob.priority
                    .cmp(&oa.priority)
                    .then(ob.created_at.cmp(&oa.created_at))
            });
        }
    }

    fn record(&mut self, ov: &PlacementOverride, action: OverrideAction) {
        self.history.push(OverrideHistoryEntry {
            override_id: ov.id.clone(),
            placement_id: ov.placement_id.clone(),
            action,
            actor: ov.actor.clone(),
            at: Utc::now(),
        });
    }

    fn active_for(&self, placement_id: &str, now: DateTime<Utc>) -> Vec<PlacementOverride> {
        self.by_placement
            .get(placement_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.overrides.get(id))
            .filter(|ov| !ov.is_expired_at(now))
            .cloned()
            .collect()
    }

    fn deactivate(&mut self, ov: &PlacementOverride) {
        if let Some(ids) = self.by_placement.get_mut(&ov.placement_id) {
            ids.retain(|id| id != &ov.id);
            if ids.is_empty() {
                self.by_placement.remove(&ov.placement_id);
            }
        }
    }
}

/// Manages override CRUD, conflict detection, expiry, and application.
pub struct OverrideManager {
    preference_boost: f64,
    avoidance_penalty: f64,
    reservation_window: chrono::Duration,
    max_active_per_placement: usize,
    cleanup_timeout: StdDuration,
    state: RwLock<OverrideState>,
    storage: Arc<dyn OverrideStorage>,
    custom_validator: Option<OverrideValidatorFn>,
}

impl OverrideManager {
    /// Create a manager with the given configuration and storage.
    pub fn new(config: &DecisionConfig, storage: Arc<dyn OverrideStorage>) -> Self {
        Self {
            preference_boost: config.preference_boost,
            avoidance_penalty: config.avoidance_penalty,
            reservation_window: config.reservation_window(),
            max_active_per_placement: config.max_active_overrides_per_placement,
            cleanup_timeout: StdDuration::from_secs(config.cleanup_timeout_secs),
            state: RwLock::new(OverrideState::default()),
            storage,
            custom_validator: None,
        }
    }

    /// Install a custom validation hook.
    pub fn with_validator(mut self, validator: OverrideValidatorFn) -> Self {
        self.custom_validator = Some(validator);
        self
    }

    /// Rebuild the in-memory indexes from storage, e.g. after a
    /// restart. Returns how many overrides were loaded.
    pub fn load_from_storage(&self) -> Result<usize> {
        let stored = self.storage.load_overrides()?;
        let now = Utc::now();
        let mut state = self.state.write().unwrap();
        let count = stored.len();
        for ov in stored {
            if !ov.is_expired_at(now) {
                state
                    .by_placement
                    .entry(ov.placement_id.clone())
                    .or_default()
                    .push(ov.id.clone());
            }
            state.overrides.insert(ov.id.clone(), ov);
        }
        let placements: Vec<String> = state.by_placement.keys().cloned().collect();
        for placement_id in placements {
            state.resort(&placement_id);
        }
        Ok(count)
    }

    /// Create an override. Fails on validation errors, critical
    /// conflicts with active overrides on the same placement, or
    /// storage errors.
    pub fn create(&self, request: OverrideRequest) -> Result<PlacementOverride> {
        let now = Utc::now();
        let ov = PlacementOverride {
            id: uuid::Uuid::new_v4().to_string(),
            placement_id: request.placement_id,
            override_type: request.override_type,
            target_workspaces: request.target_workspaces,
            excluded_workspaces: request.excluded_workspaces,
            reason: request.reason,
            actor: request.actor,
            created_at: now,
            expires_at: request.expires_at,
            priority: request.priority,
        };
        ov.validate()?;
        if let Some(validator) = &self.custom_validator {
            validator(&ov)?;
        }

        let mut state = self.state.write().unwrap();
        let active = state.active_for(&ov.placement_id, now);
        if active.len() >= self.max_active_per_placement {
            return Err(ValidationError::InvalidValue {
                field: "placement_id".into(),
                message: format!(
                    "placement '{}' already has {} active overrides (cap {})",
                    ov.placement_id,
                    active.len(),
                    self.max_active_per_placement
                ),
            }
            .into());
        }
        self.check_against_active(&ov, &active)?;

        self.storage.store_override(&ov)?;
        state.overrides.insert(ov.id.clone(), ov.clone());
        state
            .by_placement
            .entry(ov.placement_id.clone())
            .or_default()
            .push(ov.id.clone());
        state.resort(&ov.placement_id);
        state.record(&ov, OverrideAction::Created);
        Ok(ov)
    }

    /// Fetch an override by ID.
    pub fn get(&self, id: &str) -> Option<PlacementOverride> {
        self.state.read().unwrap().overrides.get(id).cloned()
    }

    /// List overrides, optionally restricted to one placement.
    /// Includes expired overrides that have not been deleted.
    pub fn list(&self, placement_id: Option<&str>) -> Vec<PlacementOverride> {
        let state = self.state.read().unwrap();
        let mut out: Vec<_> = state
            .overrides
            .values()
            .filter(|ov| placement_id.is_none_or(|p| ov.placement_id == p))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.created_at.cmp(&a.created_at)));
        out
    }

    /// Replace an existing override. Re-validates and re-runs conflict
    /// detection against the other active overrides.
    pub fn update(&self, ov: PlacementOverride) -> Result<PlacementOverride> {
        ov.validate()?;
        if let Some(validator) = &self.custom_validator {
            validator(&ov)?;
        }

        let now = Utc::now();
        let mut state = self.state.write().unwrap();
        if !state.overrides.contains_key(&ov.id) {
            return Err(ValidationError::InvalidValue {
                field: "id".into(),
                message: format!("override '{}' does not exist", ov.id),
            }
            .into());
        }
        let others: Vec<_> = state
            .active_for(&ov.placement_id, now)
            .into_iter()
            .filter(|other| other.id != ov.id)
            .collect();
        self.check_against_active(&ov, &others)?;

        self.storage.store_override(&ov)?;
        state.overrides.insert(ov.id.clone(), ov.clone());
        state.resort(&ov.placement_id);
        state.record(&ov, OverrideAction::Updated);
        Ok(ov)
    }

    /// Delete an override from storage and all indexes.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let Some(ov) = state.overrides.remove(id) else {
            return Err(ValidationError::InvalidValue {
                field: "id".into(),
                message: format!("override '{}' does not exist", id),
            }
            .into());
        };
        self.storage.delete_override(id)?;
        state.deactivate(&ov);
        state.record(&ov, OverrideAction::Deleted);
        Ok(())
    }

    /// Expire an override now. It stays queryable but no longer
    /// applies.
    pub fn expire(&self, id: &str) -> Result<PlacementOverride> {
        let now = Utc::now();
        let mut state = self.state.write().unwrap();
        let Some(ov) = state.overrides.get_mut(id) else {
            return Err(ValidationError::InvalidValue {
                field: "id".into(),
                message: format!("override '{}' does not exist", id),
            }
            .into());
        };
        ov.expires_at = Some(now);
        let expired = ov.clone();
        self.storage.store_override(&expired)?;
        state.deactivate(&expired);
        state.record(&expired, OverrideAction::Expired);
        Ok(expired)
    }

    /// Active (unexpired) overrides for a placement, in application
    /// order: priority descending, ties broken by newer creation.
    pub fn get_active_overrides(&self, placement_id: &str) -> Vec<PlacementOverride> {
        self.state
            .read()
            .unwrap()
            .active_for(placement_id, Utc::now())
    }

    /// Lifecycle history, optionally restricted to one placement.
    pub fn get_override_history(&self, placement_id: Option<&str>) -> Vec<OverrideHistoryEntry> {
        self.state
            .read()
            .unwrap()
            .history
            .iter()
            .filter(|entry| placement_id.is_none_or(|p| entry.placement_id == p))
            .cloned()
            .collect()
    }

    /// Expire every override whose deadline has passed. Returns how
    /// many were expired. Work is bounded by the cleanup timeout.
    pub fn prune_expired_overrides(&self) -> usize {
        let now = Utc::now();
        let deadline = Deadline::after(self.cleanup_timeout);
        let mut state = self.state.write().unwrap();

        let lapsed: Vec<String> = state
            .by_placement
            .values()
            .flatten()
            .filter(|id| {
                state
                    .overrides
                    .get(*id)
                    .is_some_and(|ov| ov.is_expired_at(now))
            })
            .cloned()
            .collect();

        let mut pruned = 0;
        for id in lapsed {
            if deadline.expired() {
                tracing::warn!(pruned, "override cleanup tick ran out of budget");
                break;
            }
            if let Some(ov) = state.overrides.get(&id).cloned() {
                state.deactivate(&ov);
                state.record(&ov, OverrideAction::Expired);
                pruned += 1;
            }
        }
        pruned
    }

    /// Spawn the periodic cleanup loop.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: StdDuration) -> CleanupHandle {
        let weak = Arc::downgrade(self);
        BackgroundTask::spawn("override-cleanup", interval, move || {
            if let Some(manager) = weak.upgrade() {
                let pruned = manager.prune_expired_overrides();
                if pruned > 0 {
                    tracing::debug!(pruned, "expired overrides pruned");
                }
            }
        })
    }

    /// Apply an override to a decision, returning a new decision. The
    /// input decision is never mutated.
    pub fn apply_override(
        &self,
        decision: &PlacementDecision,
        ov: &PlacementOverride,
    ) -> Result<PlacementDecision> {
        let now = Utc::now();
        if ov.is_expired_at(now) {
            return Err(CoreError::OverrideExpired {
                id: ov.id.clone(),
                expired_at: ov.expires_at.unwrap_or(now),
            });
        }

        let mut applied = decision.clone();
        applied.override_applied = Some(ov.clone());
        applied.status = DecisionStatus::Overridden;

        match ov.override_type {
            OverrideType::Force => {
                applied.rejected.clear();
                applied.selected = ov
                    .target_workspaces
                    .iter()
                    .map(|workspace| WorkspacePlacement {
                        workspace: workspace.clone(),
                        scheduler_score: 0.0,
                        cel_score: 0.0,
                        final_score: 100.0,
                        allocation: ResourceAllocation::reserve(
                            0,
                            0,
                            0,
                            now + self.reservation_window,
                        ),
                        capacity: Default::default(),
                        reason: format!("forced by override {}", ov.id),
                        expression_results: Vec::new(),
                    })
                    .collect();
            }
            OverrideType::Exclude => {
                let (excluded, keep): (Vec<WorkspacePlacement>, Vec<WorkspacePlacement>) =
                    std::mem::take(&mut applied.selected)
                        .into_iter()
                        .partition(|p| ov.excluded_workspaces.contains(&p.workspace));
                applied.selected = keep;
                for placement in excluded {
                    applied.rejected.push(RejectedCandidate {
                        workspace: placement.workspace,
                        scheduler_score: placement.scheduler_score,
                        cel_score: placement.cel_score,
                        final_score: placement.final_score,
                        reason: format!("excluded by override {}", ov.id),
                        expression_results: placement.expression_results,
                    });
                }
            }
            OverrideType::Prefer => {
                for placement in &mut applied.selected {
                    if ov.target_workspaces.contains(&placement.workspace) {
                        placement.final_score =
                            (placement.final_score + self.preference_boost).min(100.0);
                        placement.reason =
                            format!("{}; preferred by override {}", placement.reason, ov.id);
                    }
                }
                sort_by_final_score(&mut applied.selected);
            }
            OverrideType::Avoid => {
                for placement in &mut applied.selected {
                    if ov.target_workspaces.contains(&placement.workspace) {
                        placement.final_score =
                            (placement.final_score - self.avoidance_penalty).max(0.0);
                        placement.reason =
                            format!("{}; avoided by override {}", placement.reason, ov.id);
                    }
                }
                sort_by_final_score(&mut applied.selected);
            }
        }

        applied.rationale.override_factors.push(format!(
            "override {} ({}) by {}: {}",
            ov.id, ov.override_type, ov.actor, ov.reason
        ));
        applied.push_event(
            DecisionEvent::new(
                DecisionEventType::OverrideApplied,
                format!("{} override applied by {}", ov.override_type, ov.actor),
            )
            .with_detail("override_id", ov.id.clone())
            .with_detail("override_type", ov.override_type.as_str())
            .with_detail("actor", ov.actor.clone()),
        );

        self.state
            .write()
            .unwrap()
            .record(ov, OverrideAction::Applied);
        Ok(applied)
    }

    fn check_against_active(
        &self,
        ov: &PlacementOverride,
        active: &[PlacementOverride],
    ) -> Result<()> {
        for other in active {
            if let Some(conflict) = check_conflict(ov, other) {
                if conflict.is_critical() {
                    return Err(ConflictError::Critical {
                        placement_id: ov.placement_id.clone(),
                        first: ov.id.clone(),
                        second: other.id.clone(),
                        message: conflict.message,
                    }
                    .into());
                }
                tracing::warn!(
                    first = %conflict.first,
                    second = %conflict.second,
                    "non-critical override conflict: {}",
                    conflict.message
                );
            }
        }
        Ok(())
    }
}

fn sort_by_final_score(placements: &mut [WorkspacePlacement]) {
    placements.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
