//! Decision validation: invariant gating and conflict detection.
//!
//! Checks run in a fixed order -- structural, workspace count,
//! resource constraints, policy compliance, workspace attributes --
//! and the first violation fails the decision. The conflict scan runs
//! last: critical conflicts fail, the rest are returned as advisories.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::DecisionConfig;
use crate::decision::{
    ConflictKind, ConflictSeverity, PlacementConflict, PlacementDecision,
};
use crate::error::{ConflictError, Result, ValidationError};
use crate::overrides::OverrideType;

/// Tolerated clock skew when checking decision timestamps.
const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Final scores below this are flagged as low-confidence.
const LOW_CONFIDENCE_SCORE: f64 = 30.0;

/// Injected lookup for workspace labels and regions.
///
/// The validator only consults it when label or region requirements
/// are configured; without a provider those checks are skipped.
pub trait WorkspaceAttributeProvider: Send + Sync {
    fn labels(&self, workspace: &str) -> HashMap<String, String>;
    fn region(&self, workspace: &str) -> Option<String>;
}

/// Gates decisions on invariants and reports conflicts.
pub struct DecisionValidator {
    minimum_workspaces: usize,
    maximum_workspaces: usize,
    overcommit_threshold: f64,
    required_labels: Vec<(String, String)>,
    forbidden_regions: HashSet<String>,
    attributes: Option<Arc<dyn WorkspaceAttributeProvider>>,
}

impl DecisionValidator {
    /// Create a validator from the engine configuration.
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            minimum_workspaces: config.minimum_workspaces,
            maximum_workspaces: config.maximum_workspaces,
            overcommit_threshold: config.resource_overcommit_threshold,
            required_labels: Vec::new(),
            forbidden_regions: HashSet::new(),
            attributes: None,
        }
    }

    /// Install a workspace attribute lookup.
    pub fn with_attribute_provider(
        mut self,
        provider: Arc<dyn WorkspaceAttributeProvider>,
    ) -> Self {
        self.attributes = Some(provider);
        self
    }

    /// Require a label on every selected workspace.
    pub fn with_required_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_labels.push((key.into(), value.into()));
        self
    }

    /// Forbid selections in a region.
    pub fn with_forbidden_region(mut self, region: impl Into<String>) -> Self {
        self.forbidden_regions.insert(region.into());
        self
    }

    /// Run every check. On success returns the non-critical conflicts
    /// to attach to the decision as advisories.
    pub fn validate_decision(&self, decision: &PlacementDecision) -> Result<Vec<PlacementConflict>> {
        self.validate_structure(decision)?;
        self.validate_workspace_count(decision)?;
        self.validate_resource_constraints(decision)?;
        self.validate_policy_compliance(decision)?;
        self.validate_workspace_attributes(decision)?;

        let conflicts = self.check_conflicts(decision);
        if let Some(critical) = conflicts.iter().find(|c| c.is_critical()) {
            return Err(ConflictError::Decision {
                decision_id: decision.id.clone(),
                message: critical.message.clone(),
            }
            .into());
        }
        Ok(conflicts)
    }

    fn validate_structure(&self, decision: &PlacementDecision) -> Result<(), ValidationError> {
        if decision.id.is_empty() {
            return Err(ValidationError::MissingField("id".into()));
        }
        if decision.request_id.is_empty() {
            return Err(ValidationError::MissingField("request_id".into()));
        }
        let now = Utc::now();
        if decision.decision_time > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(ValidationError::DecisionTimeInFuture {
                decision_time: decision.decision_time,
                now,
            });
        }

        let mut seen = HashSet::new();
        for placement in &decision.selected {
            if !seen.insert(placement.workspace.as_str()) {
                return Err(ValidationError::DuplicateWorkspace(
                    placement.workspace.clone(),
                ));
            }
            for (field, value) in [
                ("scheduler_score", placement.scheduler_score),
                ("cel_score", placement.cel_score),
                ("final_score", placement.final_score),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ValidationError::ScoreOutOfRange {
                        workspace: placement.workspace.clone(),
                        field: field.into(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_workspace_count(&self, decision: &PlacementDecision) -> Result<(), ValidationError> {
        let count = decision.selected.len();
        let below_min = self.minimum_workspaces > 0 && count < self.minimum_workspaces;
        let above_max = self.maximum_workspaces > 0 && count > self.maximum_workspaces;
        if below_min || above_max {
            return Err(ValidationError::WorkspaceCountOutOfBounds {
                count,
                min: self.minimum_workspaces,
                max: self.maximum_workspaces,
            });
        }
        Ok(())
    }

    /// Resource checks: non-negative allocations, live reservations,
    /// and allocations within the overcommit threshold of the
    /// workspace's capacity snapshot. Resources with an unreported
    /// (zero) capacity skip the overcommit comparison.
    pub fn validate_resource_constraints(
        &self,
        decision: &PlacementDecision,
    ) -> Result<(), ValidationError> {
        for placement in &decision.selected {
            let allocation = &placement.allocation;
            for (resource, requested, capacity) in [
                ("cpu", allocation.cpu_millis, placement.capacity.cpu_millis),
                (
                    "memory",
                    allocation.memory_bytes,
                    placement.capacity.memory_bytes,
                ),
                (
                    "storage",
                    allocation.storage_bytes,
                    placement.capacity.storage_bytes,
                ),
            ] {
                if requested < 0 {
                    return Err(ValidationError::NegativeAllocation {
                        workspace: placement.workspace.clone(),
                        resource: resource.into(),
                    });
                }
                if capacity > 0 {
                    let limit = (capacity as f64 * self.overcommit_threshold) as i64;
                    if requested > limit {
                        return Err(ValidationError::AllocationExceedsCapacity {
                            workspace: placement.workspace.clone(),
                            resource: resource.into(),
                            requested,
                            limit,
                        });
                    }
                }
            }
            if allocation.reservation_id.is_empty() {
                return Err(ValidationError::MissingReservation(
                    placement.workspace.clone(),
                ));
            }
            if allocation.expires_at <= decision.decision_time {
                return Err(ValidationError::ReservationExpired {
                    workspace: placement.workspace.clone(),
                    expired_at: allocation.expires_at,
                });
            }
        }
        Ok(())
    }

    /// Policy checks: positive final scores, override consistency, and
    /// live reservations on every selected placement.
    pub fn validate_policy_compliance(
        &self,
        decision: &PlacementDecision,
    ) -> Result<(), ValidationError> {
        for placement in &decision.selected {
            if placement.final_score <= 0.0 {
                return Err(ValidationError::ScoreOutOfRange {
                    workspace: placement.workspace.clone(),
                    field: "final_score".into(),
                    value: placement.final_score,
                });
            }
            if placement.allocation.reservation_id.is_empty() {
                return Err(ValidationError::MissingReservation(
                    placement.workspace.clone(),
                ));
            }
            if placement.allocation.expires_at <= decision.decision_time {
                return Err(ValidationError::ReservationExpired {
                    workspace: placement.workspace.clone(),
                    expired_at: placement.allocation.expires_at,
                });
            }
        }

        if let Some(ov) = &decision.override_applied {
            let selected: HashSet<&str> = decision
                .selected
                .iter()
                .map(|p| p.workspace.as_str())
                .collect();
            match ov.override_type {
                OverrideType::Force => {
                    let targets: HashSet<&str> =
                        ov.target_workspaces.iter().map(String::as_str).collect();
                    if selected != targets {
                        return Err(ValidationError::OverrideInconsistent(format!(
                            "force override {} targets {:?} but selection is {:?}",
                            ov.id, ov.target_workspaces, decision.selected_workspaces()
                        )));
                    }
                }
                OverrideType::Exclude => {
                    if let Some(leaked) = ov
                        .excluded_workspaces
                        .iter()
                        .find(|w| selected.contains(w.as_str()))
                    {
                        return Err(ValidationError::OverrideInconsistent(format!(
                            "exclude override {} still has workspace '{}' selected",
                            ov.id, leaked
                        )));
                    }
                }
                OverrideType::Prefer | OverrideType::Avoid => {}
            }
        }
        Ok(())
    }

    fn validate_workspace_attributes(
        &self,
        decision: &PlacementDecision,
    ) -> Result<(), ValidationError> {
        let Some(provider) = &self.attributes else {
            return Ok(());
        };
        if self.required_labels.is_empty() && self.forbidden_regions.is_empty() {
            return Ok(());
        }

        for placement in &decision.selected {
            let labels = provider.labels(&placement.workspace);
            for (key, value) in &self.required_labels {
                if labels.get(key) != Some(value) {
                    return Err(ValidationError::MissingLabel {
                        workspace: placement.workspace.clone(),
                        label: format!("{key}={value}"),
                    });
                }
            }
            if let Some(region) = provider.region(&placement.workspace) {
                if self.forbidden_regions.contains(&region) {
                    return Err(ValidationError::ForbiddenRegion {
                        workspace: placement.workspace.clone(),
                        region,
                    });
                }
            }
        }
        Ok(())
    }

    /// Scan a decision for conflicts. Does not fail; callers decide
    /// what to do with critical entries.
    pub fn check_conflicts(&self, decision: &PlacementDecision) -> Vec<PlacementConflict> {
        let mut conflicts = Vec::new();

        for placement in &decision.selected {
            for (resource, requested, capacity) in [
                (
                    "cpu",
                    placement.allocation.cpu_millis,
                    placement.capacity.cpu_millis,
                ),
                (
                    "memory",
                    placement.allocation.memory_bytes,
                    placement.capacity.memory_bytes,
                ),
                (
                    "storage",
                    placement.allocation.storage_bytes,
                    placement.capacity.storage_bytes,
                ),
            ] {
                if capacity > 0 && requested > capacity {
                    conflicts.push(PlacementConflict::new(
                        ConflictKind::ResourceOvercommit,
                        ConflictSeverity::Critical,
                        format!(
                            "workspace '{}' {} allocation {} exceeds capacity {}",
                            placement.workspace, resource, requested, capacity
                        ),
                    ));
                }
            }
        }

        if decision.selected.len() > 1 {
            conflicts.push(PlacementConflict::new(
                ConflictKind::AntiAffinity,
                ConflictSeverity::Medium,
                format!(
                    "{} workspaces selected; verify anti-affinity constraints",
                    decision.selected.len()
                ),
            ));
        }

        for placement in &decision.selected {
            if placement.final_score < LOW_CONFIDENCE_SCORE {
                conflicts.push(PlacementConflict::new(
                    ConflictKind::PolicyViolation,
                    ConflictSeverity::Medium,
                    format!(
                        "workspace '{}' selected with low-confidence score {:.1}",
                        placement.workspace, placement.final_score
                    ),
                ));
            }
        }

        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::WorkspaceCapacity;
    use crate::decision::{DecisionStatus, ResourceAllocation, WorkspacePlacement};
    use crate::error::CoreError;
    use crate::overrides::PlacementOverride;

    fn make_placement(workspace: &str, final_score: f64) -> WorkspacePlacement {
        WorkspacePlacement {
            workspace: workspace.into(),
            scheduler_score: final_score,
            cel_score: final_score,
            final_score,
            allocation: ResourceAllocation::reserve(
                100,
                1_000,
                0,
                Utc::now() + Duration::minutes(30),
            ),
            capacity: WorkspaceCapacity::new(1000, 10_000, 0),
            reason: "selected".into(),
            expression_results: Vec::new(),
        }
    }

    fn make_decision(selected: Vec<WorkspacePlacement>) -> PlacementDecision {
        let mut decision = PlacementDecision::new("req-1", Utc::now());
        decision.status = DecisionStatus::Complete;
        decision.selected = selected;
        decision
    }

    fn make_validator() -> DecisionValidator {
        DecisionValidator::new(&DecisionConfig::default())
    }

    #[test]
    fn test_valid_decision_passes() {
        let decision = make_decision(vec![make_placement("root:prod", 83.0)]);
        let advisories = make_validator().validate_decision(&decision).unwrap();
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_duplicate_workspace_rejected() {
        let decision = make_decision(vec![
            make_placement("root:prod", 83.0),
            make_placement("root:prod", 77.0),
        ]);
        let result = make_validator().validate_decision(&decision);
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::DuplicateWorkspace(_)))
        ));
    }

    #[test]
    fn test_score_out_of_range_rejected() {
        let mut placement = make_placement("root:prod", 83.0);
        placement.cel_score = 120.0;
        let result = make_validator().validate_decision(&make_decision(vec![placement]));
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::ScoreOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_future_decision_time_rejected() {
        let mut decision = make_decision(vec![make_placement("root:prod", 83.0)]);
        decision.decision_time = Utc::now() + Duration::minutes(10);
        let result = make_validator().validate_decision(&decision);
        assert!(matches!(
            result,
            Err(CoreError::Validation(
                ValidationError::DecisionTimeInFuture { .. }
            ))
        ));
    }

    #[test]
    fn test_workspace_count_bounds() {
        let mut config = DecisionConfig::default();
        config.minimum_workspaces = 2;
        let validator = DecisionValidator::new(&config);

        let decision = make_decision(vec![make_placement("root:prod", 83.0)]);
        let result = validator.validate_decision(&decision);
        assert!(matches!(
            result,
            Err(CoreError::Validation(
                ValidationError::WorkspaceCountOutOfBounds { .. }
            ))
        ));
    }

    #[test]
    fn test_negative_allocation_rejected() {
        let mut placement = make_placement("root:prod", 83.0);
        placement.allocation.cpu_millis = -1;
        let result = make_validator()
            .validate_resource_constraints(&make_decision(vec![placement]));
        assert!(matches!(
            result,
            Err(ValidationError::NegativeAllocation { .. })
        ));
    }

    #[test]
    fn test_overcommit_rejected() {
        // Capacity 1000 cpu, threshold 0.8 -> limit 800.
        let mut placement = make_placement("root:prod", 83.0);
        placement.allocation.cpu_millis = 900;
        let result = make_validator()
            .validate_resource_constraints(&make_decision(vec![placement]));
        assert!(matches!(
            result,
            Err(ValidationError::AllocationExceedsCapacity { .. })
        ));
    }

    #[test]
    fn test_unknown_capacity_skips_overcommit() {
        let mut placement = make_placement("root:prod", 83.0);
        placement.capacity = WorkspaceCapacity::zero();
        placement.allocation.cpu_millis = 900;
        assert!(make_validator()
            .validate_resource_constraints(&make_decision(vec![placement]))
            .is_ok());
    }

    #[test]
    fn test_expired_reservation_rejected() {
        let mut placement = make_placement("root:prod", 83.0);
        placement.allocation.expires_at = Utc::now() - Duration::minutes(1);
        let result = make_validator()
            .validate_resource_constraints(&make_decision(vec![placement]));
        assert!(matches!(
            result,
            Err(ValidationError::ReservationExpired { .. })
        ));
    }

    #[test]
    fn test_force_override_consistency() {
        let mut decision = make_decision(vec![make_placement("root:prod", 83.0)]);
        decision.override_applied = Some(PlacementOverride {
            id: "ov-1".into(),
            placement_id: decision.id.clone(),
            override_type: OverrideType::Force,
            target_workspaces: vec!["root:emergency".into()],
            excluded_workspaces: vec![],
            reason: "incident".into(),
            actor: "oncall".into(),
            created_at: Utc::now(),
            expires_at: None,
            priority: 100,
        });
        let result = make_validator().validate_policy_compliance(&decision);
        assert!(matches!(
            result,
            Err(ValidationError::OverrideInconsistent(_))
        ));
    }

    #[test]
    fn test_exclude_override_consistency() {
        let mut decision = make_decision(vec![make_placement("root:prod", 83.0)]);
        decision.override_applied = Some(PlacementOverride {
            id: "ov-1".into(),
            placement_id: decision.id.clone(),
            override_type: OverrideType::Exclude,
            target_workspaces: vec![],
            excluded_workspaces: vec!["root:prod".into()],
            reason: "maintenance".into(),
            actor: "ops".into(),
            created_at: Utc::now(),
            expires_at: None,
            priority: 0,
        });
        let result = make_validator().validate_policy_compliance(&decision);
        assert!(matches!(
            result,
            Err(ValidationError::OverrideInconsistent(_))
        ));
    }

    #[test]
    fn test_advisories_attached_not_fatal() {
        let decision = make_decision(vec![
            make_placement("root:a", 83.0),
            make_placement("root:b", 77.0),
        ]);
        let advisories = make_validator().validate_decision(&decision).unwrap();
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].kind, ConflictKind::AntiAffinity);
        assert!(!advisories[0].is_critical());
    }

    #[test]
    fn test_conflict_scan_flags_critical_overcommit() {
        let mut placement = make_placement("root:prod", 83.0);
        placement.allocation.cpu_millis = 1500;
        placement.capacity = WorkspaceCapacity::new(1400, 10_000, 0);

        let conflicts = make_validator().check_conflicts(&make_decision(vec![placement]));
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::ResourceOvercommit && c.is_critical()));
    }

    #[test]
    fn test_required_label_enforced() {
        struct StaticAttributes;
        impl WorkspaceAttributeProvider for StaticAttributes {
            fn labels(&self, workspace: &str) -> HashMap<String, String> {
                let mut labels = HashMap::new();
                if workspace == "root:prod" {
                    labels.insert("tier".into(), "prod".into());
                }
                labels
            }
            fn region(&self, _workspace: &str) -> Option<String> {
                None
            }
        }

        let validator = make_validator()
            .with_attribute_provider(Arc::new(StaticAttributes))
            .with_required_label("tier", "prod");

        assert!(validator
            .validate_decision(&make_decision(vec![make_placement("root:prod", 83.0)]))
            .is_ok());
        let result =
            validator.validate_decision(&make_decision(vec![make_placement("root:dev", 83.0)]));
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::MissingLabel { .. }))
        ));
    }

    #[test]
    fn test_forbidden_region_enforced() {
        struct RegionAttributes;
        impl WorkspaceAttributeProvider for RegionAttributes {
            fn labels(&self, _workspace: &str) -> HashMap<String, String> {
                HashMap::new()
            }
            fn region(&self, _workspace: &str) -> Option<String> {
                Some("embargoed".into())
            }
        }

        let validator = make_validator()
            .with_attribute_provider(Arc::new(RegionAttributes))
            .with_forbidden_region("embargoed");

        let result =
            validator.validate_decision(&make_decision(vec![make_placement("root:prod", 83.0)]));
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::ForbiddenRegion { .. }))
        ));
    }
}
