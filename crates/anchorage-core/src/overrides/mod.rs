//! Operator overrides: out-of-band directives that replace the normal
//! fusion outcome for a placement.
//!
//! This module defines the override types and the pairwise conflict
//! rules; [`manager`] owns their lifecycle and application.

mod manager;

pub use manager::{CleanupHandle, OverrideManager, OverrideValidatorFn};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::WorkspaceName;
use crate::decision::ConflictSeverity;
use crate::error::ValidationError;

/// The four override types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideType {
    /// Replace the selected set with the override's targets.
    Force,
    /// Remove the named workspaces from the selected set.
    Exclude,
    /// Boost the named workspaces' final scores.
    Prefer,
    /// Penalize the named workspaces' final scores.
    Avoid,
}

impl OverrideType {
    /// Stable label for history and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideType::Force => "force",
            OverrideType::Exclude => "exclude",
            OverrideType::Prefer => "prefer",
            OverrideType::Avoid => "avoid",
        }
    }
}

impl std::fmt::Display for OverrideType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator directive targeting one placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementOverride {
    /// Override ID.
    pub id: String,
    /// Placement (decision) the override targets.
    pub placement_id: String,
    pub override_type: OverrideType,
    /// Workspaces acted on by Force/Prefer/Avoid.
    pub target_workspaces: Vec<WorkspaceName>,
    /// Workspaces removed by Exclude.
    pub excluded_workspaces: Vec<WorkspaceName>,
    /// Human-readable justification.
    pub reason: String,
    /// Who created the override.
    pub actor: String,
    pub created_at: DateTime<Utc>,
    /// When the override lapses. `None` means it never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Application priority; higher applies first.
    pub priority: i32,
}

impl PlacementOverride {
    /// Whether the override has lapsed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Union of target and excluded workspaces.
    pub fn workspace_footprint(&self) -> HashSet<&str> {
        self.target_workspaces
            .iter()
            .chain(self.excluded_workspaces.iter())
            .map(String::as_str)
            .collect()
    }

    /// Validate the override's own invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.placement_id.is_empty() {
            return Err(ValidationError::MissingField("placement_id".into()));
        }
        if self.reason.is_empty() {
            return Err(ValidationError::MissingField("reason".into()));
        }
        if self.actor.is_empty() {
            return Err(ValidationError::MissingField("actor".into()));
        }
        match self.override_type {
            OverrideType::Force | OverrideType::Prefer => {
                if self.target_workspaces.is_empty() {
                    return Err(ValidationError::EmptyCollection(format!(
                        "{} override needs at least one target workspace",
                        self.override_type
                    )));
                }
            }
            OverrideType::Exclude | OverrideType::Avoid => {
                if self.excluded_workspaces.is_empty() {
                    return Err(ValidationError::EmptyCollection(format!(
                        "{} override needs at least one excluded workspace",
                        self.override_type
                    )));
                }
            }
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at < self.created_at {
                return Err(ValidationError::InvalidValue {
                    field: "expires_at".into(),
                    message: format!(
                        "expiration {} precedes creation {}",
                        expires_at, self.created_at
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Request to create an override; the manager assigns ID and creation
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub placement_id: String,
    pub override_type: OverrideType,
    #[serde(default)]
    pub target_workspaces: Vec<WorkspaceName>,
    #[serde(default)]
    pub excluded_workspaces: Vec<WorkspaceName>,
    pub reason: String,
    pub actor: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i32,
}

impl OverrideRequest {
    /// Force the named workspaces onto a placement.
    pub fn force(
        placement_id: impl Into<String>,
        targets: Vec<WorkspaceName>,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            placement_id: placement_id.into(),
            override_type: OverrideType::Force,
            target_workspaces: targets,
            excluded_workspaces: Vec::new(),
            reason: reason.into(),
            actor: actor.into(),
            expires_at: None,
            priority: 0,
        }
    }

    /// Exclude the named workspaces from a placement.
    pub fn exclude(
        placement_id: impl Into<String>,
        excluded: Vec<WorkspaceName>,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            placement_id: placement_id.into(),
            override_type: OverrideType::Exclude,
            target_workspaces: Vec::new(),
            excluded_workspaces: excluded,
            reason: reason.into(),
            actor: actor.into(),
            expires_at: None,
            priority: 0,
        }
    }

    /// Prefer the named workspaces on a placement.
    pub fn prefer(
        placement_id: impl Into<String>,
        targets: Vec<WorkspaceName>,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            placement_id: placement_id.into(),
            override_type: OverrideType::Prefer,
            target_workspaces: targets,
            excluded_workspaces: Vec::new(),
            reason: reason.into(),
            actor: actor.into(),
            expires_at: None,
            priority: 0,
        }
    }

    /// Avoid the named workspaces on a placement.
    pub fn avoid(
        placement_id: impl Into<String>,
        targets: Vec<WorkspaceName>,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            placement_id: placement_id.into(),
            override_type: OverrideType::Avoid,
            target_workspaces: targets.clone(),
            excluded_workspaces: targets,
            reason: reason.into(),
            actor: actor.into(),
            expires_at: None,
            priority: 0,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// A conflict between two overrides on the same placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConflict {
    pub first: String,
    pub second: String,
    pub severity: ConflictSeverity,
    pub message: String,
}

impl OverrideConflict {
    /// Whether the conflict blocks creation.
    pub fn is_critical(&self) -> bool {
        self.severity == ConflictSeverity::Critical
    }
}

/// Pairwise conflict rules between two overrides on the same placement.
///
/// Overlap is computed over the union of each override's target and
/// excluded workspace lists.
pub fn check_conflict(a: &PlacementOverride, b: &PlacementOverride) -> Option<OverrideConflict> {
    let overlap = !a
        .workspace_footprint()
        .is_disjoint(&b.workspace_footprint());

    let (severity, message) = match (a.override_type, b.override_type) {
        (OverrideType::Force, OverrideType::Force) => (
            ConflictSeverity::Critical,
            "two force overrides on the same placement".to_string(),
        ),
        (OverrideType::Force, OverrideType::Exclude)
        | (OverrideType::Exclude, OverrideType::Force)
            if overlap =>
        {
            (
                ConflictSeverity::Critical,
                "force and exclude overrides touch the same workspaces".to_string(),
            )
        }
        (OverrideType::Prefer, OverrideType::Avoid)
        | (OverrideType::Avoid, OverrideType::Prefer)
            if overlap =>
        {
            (
                ConflictSeverity::Medium,
                "prefer and avoid overrides touch the same workspaces".to_string(),
            )
        }
        _ if a.priority == b.priority => (
            ConflictSeverity::Medium,
            format!("overrides share priority {}", a.priority),
        ),
        _ => return None,
    };

    Some(OverrideConflict {
        first: a.id.clone(),
        second: b.id.clone(),
        severity,
        message,
    })
}

/// Lifecycle actions recorded in override history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideAction {
    Created,
    Updated,
    Applied,
    Expired,
    Deleted,
}

/// One entry in the override history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideHistoryEntry {
    pub override_id: String,
    pub placement_id: String,
    pub action: OverrideAction,
    pub actor: String,
    pub at: DateTime<Utc>,
}
