//! Score fusion: combining scheduler and policy scores into one ranking.
//!
//! Four algorithms share the selector. The fused value drives ranking
//! and may exceed 100 for the primary-weighted algorithms; the stored
//! final score is always clamped to [0, 100].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Score fusion algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionAlgorithm {
    /// Weighted blend of the two scores.
    #[default]
    WeightedScore,
    /// Policy score dominates, scheduler score breaks close calls.
    CelPrimary,
    /// Scheduler score dominates, policy score breaks close calls.
    SchedulerPrimary,
    /// Average, but only when both scores clear the minimum; zero
    /// otherwise.
    Consensus,
}

impl FusionAlgorithm {
    /// Stable label for rationale and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionAlgorithm::WeightedScore => "weighted_score",
            FusionAlgorithm::CelPrimary => "cel_primary",
            FusionAlgorithm::SchedulerPrimary => "scheduler_primary",
            FusionAlgorithm::Consensus => "consensus",
        }
    }
}

impl std::fmt::Display for FusionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fusion inputs for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct ScorePair {
    pub scheduler: f64,
    pub cel: f64,
}

/// Outcome of fusing one candidate's scores.
#[derive(Debug, Clone, Copy)]
pub struct FusedScore {
    /// Raw fused value used for ranking. May exceed 100.
    pub ranking: f64,
    /// Clamped value stored on the placement.
    pub final_score: f64,
}

/// Fuse a candidate's scheduler and policy scores.
///
/// `scheduler_weight` and `cel_weight` are percentages (summing to 100)
/// and only apply to [`FusionAlgorithm::WeightedScore`];
/// `minimum_score` only applies to [`FusionAlgorithm::Consensus`].
pub fn fuse(
    algorithm: FusionAlgorithm,
    scores: ScorePair,
    scheduler_weight: f64,
    cel_weight: f64,
    minimum_score: f64,
) -> FusedScore {
    let ranking = match algorithm {
        FusionAlgorithm::WeightedScore => {
            (scores.scheduler * scheduler_weight + scores.cel * cel_weight) / 100.0
        }
        FusionAlgorithm::CelPrimary => scores.cel * 10.0 + scores.scheduler / 10.0,
        FusionAlgorithm::SchedulerPrimary => scores.scheduler * 10.0 + scores.cel / 10.0,
        FusionAlgorithm::Consensus => {
            if scores.scheduler >= minimum_score && scores.cel >= minimum_score {
                (scores.scheduler + scores.cel) / 2.0
            } else {
                0.0
            }
        }
    };
    FusedScore {
        ranking,
        final_score: ranking.clamp(0.0, 100.0),
    }
}

/// Order two candidates with equal ranking. Returns `Less` when `a`
/// should sort ahead of `b`.
pub fn tie_break(algorithm: FusionAlgorithm, a: ScorePair, b: ScorePair) -> Ordering {
    let (primary_a, primary_b) = match algorithm {
        FusionAlgorithm::CelPrimary => (a.cel, b.cel),
        _ => (a.scheduler, b.scheduler),
    };
    // Higher primary score wins the tie.
    primary_b
        .partial_cmp(&primary_a)
        .unwrap_or(Ordering::Equal)
}

/// Rationale weighting string for the given algorithm.
pub fn weighting_label(
    algorithm: FusionAlgorithm,
    scheduler_weight: f64,
    cel_weight: f64,
) -> String {
    match algorithm {
        FusionAlgorithm::WeightedScore => format!(
            "scheduler={}% policy={}% ({})",
            scheduler_weight, cel_weight, algorithm
        ),
        _ => algorithm.to_string(),
    }
}
