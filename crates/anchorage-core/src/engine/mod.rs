//! The decision engine: fuse scheduler scores with policy evaluation,
//! select winners, and explain the outcome.
//!
//! The engine is stateless per call and safe for concurrent use; it
//! leans on the validator, override manager, and recorder, each with
//! their own locking.

mod fusion;

pub use fusion::{fuse, tie_break, weighting_label, FusedScore, FusionAlgorithm, ScorePair};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::cancel::{CancelToken, Deadline};
use crate::candidate::ScoredCandidate;
use crate::config::DecisionConfig;
use crate::decision::{
    DecisionEvent, DecisionEventType, DecisionStatus, PlacementConflict, PlacementDecision,
    PolicyEvaluationResult, RejectedCandidate, ResourceAllocation, WorkspacePlacement,
};
use crate::error::{ConfigError, CoreError, Result, ValidationError};
use crate::evaluator::{EvaluationContext, ExpressionEvaluator, ExpressionValue};
use crate::overrides::{OverrideManager, PlacementOverride};
use crate::record::DecisionRecord;
use crate::recorder::DecisionRecorder;
use crate::request::{PlacementRequest, PolicyExpression};
use crate::validator::DecisionValidator;

/// Rejection reason when a required expression disqualifies a
/// candidate.
const REASON_REQUIRED_FAILED: &str = "required policy expression failed";
/// Rejection reason when the final score misses the threshold.
const REASON_BELOW_MINIMUM: &str = "score below minimum";
/// Rejection reason when the placement cap is already full.
const REASON_CAP_REACHED: &str = "maximum placements reached";

/// Per-candidate evaluation state carried between phases.
struct CandidateEval {
    results: Vec<PolicyEvaluationResult>,
    cel_score: f64,
    required_failed: bool,
    fused: FusedScore,
}

/// Turns `(request, candidates)` into a [`PlacementDecision`].
///
/// Decision-shaped failures -- a deadline overrun or a validation
/// rejection -- return a decision with status `Error` and the cause in
/// its `error` field, so the partial state is still usable and
/// recordable. `Err` is reserved for malformed input and
/// infrastructure failures.
pub struct DecisionEngine {
    config: DecisionConfig,
    evaluator: Arc<dyn ExpressionEvaluator>,
    validator: DecisionValidator,
    overrides: Arc<OverrideManager>,
    recorder: Arc<DecisionRecorder>,
}

impl DecisionEngine {
    /// Create an engine. Fails if the configuration is inconsistent.
    pub fn new(
        config: DecisionConfig,
        evaluator: Arc<dyn ExpressionEvaluator>,
        validator: DecisionValidator,
        overrides: Arc<OverrideManager>,
        recorder: Arc<DecisionRecorder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            evaluator,
            validator,
            overrides,
            recorder,
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// The override manager backing this engine.
    pub fn overrides(&self) -> &Arc<OverrideManager> {
        &self.overrides
    }

    /// The recorder backing this engine.
    pub fn recorder(&self) -> &Arc<DecisionRecorder> {
        &self.recorder
    }

    /// Make a placement decision for a request over pre-scored
    /// candidates.
    pub fn make_placement_decision(
        &self,
        request: &PlacementRequest,
        candidates: &[ScoredCandidate],
        cancel: &CancelToken,
    ) -> Result<PlacementDecision> {
        if request.id.is_empty() {
            return Err(ValidationError::MissingField("request.id".into()).into());
        }

        let decision_time = Utc::now();
        let mut decision = PlacementDecision::new(request.id.clone(), decision_time);
        decision.push_event(
            DecisionEvent::new(DecisionEventType::Started, "placement decision started")
                .with_detail("request_id", request.id.clone())
                .with_detail("request_name", request.name.clone()),
        );

        let deadline = self.decision_deadline(request);
        decision.push_event(
            DecisionEvent::new(
                DecisionEventType::SchedulerEvaluated,
                format!("received {} scored candidate(s)", candidates.len()),
            )
            .with_detail("candidates", candidates.len()),
        );

        // Policy evaluation phase.
        let expressions = self.effective_expressions(request);
        let mut evals = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if cancel.is_cancelled() || deadline.expired() {
                return Ok(self.fail_decision(
                    decision,
                    &deadline,
                    CoreError::DeadlineExceeded {
                        elapsed_ms: deadline.elapsed_ms(),
                    },
                ));
            }
            let context = EvaluationContext::for_candidate(request, candidate);
            evals.push(self.evaluate_candidate(candidate, &expressions, &context));
        }
        decision.push_event(
            DecisionEvent::new(
                DecisionEventType::CelEvaluated,
                format!(
                    "evaluated {} expression(s) against {} candidate(s)",
                    expressions.len(),
                    candidates.len()
                ),
            )
            .with_detail("expressions", expressions.len()),
        );

        // Fusion and ranking.
        for eval in &mut evals {
            if eval.required_failed {
                eval.fused = FusedScore {
                    ranking: 0.0,
                    final_score: 0.0,
                };
            }
        }
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            let ra = evals[a].fused.ranking;
            let rb = evals[b].fused.ranking;
            rb.partial_cmp(&ra)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    tie_break(
                        self.config.algorithm,
                        ScorePair {
                            scheduler: candidates[a].score,
                            cel: evals[a].cel_score,
                        },
                        ScorePair {
                            scheduler: candidates[b].score,
                            cel: evals[b].cel_score,
                        },
                    )
                })
                .then_with(|| candidates[a].workspace.cmp(&candidates[b].workspace))
        });

        // Selection.
        let max_placements = request.scheduler.max_placements;
        let reservation_expiry = decision_time + self.config.reservation_window();
        for &i in &order {
            let candidate = &candidates[i];
            let eval = &evals[i];
            decision.policy_results.extend(eval.results.iter().cloned());

            if eval.required_failed {
                decision.rejected.push(self.reject(candidate, eval, REASON_REQUIRED_FAILED));
            } else if eval.fused.final_score < self.config.minimum_score
                || eval.fused.final_score <= 0.0
            {
                // Non-positive finals never place, even with a zero
                // minimum; the validator forbids them downstream.
                decision.rejected.push(self.reject(candidate, eval, REASON_BELOW_MINIMUM));
            } else if max_placements > 0 && decision.selected.len() >= max_placements {
                decision.rejected.push(self.reject(candidate, eval, REASON_CAP_REACHED));
            } else {
                let allocation = ResourceAllocation::reserve(
                    candidate.suggested_allocation.cpu_millis,
                    candidate.suggested_allocation.memory_bytes,
                    candidate.suggested_allocation.storage_bytes,
                    reservation_expiry,
                );
                decision.selected.push(WorkspacePlacement {
                    workspace: candidate.workspace.clone(),
                    scheduler_score: candidate.score,
                    cel_score: eval.cel_score,
                    final_score: eval.fused.final_score,
                    allocation,
                    capacity: candidate.capacity,
                    reason: format!(
                        "selected with final score {:.1} ({})",
                        eval.fused.final_score, self.config.algorithm
                    ),
                    expression_results: eval.results.clone(),
                });
            }
        }

        self.build_rationale(&mut decision, candidates.len());

        // Validation gate.
        match self.validator.validate_decision(&decision) {
            Ok(advisories) => decision.advisories = advisories,
            Err(e) => return Ok(self.fail_decision(decision, &deadline, e)),
        }

        decision.status = DecisionStatus::Complete;
        decision.duration_ms = deadline.elapsed_ms();
        decision.push_event(
            DecisionEvent::new(
                DecisionEventType::Completed,
                format!("selected {} workspace(s)", decision.selected.len()),
            )
            .with_detail("selected", decision.selected.len())
            .with_detail("rejected", decision.rejected.len()),
        );
        self.audit(&decision);
        Ok(decision)
    }

    /// Validate a decision against the engine's validator.
    pub fn validate_decision(&self, decision: &PlacementDecision) -> Result<Vec<PlacementConflict>> {
        self.validator.validate_decision(decision)
    }

    /// Record a decision in the history.
    pub fn record_decision(&self, decision: &PlacementDecision) -> Result<DecisionRecord> {
        self.recorder.record_decision(decision)
    }

    /// Query the decision history.
    pub fn get_decision_history(
        &self,
        query: &crate::record::HistoryQuery,
    ) -> Result<Vec<DecisionRecord>> {
        self.recorder.query_decision_history(query)
    }

    /// Apply an override to a decision, returning the overridden
    /// clone. The input decision is not mutated.
    pub fn apply_override(
        &self,
        decision: &PlacementDecision,
        ov: &PlacementOverride,
    ) -> Result<PlacementDecision> {
        let applied = self.overrides.apply_override(decision, ov)?;
        self.audit(&applied);
        Ok(applied)
    }

    /// Mark a decision rolled back, e.g. after a downstream deploy
    /// failure. Returns the updated clone; the caller records it.
    pub fn rollback_decision(
        &self,
        decision: &PlacementDecision,
        reason: &str,
    ) -> PlacementDecision {
        let mut rolled = decision.clone();
        rolled.status = DecisionStatus::RolledBack;
        rolled.push_event(
            DecisionEvent::new(
                DecisionEventType::RolledBack,
                format!("decision rolled back: {reason}"),
            )
            .with_detail("reason", reason),
        );
        rolled
    }

    fn decision_deadline(&self, request: &PlacementRequest) -> Deadline {
        let mut budget = self.config.max_decision_time();
        if let Some(request_deadline) = request.deadline {
            let remaining = (request_deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            budget = budget.min(remaining);
        }
        Deadline::after(budget)
    }

    fn effective_expressions(&self, request: &PlacementRequest) -> Vec<PolicyExpression> {
        let mut expressions = self.config.default_cel_expressions.clone();
        expressions.extend(request.cel_expressions.iter().cloned());
        expressions
    }

    fn evaluate_candidate(
        &self,
        candidate: &ScoredCandidate,
        expressions: &[PolicyExpression],
        context: &EvaluationContext,
    ) -> CandidateEval {
        let mut results = Vec::with_capacity(expressions.len());
        let mut total = 0.0;
        let mut required_failed = false;

        for expr in expressions {
            let started = Instant::now();
            let outcome = self.evaluator.evaluate(expr, context);
            let duration_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(value) => {
                    let truthy = value.is_truthy();
                    if expr.required && !truthy {
                        required_failed = true;
                    }
                    PolicyEvaluationResult {
                        expression_name: expr.name.clone(),
                        expression: expr.expression.clone(),
                        score: if truthy { expr.weight } else { 0.0 },
                        value,
                        success: true,
                        error: None,
                        duration_ms,
                        workspace: candidate.workspace.clone(),
                    }
                }
                Err(e) => {
                    // Evaluator errors count against the pair, never
                    // the decision.
                    if expr.required {
                        required_failed = true;
                    }
                    tracing::debug!(
                        expression = %expr.name,
                        workspace = %candidate.workspace,
                        "policy evaluation failed: {e}"
                    );
                    PolicyEvaluationResult {
                        expression_name: expr.name.clone(),
                        expression: expr.expression.clone(),
                        score: 0.0,
                        value: ExpressionValue::Bool(false),
                        success: false,
                        error: Some(e.to_string()),
                        duration_ms,
                        workspace: candidate.workspace.clone(),
                    }
                }
            };
            total += result.score;
            results.push(result);
        }

        let cel_score = total.clamp(0.0, 100.0);
        let fused = fuse(
            self.config.algorithm,
            ScorePair {
                scheduler: candidate.score,
                cel: cel_score,
            },
            self.config.scheduler_weight,
            self.config.cel_weight,
            self.config.minimum_score,
        );
        CandidateEval {
            results,
            cel_score,
            required_failed,
            fused,
        }
    }

    fn reject(
        &self,
        candidate: &ScoredCandidate,
        eval: &CandidateEval,
        reason: &str,
    ) -> RejectedCandidate {
        RejectedCandidate {
            workspace: candidate.workspace.clone(),
            scheduler_score: candidate.score,
            cel_score: eval.cel_score,
            final_score: eval.fused.final_score,
            reason: reason.to_string(),
            expression_results: eval.results.clone(),
        }
    }

    fn build_rationale(&self, decision: &mut PlacementDecision, candidate_count: usize) {
        decision.rationale.summary = format!(
            "selected {} of {} candidate(s) using {}",
            decision.selected.len(),
            candidate_count,
            self.config.algorithm
        );
        for placement in &decision.selected {
            decision.rationale.scheduler_factors.push(format!(
                "{}: scheduler score {:.1}",
                placement.workspace, placement.scheduler_score
            ));
            decision.rationale.policy_factors.push(format!(
                "{}: policy score {:.1} from {} expression(s)",
                placement.workspace,
                placement.cel_score,
                placement.expression_results.len()
            ));
        }
        for rejected in &decision.rejected {
            decision.rationale.scheduler_factors.push(format!(
                "{}: scheduler score {:.1} (rejected: {})",
                rejected.workspace, rejected.scheduler_score, rejected.reason
            ));
        }
        decision.rationale.weighting = weighting_label(
            self.config.algorithm,
            self.config.scheduler_weight,
            self.config.cel_weight,
        );
    }

    fn fail_decision(
        &self,
        mut decision: PlacementDecision,
        deadline: &Deadline,
        cause: CoreError,
    ) -> PlacementDecision {
        decision.status = DecisionStatus::Error;
        decision.error = Some(cause.to_string());
        decision.duration_ms = deadline.elapsed_ms();
        decision.push_event(
            DecisionEvent::new(DecisionEventType::Error, cause.to_string())
                .with_detail("request_id", decision.request_id.clone()),
        );
        decision
    }

    fn audit(&self, decision: &PlacementDecision) {
        if !self.config.enable_audit_logging {
            return;
        }
        tracing::info!(
            decision_id = %decision.id,
            request_id = %decision.request_id,
            status = %decision.status,
            algorithm = %self.config.algorithm,
            selected = ?decision.selected_workspaces(),
            "placement decision"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::WorkspaceCapacity;
    use crate::config::RetentionPolicy;
    use crate::error::EvaluationError;
    use crate::evaluator::FnEvaluator;
    use crate::events::MemoryEventRecorder;
    use crate::request::{ResourceRequirements, SchedulerRequest};
    use crate::storage::{MemoryDecisionStorage, MemoryOverrideStorage};

    fn make_engine(config: DecisionConfig, evaluator: FnEvaluator) -> DecisionEngine {
        let validator = DecisionValidator::new(&config);
        let overrides = Arc::new(OverrideManager::new(
            &config,
            Arc::new(MemoryOverrideStorage::new()),
        ));
        let recorder = Arc::new(DecisionRecorder::new(
            RetentionPolicy::default(),
            Arc::new(MemoryDecisionStorage::new()),
            Arc::new(MemoryEventRecorder::new()),
        ));
        DecisionEngine::new(config, Arc::new(evaluator), validator, overrides, recorder).unwrap()
    }

    fn make_request(max_placements: usize) -> PlacementRequest {
        PlacementRequest::new(
            "deploy-api",
            "root:org:source",
            SchedulerRequest::new(10, ResourceRequirements::default(), max_placements),
        )
    }

    #[test]
    fn test_basic_weighted_selection() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let request =
            make_request(0).with_expression(PolicyExpression::new("soft", "true", 80.0));
        let candidates = vec![
            ScoredCandidate::new("root:prod", 85.0),
            ScoredCandidate::new("root:stage", 75.0),
        ];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Complete);
        assert_eq!(decision.selected_workspaces(), vec!["root:prod", "root:stage"]);
        assert!((decision.selected[0].final_score - 83.0).abs() < 1e-9);
        assert!((decision.selected[1].final_score - 77.0).abs() < 1e-9);
        assert!(decision.rejected.is_empty());
        assert!(decision
            .events
            .iter()
            .any(|e| e.event_type == DecisionEventType::Completed));
    }

    #[test]
    fn test_required_expression_gates() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(false)),
        );
        let request =
            make_request(0).with_expression(PolicyExpression::new("gate", "false", 50.0).require());
        let candidates = vec![ScoredCandidate::new("root:dev", 60.0)];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Complete);
        assert!(decision.selected.is_empty());
        assert_eq!(decision.rejected.len(), 1);
        assert!(decision.rejected[0].reason.contains("required"));
        assert_eq!(decision.rejected[0].final_score, 0.0);
    }

    #[test]
    fn test_evaluator_error_is_per_pair() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::new(|expr, ctx| {
                if ctx.workspace.name == "root:broken" {
                    Err(EvaluationError::Evaluate {
                        name: expr.name.clone(),
                        workspace: ctx.workspace.name.clone(),
                        message: "no such attribute".into(),
                    })
                } else {
                    Ok(ExpressionValue::Bool(true))
                }
            }),
        );
        let request =
            make_request(0).with_expression(PolicyExpression::new("soft", "x", 80.0));
        let candidates = vec![
            ScoredCandidate::new("root:ok", 85.0),
            ScoredCandidate::new("root:broken", 90.0),
        ];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Complete);
        // broken: (90*60 + 0*40)/100 = 54, still above the default
        // minimum; the error only zeroes its policy score.
        assert_eq!(decision.selected.len(), 2);
        let broken_results: Vec<_> = decision
            .policy_results
            .iter()
            .filter(|r| r.workspace == "root:broken")
            .collect();
        assert_eq!(broken_results.len(), 1);
        assert!(!broken_results[0].success);
        assert!(broken_results[0].error.is_some());
    }

    #[test]
    fn test_max_placements_cap() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let request = make_request(1).with_expression(PolicyExpression::new("soft", "x", 80.0));
        let candidates = vec![
            ScoredCandidate::new("root:a", 85.0),
            ScoredCandidate::new("root:b", 80.0),
        ];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        assert_eq!(decision.selected.len(), 1);
        assert_eq!(decision.selected[0].workspace, "root:a");
        assert_eq!(decision.rejected.len(), 1);
        assert_eq!(decision.rejected[0].reason, REASON_CAP_REACHED);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(false)),
        );
        // No truthy expressions: weighted score is 60% of scheduler.
        let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 80.0));
        let candidates = vec![ScoredCandidate::new("root:weak", 50.0)];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        assert!(decision.selected.is_empty());
        assert_eq!(decision.rejected[0].reason, REASON_BELOW_MINIMUM);
    }

    #[test]
    fn test_consensus_scenario() {
        let mut config = DecisionConfig::default();
        config.algorithm = FusionAlgorithm::Consensus;
        config.minimum_score = 70.0;
        // Policy scores: a gets 80 (base), b gets 90 (base + extra).
        let engine = make_engine(
            config,
            FnEvaluator::new(|expr, ctx| match expr.name.as_str() {
                "base" => Ok(ExpressionValue::Bool(true)),
                "extra" => Ok(ExpressionValue::Bool(ctx.workspace.name == "root:b")),
                _ => Ok(ExpressionValue::Bool(false)),
            }),
        );
        let request = make_request(0)
            .with_expression(PolicyExpression::new("base", "true", 80.0))
            .with_expression(PolicyExpression::new("extra", "b-only", 10.0));
        let candidates = vec![
            ScoredCandidate::new("root:a", 70.0),
            ScoredCandidate::new("root:b", 50.0),
        ];

        let decision = engine
            .make_placement_decision(&request, &candidates, &CancelToken::new())
            .unwrap();

        // a: both scores >= 70 -> (70+80)/2 = 75, selected.
        // b: scheduler 50 < 70 -> final 0, rejected.
        assert_eq!(decision.selected_workspaces(), vec!["root:a"]);
        assert!((decision.selected[0].final_score - 75.0).abs() < 1e-9);
        let b = decision
            .rejected
            .iter()
            .find(|r| r.workspace == "root:b")
            .unwrap();
        assert_eq!(b.final_score, 0.0);
        assert_eq!(b.reason, REASON_BELOW_MINIMUM);
    }

    #[test]
    fn test_empty_candidates_complete() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let decision = engine
            .make_placement_decision(&make_request(0), &[], &CancelToken::new())
            .unwrap();
        assert_eq!(decision.status, DecisionStatus::Complete);
        assert!(decision.selected.is_empty());
    }

    #[test]
    fn test_cancelled_token_fails_with_partial_state() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let decision = engine
            .make_placement_decision(
                &make_request(0),
                &[ScoredCandidate::new("root:a", 85.0)],
                &cancel,
            )
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(decision.error.as_deref().unwrap().contains("deadline"));
        assert!(decision
            .events
            .iter()
            .any(|e| e.event_type == DecisionEventType::Error));
    }

    #[test]
    fn test_request_deadline_in_past() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let request =
            make_request(0).with_deadline(Utc::now() - chrono::Duration::seconds(5));

        let decision = engine
            .make_placement_decision(
                &request,
                &[ScoredCandidate::new("root:a", 85.0)],
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(decision.status, DecisionStatus::Error);
    }

    #[test]
    fn test_validation_failure_marks_error() {
        let mut config = DecisionConfig::default();
        config.minimum_workspaces = 2;
        let engine = make_engine(config, FnEvaluator::constant(ExpressionValue::Bool(true)));
        let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 80.0));

        let decision = engine
            .make_placement_decision(
                &request,
                &[ScoredCandidate::new("root:only", 85.0)],
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Error);
        assert!(decision.error.is_some());
    }

    #[test]
    fn test_rationale_contents() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 80.0));
        let decision = engine
            .make_placement_decision(
                &request,
                &[ScoredCandidate::new("root:prod", 85.0)],
                &CancelToken::new(),
            )
            .unwrap();

        assert!(decision.rationale.summary.contains("1 of 1"));
        assert!(decision.rationale.weighting.contains("scheduler=60%"));
        assert_eq!(decision.rationale.scheduler_factors.len(), 1);
        assert_eq!(decision.rationale.policy_factors.len(), 1);
    }

    #[test]
    fn test_reservations_are_fresh_and_scoped() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 80.0));
        let candidate = ScoredCandidate::new("root:prod", 85.0)
            .with_capacity(WorkspaceCapacity::new(4000, 0, 0))
            .with_allocation(ResourceRequirements::new(500, 0, 0));

        let decision = engine
            .make_placement_decision(&request, &[candidate], &CancelToken::new())
            .unwrap();

        let allocation = &decision.selected[0].allocation;
        assert!(!allocation.reservation_id.is_empty());
        assert!(allocation.expires_at > decision.decision_time);
        assert_eq!(allocation.cpu_millis, 500);
    }

    #[test]
    fn test_rollback() {
        let engine = make_engine(
            DecisionConfig::default(),
            FnEvaluator::constant(ExpressionValue::Bool(true)),
        );
        let decision = engine
            .make_placement_decision(
                &make_request(0),
                &[ScoredCandidate::new("root:a", 85.0)],
                &CancelToken::new(),
            )
            .unwrap();

        let rolled = engine.rollback_decision(&decision, "deploy failed downstream");
        assert_eq!(rolled.status, DecisionStatus::RolledBack);
        assert!(rolled
            .events
            .iter()
            .any(|e| e.event_type == DecisionEventType::RolledBack));
        // Original untouched.
        assert_eq!(decision.status, DecisionStatus::Complete);
    }
}
