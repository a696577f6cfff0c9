//! End-to-end decision scenarios.
//!
//! Exercises the full engine pipeline: policy evaluation, fusion,
//! selection, rationale, and validation.

use std::sync::Arc;

use anchorage_core::{
    CancelToken, DecisionConfig, DecisionEngine, DecisionRecorder, DecisionStatus,
    DecisionValidator, ExpressionValue, FnEvaluator, FusionAlgorithm, MemoryDecisionStorage,
    MemoryEventRecorder, MemoryOverrideStorage, OverrideManager, PlacementRequest,
    PolicyExpression, ResourceRequirements, RetentionPolicy, SchedulerRequest, ScoredCandidate,
};

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
fn test_weighted_score_selects_both_in_order() {
    let engine = make_engine(
        DecisionConfig::default(),
        FnEvaluator::constant(ExpressionValue::Bool(true)),
    );
    let request = make_request(0)
        .with_expression(PolicyExpression::new("prefer-ready", "workspace.ready", 80.0));
    let candidates = vec![
        ScoredCandidate::new("root:org:prod", 85.0),
        ScoredCandidate::new("root:org:stage", 75.0),
    ];

    let decision = engine
        .make_placement_decision(&request, &candidates, &CancelToken::new())
        .unwrap();

    assert_eq!(decision.status, DecisionStatus::Complete);
    assert_eq!(
        decision.selected_workspaces(),
        vec!["root:org:prod", "root:org:stage"]
    );
    assert!((decision.selected[0].final_score - 83.0).abs() < 1e-9);
    assert!((decision.selected[1].final_score - 77.0).abs() < 1e-9);
    assert!(decision.rejected.is_empty());
}

#[test]
fn test_required_expression_disqualifies() {
    let engine = make_engine(
        DecisionConfig::default(),
        FnEvaluator::constant(ExpressionValue::Bool(false)),
    );
    let request = make_request(0)
        .with_expression(PolicyExpression::new("must-be-ready", "workspace.ready", 50.0).require());
    let candidates = vec![ScoredCandidate::new("root:org:dev", 60.0)];

    let decision = engine
        .make_placement_decision(&request, &candidates, &CancelToken::new())
        .unwrap();

    assert_eq!(decision.status, DecisionStatus::Complete);
    assert!(decision.selected.is_empty());
    assert_eq!(decision.rejected.len(), 1);
    assert!(decision.rejected[0].reason.contains("required"));
}

#[test]
fn test_consensus_rejects_below_scheduler_threshold() {
    let mut config = DecisionConfig::default();
    config.algorithm = FusionAlgorithm::Consensus;
    config.minimum_score = 70.0;
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

    assert_eq!(decision.selected_workspaces(), vec!["root:a"]);
    assert!((decision.selected[0].final_score - 75.0).abs() < 1e-9);
    let b = decision
        .rejected
        .iter()
        .find(|r| r.workspace == "root:b")
        .unwrap();
    assert_eq!(b.final_score, 0.0);
}

#[test]
fn test_every_candidate_lands_exactly_once() {
    let engine = make_engine(
        DecisionConfig::default(),
        FnEvaluator::new(|_, ctx| Ok(ExpressionValue::Bool(ctx.workspace.name.len() % 2 == 0))),
    );
    let request = make_request(2)
        .with_expression(PolicyExpression::new("spread", "x", 40.0));
    let candidates: Vec<_> = (0..6)
        .map(|i| ScoredCandidate::new(format!("root:ws{i}"), 30.0 + 10.0 * i as f64))
        .collect();

    let decision = engine
        .make_placement_decision(&request, &candidates, &CancelToken::new())
        .unwrap();

    assert_eq!(decision.selected.len() + decision.rejected.len(), candidates.len());
    let mut names: Vec<_> = decision
        .selected
        .iter()
        .map(|p| p.workspace.clone())
        .chain(decision.rejected.iter().map(|r| r.workspace.clone()))
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), candidates.len());
}

#[test]
fn test_selected_sorted_by_final_score_descending() {
    let engine = make_engine(
        DecisionConfig::default(),
        FnEvaluator::constant(ExpressionValue::Bool(true)),
    );
    let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 60.0));
    let candidates = vec![
        ScoredCandidate::new("root:mid", 70.0),
        ScoredCandidate::new("root:best", 95.0),
        ScoredCandidate::new("root:low", 55.0),
    ];

    let decision = engine
        .make_placement_decision(&request, &candidates, &CancelToken::new())
        .unwrap();

    let finals: Vec<f64> = decision.selected.iter().map(|p| p.final_score).collect();
    let mut sorted = finals.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(finals, sorted);
    assert_eq!(decision.selected[0].workspace, "root:best");
}

#[test]
fn test_tie_breaks_on_scheduler_score() {
    // Identical weighted finals: schedulerish (80, 0) -> 48 and
    // policyish (40, 60) -> 48. The higher scheduler score must sort
    // first under WeightedScore.
    let mut config = DecisionConfig::default();
    config.minimum_score = 40.0;
    let engine = make_engine(
        config,
        FnEvaluator::new(|_, ctx| {
            Ok(ExpressionValue::Bool(ctx.workspace.name == "root:policyish"))
        }),
    );
    let request = make_request(0).with_expression(PolicyExpression::new("soft", "x", 60.0));
    let candidates = vec![
        ScoredCandidate::new("root:policyish", 40.0),
        ScoredCandidate::new("root:schedulerish", 80.0),
    ];

    let decision = engine
        .make_placement_decision(&request, &candidates, &CancelToken::new())
        .unwrap();

    assert_eq!(decision.selected.len(), 2);
    assert!((decision.selected[0].final_score - decision.selected[1].final_score).abs() < 1e-9);
    assert_eq!(decision.selected[0].workspace, "root:schedulerish");
}

#[test]
fn test_audit_events_bracket_the_decision() {
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

    use anchorage_core::DecisionEventType::*;
    let kinds: Vec<_> = decision.events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds.first(), Some(&Started));
    assert!(kinds.contains(&SchedulerEvaluated));
    assert!(kinds.contains(&CelEvaluated));
    assert_eq!(kinds.last(), Some(&Completed));
}
