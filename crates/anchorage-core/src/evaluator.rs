//! Policy expression evaluation seam.
//!
//! The expression language itself lives outside the core. The engine
//! builds an [`EvaluationContext`] per `(candidate, expression)` pair
//! and hands both to the injected [`ExpressionEvaluator`]. Compilation
//! and its caching are the evaluator's own concern.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candidate::{ResourceUtilization, ScoredCandidate, WorkspaceCapacity, WorkspaceName};
use crate::error::EvaluationError;
use crate::request::{PlacementRequest, PolicyExpression, ResourceRequirements};

/// The value an expression evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ExpressionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ExpressionValue {
    /// Truthiness: `true`, non-zero numbers, and non-empty strings.
    pub fn is_truthy(&self) -> bool {
        match self {
            ExpressionValue::Bool(b) => *b,
            ExpressionValue::Int(n) => *n != 0,
            ExpressionValue::Float(f) => *f != 0.0,
            ExpressionValue::Str(s) => !s.is_empty(),
        }
    }
}

/// Workspace-side fields bound into an evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub name: WorkspaceName,
    pub labels: HashMap<String, String>,
    pub ready: bool,
}

/// Request-side fields bound into an evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub requirements: ResourceRequirements,
}

/// Capacity-side fields bound into an evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityContext {
    pub available: WorkspaceCapacity,
    pub usage: WorkspaceCapacity,
    pub utilization: ResourceUtilization,
}

/// The context one `(candidate, expression)` evaluation runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub workspace: WorkspaceContext,
    pub request: RequestContext,
    pub capacity: CapacityContext,
}

impl EvaluationContext {
    /// Bind a candidate and a request into an evaluation context.
    pub fn for_candidate(request: &PlacementRequest, candidate: &ScoredCandidate) -> Self {
        Self {
            workspace: WorkspaceContext {
                name: candidate.workspace.clone(),
                labels: candidate.labels.clone(),
                ready: candidate.ready,
            },
            request: RequestContext {
                id: request.id.clone(),
                name: request.name.clone(),
                priority: request.scheduler.priority,
                requirements: request.scheduler.requirements,
            },
            capacity: CapacityContext {
                available: candidate.capacity,
                usage: candidate.usage,
                utilization: candidate.utilization(),
            },
        }
    }
}

/// External evaluator for policy expressions.
///
/// Implementations compile expressions as needed and are responsible
/// for their own compilation caching; the engine calls `evaluate` once
/// per `(candidate, expression)` pair.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &PolicyExpression,
        context: &EvaluationContext,
    ) -> Result<ExpressionValue, EvaluationError>;
}

/// Closure-backed evaluator for hosts and tests.
pub struct FnEvaluator {
    f: Box<
        dyn Fn(&PolicyExpression, &EvaluationContext) -> Result<ExpressionValue, EvaluationError>
            + Send
            + Sync,
    >,
}

impl FnEvaluator {
    /// Wrap a closure as an evaluator.
    pub fn new(
        f: impl Fn(&PolicyExpression, &EvaluationContext) -> Result<ExpressionValue, EvaluationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }

    /// An evaluator that returns the same value for every pair.
    pub fn constant(value: ExpressionValue) -> Self {
        Self::new(move |_, _| Ok(value.clone()))
    }
}

impl ExpressionEvaluator for FnEvaluator {
    fn evaluate(
        &self,
        expression: &PolicyExpression,
        context: &EvaluationContext,
    ) -> Result<ExpressionValue, EvaluationError> {
        (self.f)(expression, context)
    }
}
