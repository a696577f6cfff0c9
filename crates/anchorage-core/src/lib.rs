//! # Anchorage Core Library
//!
//! This library is the placement decision core of the Anchorage
//! multi-workspace workload orchestrator. Given a scheduler's
//! pre-scored candidate workspaces and a set of declarative policy
//! expressions, it chooses the workspaces that will host a workload,
//! records the decision with full rationale, and lets operators
//! intervene through typed overrides.
//!
//! ## Architecture
//!
//! - **Decision Engine**: fuses scheduler and policy scores under a
//!   selectable algorithm and picks winners and losers
//! - **Override Manager**: force/exclude/prefer/avoid overrides with
//!   conflict detection, priority ordering, and TTL lifecycle
//! - **Validator**: gates decisions on structural, resource, policy,
//!   and conflict invariants
//! - **Recorder**: append-only history with retention-driven pruning
//!   and queryable metrics
//!
//! The upstream scheduler, the expression evaluator, durable storage,
//! and event delivery are injected interfaces; the core never reaches
//! past them.
//!
//! ## Key Components
//!
//! - [`DecisionEngine`]: turns `(request, candidates)` into a decision
//! - [`OverrideManager`]: override lifecycle and application
//! - [`DecisionValidator`]: invariant gating and conflict detection
//! - [`DecisionRecorder`]: history, events, metrics, purge

pub mod cancel;
pub mod candidate;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod overrides;
pub mod record;
pub mod recorder;
pub mod request;
pub mod storage;
pub mod tasks;
pub mod validator;

pub use cancel::{CancelToken, Deadline};
pub use candidate::{ResourceUtilization, ScoredCandidate, WorkspaceCapacity, WorkspaceName};
pub use config::{DecisionConfig, RetentionPolicy};
pub use decision::{
    ConflictKind, ConflictSeverity, DecisionEvent, DecisionEventType, DecisionRationale,
    DecisionStatus, PlacementConflict, PlacementDecision, PolicyEvaluationResult,
    RejectedCandidate, ResourceAllocation, WorkspacePlacement,
};
pub use engine::{DecisionEngine, FusionAlgorithm};
pub use error::{
    ConfigError, ConflictError, CoreError, EvaluationError, Result, StorageError, ValidationError,
};
pub use evaluator::{
    CapacityContext, EvaluationContext, ExpressionEvaluator, ExpressionValue, FnEvaluator,
    RequestContext, WorkspaceContext,
};
pub use events::{EmittedEvent, EventRecorder, EventSeverity, LogEventRecorder, MemoryEventRecorder};
pub use overrides::{
    check_conflict, CleanupHandle, OverrideAction, OverrideConflict, OverrideHistoryEntry,
    OverrideManager, OverrideRequest, OverrideType, PlacementOverride,
};
pub use record::{
    DecisionAttempt, DecisionPhase, DecisionRecord, HistoryQuery, SortField, SortOrder, TimeRange,
};
pub use recorder::{
    DecisionMetrics, DecisionRecorder, MetricsSnapshot, PurgeHandle, PurgeSummary,
};
pub use request::{PlacementRequest, PolicyExpression, ResourceRequirements, SchedulerRequest};
pub use storage::{
    DecisionStorage, MemoryDecisionStorage, MemoryOverrideStorage, OverrideStorage,
};
pub use tasks::BackgroundTask;
pub use validator::{DecisionValidator, WorkspaceAttributeProvider};
