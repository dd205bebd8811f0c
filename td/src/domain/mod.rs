//! Core domain types: tracker-item identity, the persisted task index row,
//! the structured planning/reflection/verification schemas, and the replan
//! budget/decision logic.

mod plan;
mod record;
mod replan;
mod task;
mod task_key;

pub use plan::{
    ActionPlan, EnvironmentRepairResult, EnvironmentVerification, GoalUnderstanding, PlaceholderDetection, Plan, PlanRevision,
    PlannedAction, PrePlanningResult, Reflection, SelectedEnvironment, Subtask, TaskDecomposition, VerificationResult,
};
pub use record::{TaskRecord, TaskStatus};
pub use replan::{evaluate_replan, ReplanDecision, ReplanOutcome, ReplanType, TargetPhase, GLOBAL_REPLAN_BUDGET};
pub use task::Task;
pub use task_key::TaskKey;

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store};
