//! `ReplanDecision` - the distinct class of LLM output that can redirect the
//! coordinator's phase state machine at any boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanType {
    ClarificationRequest,
    GoalRevision,
    TaskRedecomposition,
    ActionRegeneration,
    PartialReplan,
    FullReplan,
    PlanRevision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    PrePlanning,
    Planning,
    EnvSetup,
    Execution,
    Reflection,
    Verification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanDecision {
    pub replan_needed: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub replan_type: ReplanType,
    pub target_phase: TargetPhase,
    #[serde(default = "default_level")]
    pub replan_level: u8,
    #[serde(default)]
    pub issues_found: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub clarification_needed: bool,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
}

fn default_level() -> u8 {
    1
}

/// What the coordinator decided to do with a `ReplanDecision`, recorded in
/// the audit trail regardless of outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplanOutcome {
    Applied,
    ClarificationRequested,
    Dropped,
    BudgetExhausted,
}

impl ReplanType {
    /// Per-phase budget for how many times this replan type may be applied
    /// over the life of one task.
    pub fn per_phase_budget(self) -> u32 {
        match self {
            ReplanType::ClarificationRequest => 2,
            ReplanType::TaskRedecomposition => 3,
            ReplanType::ActionRegeneration => 3,
            ReplanType::PartialReplan => 2,
            ReplanType::PlanRevision => 2,
            ReplanType::GoalRevision | ReplanType::FullReplan => 1,
        }
    }
}

/// Global cap on applied replans across all types, for one task.
pub const GLOBAL_REPLAN_BUDGET: u32 = 10;

/// Decide what to do with a replan recommendation given current budget
/// counters. Does not mutate any state - callers apply the outcome.
pub fn evaluate_replan(decision: &ReplanDecision, applied_for_type: u32, applied_total: u32) -> ReplanOutcome {
    if !decision.replan_needed {
        return ReplanOutcome::Dropped;
    }
    if decision.confidence < 0.3 {
        return ReplanOutcome::Dropped;
    }
    if decision.confidence < 0.5 {
        return ReplanOutcome::ClarificationRequested;
    }
    if applied_for_type >= decision.replan_type.per_phase_budget() || applied_total >= GLOBAL_REPLAN_BUDGET {
        return ReplanOutcome::BudgetExhausted;
    }
    ReplanOutcome::Applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(confidence: f64, replan_type: ReplanType) -> ReplanDecision {
        ReplanDecision {
            replan_needed: true,
            confidence,
            reasoning: "test".into(),
            replan_type,
            target_phase: TargetPhase::Execution,
            replan_level: 1,
            issues_found: vec![],
            recommended_actions: vec![],
            clarification_needed: false,
            clarification_questions: vec![],
        }
    }

    #[test]
    fn low_confidence_is_dropped() {
        let d = decision(0.1, ReplanType::PartialReplan);
        assert_eq!(evaluate_replan(&d, 0, 0), ReplanOutcome::Dropped);
    }

    #[test]
    fn mid_confidence_requests_clarification() {
        let d = decision(0.4, ReplanType::PartialReplan);
        assert_eq!(evaluate_replan(&d, 0, 0), ReplanOutcome::ClarificationRequested);
    }

    #[test]
    fn high_confidence_within_budget_applies() {
        let d = decision(0.9, ReplanType::PartialReplan);
        assert_eq!(evaluate_replan(&d, 0, 0), ReplanOutcome::Applied);
    }

    #[test]
    fn exhausted_per_type_budget_blocks_even_high_confidence() {
        let d = decision(0.9, ReplanType::PartialReplan);
        assert_eq!(evaluate_replan(&d, 2, 2), ReplanOutcome::BudgetExhausted);
    }

    #[test]
    fn exhausted_global_budget_blocks_regardless_of_type() {
        let d = decision(0.9, ReplanType::ClarificationRequest);
        assert_eq!(evaluate_replan(&d, 0, GLOBAL_REPLAN_BUDGET), ReplanOutcome::BudgetExhausted);
    }

    #[test]
    fn replan_not_needed_is_dropped_even_at_high_confidence() {
        let mut d = decision(0.9, ReplanType::PartialReplan);
        d.replan_needed = false;
        assert_eq!(evaluate_replan(&d, 0, 0), ReplanOutcome::Dropped);
    }
}
