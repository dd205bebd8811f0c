//! The structured `Plan` an LLM produces during the planning phase, plus the
//! reflection and verification response shapes the coordinator parses on
//! later phases.

use serde::{Deserialize, Serialize};

/// Output of the pre-planning phase: a short understanding plus a
/// grounding-file shopping list for the coordinator to fetch read-only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrePlanningResult {
    pub understanding: String,
    #[serde(default)]
    pub files_to_fetch: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoalUnderstanding {
    pub main_objective: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub estimated_complexity: String,
    #[serde(default)]
    pub required_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskDecomposition {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub task_id: String,
    pub action_type: String,
    pub tool: String,
    pub purpose: String,
    pub expected_outcome: String,
    #[serde(default)]
    pub fallback_strategy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionPlan {
    #[serde(default)]
    pub execution_order: Vec<String>,
    #[serde(default)]
    pub actions: Vec<PlannedAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentVerification {
    pub command: String,
    pub expected_output: String,
}

/// Output of an environment-repair round: a corrected command list to run in
/// place of the commands from the failure point onward.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentRepairResult {
    #[serde(default)]
    pub corrected_commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedEnvironment {
    pub name: String,
    pub reason: String,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub verification: Vec<EnvironmentVerification>,
}

/// The full structured output of the planning phase. Persisted as a `plan`
/// planning-event and mutated in place (recorded as `revision`) on replans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal_understanding: GoalUnderstanding,
    pub task_decomposition: TaskDecomposition,
    pub action_plan: ActionPlan,
    pub selected_environment: SelectedEnvironment,
}

impl Plan {
    /// Find the next unfinished action id in execution order, given a set of
    /// action ids already completed.
    pub fn next_action<'a>(&'a self, completed: &std::collections::HashSet<String>) -> Option<&'a PlannedAction> {
        self.action_plan
            .execution_order
            .iter()
            .filter(|id| !completed.contains(*id))
            .find_map(|id| self.action_plan.actions.iter().find(|a| &a.task_id == id))
    }

    pub fn total_actions(&self) -> usize {
        self.action_plan.execution_order.len()
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Output of the reflection phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub status: String,
    pub evaluation: String,
    #[serde(default)]
    pub issues_identified: Vec<String>,
    pub plan_revision_needed: bool,
    #[serde(default)]
    pub plan_revision: Option<PlanRevision>,
    /// The model's confidence in `plan_revision_needed`, used to gate whether
    /// a revision is applied, held for clarification, or dropped.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// A targeted change to an in-flight plan, applied by the coordinator and
/// recorded as a `revision` planning event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRevision {
    #[serde(default)]
    pub additional_actions: Vec<PlannedAction>,
    #[serde(default)]
    pub additional_execution_order: Vec<String>,
    pub reason: String,
}

/// Output of the verification phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verification_passed: bool,
    #[serde(default)]
    pub issues_found: Vec<String>,
    pub placeholder_detected: PlaceholderDetection,
    pub additional_work_needed: bool,
    #[serde(default)]
    pub additional_actions: Vec<PlannedAction>,
    pub completion_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlaceholderDetection {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        Plan {
            goal_understanding: GoalUnderstanding::default(),
            task_decomposition: TaskDecomposition::default(),
            action_plan: ActionPlan {
                execution_order: vec!["a1".into(), "a2".into()],
                actions: vec![
                    PlannedAction {
                        task_id: "a1".into(),
                        action_type: "tool_call".into(),
                        tool: "run_command".into(),
                        purpose: "run tests".into(),
                        expected_outcome: "tests pass".into(),
                        fallback_strategy: None,
                    },
                    PlannedAction {
                        task_id: "a2".into(),
                        action_type: "tool_call".into(),
                        tool: "text_editor".into(),
                        purpose: "write readme".into(),
                        expected_outcome: "file exists".into(),
                        fallback_strategy: None,
                    },
                ],
            },
            selected_environment: SelectedEnvironment {
                name: "node".into(),
                reason: "js project".into(),
                setup_commands: vec![],
                verification: vec![],
            },
        }
    }

    #[test]
    fn next_action_skips_completed() {
        let plan = sample_plan();
        let mut completed = std::collections::HashSet::new();
        assert_eq!(plan.next_action(&completed).unwrap().task_id, "a1");
        completed.insert("a1".to_string());
        assert_eq!(plan.next_action(&completed).unwrap().task_id, "a2");
        completed.insert("a2".to_string());
        assert!(plan.next_action(&completed).is_none());
    }

    #[test]
    fn total_actions_counts_execution_order() {
        assert_eq!(sample_plan().total_actions(), 2);
    }
}
