//! The six phase methods and the LLM-call wrappers they share.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::domain::{
    evaluate_replan, Plan, PlanRevision, PlannedAction, PrePlanningResult, Reflection, ReplanDecision, ReplanOutcome, ReplanType,
    TargetPhase, VerificationResult,
};
use crate::environment::{CommandOutput, ContainerStatus};
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, Message, ToolDefinition};
use crate::prompts::{
    EnvironmentRepairPromptContext, ExecutionPromptContext, PlanningPromptContext, PrePlanningPromptContext,
    ReflectionPromptContext, VerificationPromptContext,
};
use crate::tools::{ToolContext, ToolProfile};

use super::{clone_url, parse_json_response, repo_owner_name, Coordinator, CoordinatorError};

const SYSTEM_PROMPT: &str = "You are an autonomous software engineering agent working a single tracked issue, \
pull request, or merge request end to end. Follow the current phase's instructions exactly and, when asked \
for structured output, respond with nothing but the requested JSON object.";

const ENV_REPAIR_ROUNDS: u32 = 3;

/// Backoff schedule for a transient-looking setup-command failure: up to 3
/// retries of the same command before it's treated as repairable instead.
const SETUP_RETRY_BACKOFF_SECS: [u64; 3] = [5, 10, 20];

/// Substrings that mark a failed command as transient (network, timeout,
/// contention) rather than something an LLM-authored correction would fix.
const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "temporary failure",
    "could not resolve host",
    "network is unreachable",
    "resource temporarily unavailable",
    "try again",
    "lock",
];

fn looks_transient(output: &CommandOutput) -> bool {
    let combined = format!("{} {}", output.stdout, output.stderr).to_lowercase();
    output.exit_code == -1 || TRANSIENT_MARKERS.iter().any(|m| combined.contains(m))
}

fn ctx_err(e: eyre::Report) -> CoordinatorError {
    CoordinatorError::Context(e.to_string())
}

impl Coordinator {
    /// Send one completion request, appending the outgoing user message and
    /// any assistant text to the context log, and enforcing the per-task LLM
    /// call budget.
    async fn complete(&mut self, user_message: &str, tools: Vec<ToolDefinition>) -> Result<CompletionResponse, CoordinatorError> {
        if self.llm_calls >= self.planning.max_llm_process_num {
            return Err(CoordinatorError::LlmBudgetExhausted(self.planning.max_llm_process_num));
        }
        self.context.store().append_message("user", user_message, None).map_err(ctx_err)?;
        let history = self.context.current_messages().map_err(ctx_err)?;
        let messages = history
            .into_iter()
            .map(|m| match m.role.as_str() {
                "assistant" => Message::assistant(m.content),
                _ => Message::user(m.content),
            })
            .collect();

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages,
            tools,
            max_tokens: 4096,
        };
        self.llm_calls += 1;
        self.progress.llm_calls = self.llm_calls as u64;
        let response = self.llm.complete(request).await?;
        if let Some(text) = &response.content {
            self.context.store().append_message("assistant", text, None).map_err(ctx_err)?;
        }
        Ok(response)
    }

    /// `complete`, then parse the response as JSON, re-prompting with the
    /// parse error up to `max_parse_retries` times before giving up.
    async fn call_for_json<T: DeserializeOwned>(
        &mut self,
        phase: &'static str,
        user_message: String,
        tools: Vec<ToolDefinition>,
    ) -> Result<T, CoordinatorError> {
        let mut message = user_message;
        let max_attempts = self.planning.max_parse_retries.max(1);
        for attempt in 1..=max_attempts {
            let response = self.complete(&message, tools.clone()).await?;
            let text = response.content.unwrap_or_default();
            match parse_json_response::<T>(&text) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.parse_failures += 1;
                    if attempt == max_attempts {
                        return Err(CoordinatorError::ParseExhausted { phase, attempts: attempt, source: e });
                    }
                    message = format!(
                        "Your previous response could not be parsed as JSON ({e}). \
                        Respond again with ONLY a single JSON object matching the requested schema, \
                        no prose, no markdown fences."
                    );
                }
            }
        }
        unreachable!("loop always returns by the final attempt")
    }

    pub(super) async fn phase_pre_planning(&mut self) -> Result<PrePlanningResult, CoordinatorError> {
        self.events.phase_started("pre_planning");
        let started = Instant::now();
        self.progress.set_phase("pre_planning");
        self.update_comment().await?;

        let task_prompt = self.task.tracker.get_prompt().await?;
        let (repo_owner, repo_name) = repo_owner_name(&self.task.key);
        let ctx = PrePlanningPromptContext {
            task_prompt,
            repo_owner,
            repo_name,
            inherited_summary: self.inherited_summary.clone(),
        };
        let rendered = self.prompts.pre_planning(&ctx).map_err(ctx_err)?;
        let result: PrePlanningResult = self.call_for_json("pre_planning", rendered, vec![]).await?;

        // Not persisted as a planning event: `type` is one of
        // `{plan, revision, reflection, verification, replan_decision}`, and
        // pre-planning's output isn't any of those - it flows forward as
        // in-memory context into the planning phase instead.
        self.events.phase_completed("pre_planning", started.elapsed().as_millis() as u64);
        Ok(result)
    }

    pub(super) async fn phase_planning(&mut self, pre_planning: &PrePlanningResult) -> Result<Plan, CoordinatorError> {
        self.events.phase_started("planning");
        let started = Instant::now();
        self.progress.set_phase("planning");
        self.update_comment().await?;

        let task_prompt = self.task.tracker.get_prompt().await?;
        let available_environments = self
            .command_executor
            .environments
            .iter()
            .map(|(name, image)| crate::prompts::AvailableEnvironment {
                name: name.clone(),
                image: image.clone(),
            })
            .collect();
        let ctx = PlanningPromptContext {
            task_prompt,
            understanding: Some(pre_planning.understanding.clone()),
            // Pre-planning's files_to_fetch is advisory only: no container
            // exists yet to read from, so the requested paths travel as
            // plain text inside the prompt rather than as fetched content.
            grounding_files: vec![],
            available_environments,
        };
        let rendered = self.prompts.planning(&ctx).map_err(ctx_err)?;
        let plan: Plan = self.call_for_json("planning", rendered, vec![]).await?;

        self.context
            .store()
            .append_planning_event("plan", serde_json::to_value(&plan).unwrap_or_default())
            .map_err(ctx_err)?;

        let checklist = plan
            .task_decomposition
            .subtasks
            .iter()
            .map(|s| crate::progress::ChecklistItem {
                name: s.id.clone(),
                description: s.description.clone(),
                done: false,
            })
            .collect();
        self.progress.set_checklist(checklist);
        self.events.phase_completed("planning", started.elapsed().as_millis() as u64);
        Ok(plan)
    }

    pub(super) async fn phase_env_setup(&mut self, plan: &mut Plan) -> Result<(), CoordinatorError> {
        self.events.phase_started("env_setup");
        let started = Instant::now();
        self.progress.set_phase("env_setup");
        self.update_comment().await?;

        let url = clone_url(&self.task.key);
        let env_name = plan.selected_environment.name.clone();
        let mut container = self.environment.prepare(&self.task.uuid, &env_name, &url, None).await?;

        let mut round = 0u32;
        while container.status == ContainerStatus::Failed && round < ENV_REPAIR_ROUNDS {
            round += 1;
            let repair_ctx = EnvironmentRepairPromptContext {
                failed_command: format!("git clone {url}"),
                exit_code: -1,
                output: "clone into container failed; see environment manager logs".to_string(),
                round_number: round,
                max_rounds: ENV_REPAIR_ROUNDS,
            };
            let rendered = self.prompts.environment_repair(&repair_ctx).map_err(ctx_err)?;
            // A failed repair attempt is still informative context for the
            // next LLM call even though we don't act on tool calls here;
            // the repair phase only asks the model to confirm a retry makes
            // sense, then retries the same provisioning step.
            let _ = self.complete(&rendered, vec![]).await?;
            container = self.environment.prepare(&self.task.uuid, &env_name, &url, None).await?;
        }

        if container.status == ContainerStatus::Failed {
            return Err(CoordinatorError::Fatal(format!(
                "environment setup failed after {round} repair attempt(s) for container {}",
                container.container_name
            )));
        }

        self.environment_ready = self.run_setup_commands(&container.container_name, plan).await?;
        if self.environment_ready {
            self.environment_ready = self.run_verification_commands(&container.container_name, plan).await?;
        }

        self.events.phase_completed("env_setup", started.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Run `setup_commands` in order. A non-zero exit is classified:
    /// transient -> retry the same command with backoff; repairable -> ask
    /// the LLM for a corrected command list and splice it in from the
    /// failure point onward; a docker/system-level error is fatal - logged
    /// and the environment is marked not-ready, but setup still returns so
    /// execution can proceed. Returns whether every command ultimately
    /// succeeded.
    async fn run_setup_commands(&mut self, container_name: &str, plan: &mut Plan) -> Result<bool, CoordinatorError> {
        let mut repair_rounds = 0u32;
        let mut index = 0usize;
        while index < plan.selected_environment.setup_commands.len() {
            let cmd = plan.selected_environment.setup_commands[index].clone();
            let output = match self.execute_with_backoff(container_name, &cmd).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(task_uuid = %self.task.uuid, %cmd, error = %e, "setup command hit a fatal environment error, continuing without a fully ready environment");
                    return Ok(false);
                }
            };
            if output.exit_code == 0 {
                index += 1;
                continue;
            }

            if repair_rounds >= ENV_REPAIR_ROUNDS {
                tracing::warn!(task_uuid = %self.task.uuid, %cmd, "setup command repair budget exhausted, continuing without a fully ready environment");
                return Ok(false);
            }
            repair_rounds += 1;
            let repair_ctx = EnvironmentRepairPromptContext {
                failed_command: cmd.clone(),
                exit_code: output.exit_code,
                output: format!("{}\n{}", output.stdout, output.stderr),
                round_number: repair_rounds,
                max_rounds: ENV_REPAIR_ROUNDS,
            };
            let rendered = self.prompts.environment_repair(&repair_ctx).map_err(ctx_err)?;
            let repair: crate::domain::EnvironmentRepairResult = self.call_for_json("environment_repair", rendered, vec![]).await?;
            plan.selected_environment.setup_commands.splice(index.., repair.corrected_commands);
            // Retry at the same index now that the tail has been replaced.
        }
        Ok(true)
    }

    /// Run `verification[]`. Each check must exit 0 and produce stdout
    /// byte-for-byte equal to `expected_output` after trimming a trailing
    /// newline; a mismatch triggers an LLM-repair round whose corrected
    /// commands are run as remediation before the same check is retried.
    async fn run_verification_commands(&mut self, container_name: &str, plan: &Plan) -> Result<bool, CoordinatorError> {
        let mut repair_rounds = 0u32;
        let mut index = 0usize;
        while index < plan.selected_environment.verification.len() {
            let check = &plan.selected_environment.verification[index];
            let command = check.command.clone();
            let expected = check.expected_output.clone();
            let output = self.environment.execute_command(container_name, &command, None).await?;
            let actual = output.stdout.trim_end_matches('\n');
            if output.exit_code == 0 && actual == expected.trim_end_matches('\n') {
                index += 1;
                continue;
            }

            if repair_rounds >= ENV_REPAIR_ROUNDS {
                tracing::warn!(task_uuid = %self.task.uuid, command = %command, "verification repair budget exhausted, continuing without a fully ready environment");
                return Ok(false);
            }
            repair_rounds += 1;
            let repair_ctx = EnvironmentRepairPromptContext {
                failed_command: command.clone(),
                exit_code: output.exit_code,
                output: format!("expected stdout:\n{expected}\n\nactual stdout:\n{}\n\nstderr:\n{}", output.stdout, output.stderr),
                round_number: repair_rounds,
                max_rounds: ENV_REPAIR_ROUNDS,
            };
            let rendered = self.prompts.environment_repair(&repair_ctx).map_err(ctx_err)?;
            let repair: crate::domain::EnvironmentRepairResult = self.call_for_json("environment_repair", rendered, vec![]).await?;
            for remediation in &repair.corrected_commands {
                self.environment.execute_command(container_name, remediation, None).await?;
            }
            // Retry the same check now that remediation commands have run.
        }
        Ok(true)
    }

    /// Run one command, retrying on a transient-looking failure with
    /// 5/10/20s backoff (up to 3 tries total for that command).
    async fn execute_with_backoff(&self, container_name: &str, cmd: &str) -> Result<CommandOutput, crate::environment::EnvironmentError> {
        let mut output = self.environment.execute_command(container_name, cmd, None).await?;
        for &backoff in SETUP_RETRY_BACKOFF_SECS.iter() {
            if output.exit_code == 0 || !looks_transient(&output) {
                break;
            }
            tracing::warn!(task_uuid = %self.task.uuid, %cmd, exit_code = output.exit_code, backoff, "setup command looks transient, retrying after backoff");
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            output = self.environment.execute_command(container_name, cmd, None).await?;
        }
        Ok(output)
    }

    pub(super) async fn phase_execution(&mut self, plan: &mut Plan) -> Result<(), CoordinatorError> {
        self.events.phase_started("execution");
        let started = Instant::now();
        self.progress.set_phase("execution");

        let tool_ctx = ToolContext::new(self.task.uuid.clone(), "/workspace/project".to_string(), self.environment.clone());

        let mut completed: HashSet<String> = HashSet::new();
        let mut last_tool_result: Option<String> = None;
        let mut actions_since_reflection = 0u32;

        while let Some(action) = plan.next_action(&completed).cloned() {
            self.check_watchers().await?;

            let ctx = ExecutionPromptContext {
                goal: plan.goal_understanding.main_objective.clone(),
                current_action: format!("{} via {}", action.action_type, action.tool),
                current_subtask: action.purpose.clone(),
                progress_summary: format!("{}/{} actions complete", self.progress.done_count(), plan.total_actions()),
                last_tool_result: last_tool_result.clone(),
            };
            let rendered = self.prompts.execution(&ctx).map_err(ctx_err)?;
            let tool_defs = self.tools.definitions_for_profile(ToolProfile::Full);
            let response = self.complete(&rendered, tool_defs).await?;

            let mut action_failed = false;
            if !response.tool_calls.is_empty() {
                let results = self.tools.execute_all(&response.tool_calls, &tool_ctx).await;
                for (call, (_, result, duration_ms)) in response.tool_calls.iter().zip(results.iter()) {
                    self.events.tool_call_started(&call.name);
                    self.context
                        .store()
                        .append_tool_call(
                            &call.name,
                            call.input.clone(),
                            Some(serde_json::json!({ "content": result.content, "is_error": result.is_error })),
                            if result.is_error { "error" } else { "success" },
                            result.is_error.then(|| result.content.as_str()),
                            *duration_ms,
                        )
                        .map_err(ctx_err)?;
                    self.events.tool_call_completed(&call.name, !result.is_error, *duration_ms);
                    action_failed = action_failed || result.is_error;
                    last_tool_result = Some(result.content.clone());
                }
                let blocks: Vec<ContentBlock> = results
                    .iter()
                    .map(|(id, result, _)| ContentBlock::tool_result(id, &result.content, result.is_error))
                    .collect();
                self.context
                    .store()
                    .append_message("user", &serde_json::to_string(&blocks).unwrap_or_default(), Some("tool_result"))
                    .map_err(ctx_err)?;
            }

            completed.insert(action.task_id.clone());
            self.progress.mark_done(&action.task_id);
            self.update_comment().await?;
            actions_since_reflection += 1;

            let should_reflect = self.planning.reflection.enabled
                && (action_failed && self.planning.reflection.trigger_on_error
                    || actions_since_reflection >= self.planning.reflection.trigger_interval);
            if should_reflect {
                actions_since_reflection = 0;
                let reason = if action_failed {
                    format!("tool call failed during action {}", action.task_id)
                } else {
                    format!("reached reflection interval after action {}", action.task_id)
                };
                self.phase_reflection(plan, &reason, last_tool_result.as_deref().unwrap_or("(no tool output)")).await?;
            }
        }

        self.events.phase_completed("execution", started.elapsed().as_millis() as u64);
        Ok(())
    }

    pub(super) async fn phase_reflection(&mut self, plan: &mut Plan, trigger_reason: &str, last_action_result: &str) -> Result<(), CoordinatorError> {
        self.events.phase_started("reflection");
        let started = Instant::now();
        let previous_phase = self.progress.current_phase.clone();
        self.progress.set_phase("reflection");

        let ctx = ReflectionPromptContext {
            trigger_reason: trigger_reason.to_string(),
            last_action_result: last_action_result.to_string(),
            plan_summary: summarize_plan(plan),
        };
        let rendered = self.prompts.reflection(&ctx).map_err(ctx_err)?;
        let reflection: Reflection = self.call_for_json("reflection", rendered, vec![]).await?;
        self.events.emit(crate::events::AgentEvent::ReflectionTriggered {
            task_uuid: self.task.uuid.clone(),
            reason: trigger_reason.to_string(),
        });
        self.context
            .store()
            .append_planning_event("reflection", serde_json::to_value(&reflection).unwrap_or_default())
            .map_err(ctx_err)?;

        if reflection.plan_revision_needed {
            if let Some(revision) = reflection.plan_revision.clone() {
                let decision = ReplanDecision {
                    replan_needed: true,
                    confidence: reflection.confidence,
                    reasoning: reflection.evaluation.clone(),
                    replan_type: ReplanType::PlanRevision,
                    target_phase: TargetPhase::Execution,
                    replan_level: 1,
                    issues_found: reflection.issues_identified.clone(),
                    recommended_actions: vec![],
                    clarification_needed: false,
                    clarification_questions: vec![],
                };
                let outcome = evaluate_replan(
                    &decision,
                    self.replan_budget.applied_for(ReplanType::PlanRevision),
                    self.replan_budget.total,
                );

                let outcome_key = match outcome {
                    ReplanOutcome::Applied => "applied",
                    ReplanOutcome::ClarificationRequested => "clarification_requested",
                    ReplanOutcome::Dropped => "dropped",
                    ReplanOutcome::BudgetExhausted => "budget_exhausted",
                };
                // Persisted regardless of outcome - this is what makes the
                // replan-budget property auditable.
                self.context
                    .store()
                    .append_planning_event(
                        "replan_decision",
                        serde_json::json!({
                            "decision": decision,
                            "outcome": outcome_key,
                            "applied": outcome == ReplanOutcome::Applied,
                        }),
                    )
                    .map_err(ctx_err)?;

                match outcome {
                    ReplanOutcome::Applied => {
                        self.replan_budget.record_applied(ReplanType::PlanRevision);
                        apply_plan_revision(plan, &revision);
                        let extra_checklist: Vec<_> = revision
                            .additional_actions
                            .iter()
                            .map(|a| crate::progress::ChecklistItem {
                                name: a.task_id.clone(),
                                description: a.purpose.clone(),
                                done: false,
                            })
                            .collect();
                        self.progress.checklist.extend(extra_checklist);
                        self.progress
                            .push_history(chrono::Utc::now(), "plan revised", revision.reason.clone());
                        self.events.emit(crate::events::AgentEvent::ReplanApplied {
                            task_uuid: self.task.uuid.clone(),
                            replan_type: "plan_revision".to_string(),
                            target_phase: "execution".to_string(),
                        });
                        self.context
                            .store()
                            .append_planning_event("revision", serde_json::to_value(&revision).unwrap_or_default())
                            .map_err(ctx_err)?;
                    }
                    ReplanOutcome::ClarificationRequested => {
                        self.progress.push_history(
                            chrono::Utc::now(),
                            "clarification requested",
                            "reflection confidence too low to revise the plan unattended, waiting for clarification".to_string(),
                        );
                        self.update_comment().await?;
                        tracing::info!(task_uuid = %self.task.uuid, confidence = decision.confidence, "reflection revision held pending clarification");
                    }
                    ReplanOutcome::Dropped => {
                        tracing::info!(task_uuid = %self.task.uuid, confidence = decision.confidence, "reflection revision dropped, confidence too low");
                    }
                    ReplanOutcome::BudgetExhausted => {
                        tracing::info!(task_uuid = %self.task.uuid, "reflection requested a revision but the replan budget is exhausted");
                    }
                }
            }
        }

        self.progress.set_phase(&previous_phase);
        self.events.phase_completed("reflection", started.elapsed().as_millis() as u64);
        Ok(())
    }

    pub(super) async fn phase_verification(&mut self, plan: &Plan, round_number: u32) -> Result<VerificationResult, CoordinatorError> {
        self.events.phase_started("verification");
        let started = Instant::now();
        self.progress.set_phase("verification");
        self.update_comment().await?;

        let task_prompt = self.task.tracker.get_prompt().await?;
        let ctx = VerificationPromptContext {
            task_prompt,
            plan_summary: summarize_plan(plan),
            round_number,
            max_rounds: self.planning.verification.max_rounds,
        };
        let rendered = self.prompts.verification(&ctx).map_err(ctx_err)?;
        let result: VerificationResult = self.call_for_json("verification", rendered, vec![]).await?;
        self.context
            .store()
            .append_planning_event("verification", serde_json::to_value(&result).unwrap_or_default())
            .map_err(ctx_err)?;
        self.events.phase_completed("verification", started.elapsed().as_millis() as u64);
        Ok(result)
    }

    pub(super) fn apply_additional_actions(&mut self, plan: &mut Plan, actions: Vec<PlannedAction>) {
        let extra_checklist: Vec<_> = actions
            .iter()
            .map(|a| crate::progress::ChecklistItem {
                name: a.task_id.clone(),
                description: a.purpose.clone(),
                done: false,
            })
            .collect();
        self.progress.checklist.extend(extra_checklist);
        for action in actions {
            plan.action_plan.execution_order.push(action.task_id.clone());
            plan.action_plan.actions.push(action);
        }
    }
}

fn summarize_plan(plan: &Plan) -> String {
    format!(
        "{} ({} subtasks, {} planned actions, environment: {})",
        plan.goal_understanding.main_objective,
        plan.task_decomposition.subtasks.len(),
        plan.total_actions(),
        plan.selected_environment.name,
    )
}

fn apply_plan_revision(plan: &mut Plan, revision: &PlanRevision) {
    for action in &revision.additional_actions {
        plan.action_plan.actions.push(action.clone());
    }
    for id in &revision.additional_execution_order {
        plan.action_plan.execution_order.push(id.clone());
    }
}
