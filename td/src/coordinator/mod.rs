//! The per-task phase state machine: pre-planning -> planning -> env setup
//! -> execution <-> reflection -> verification -> complete.
//!
//! One `Coordinator` drives one dequeued task end to end. It is the only
//! thing that talks to the LLM, the tool executor, and the environment
//! manager on this task's behalf, and owns the task's context directory,
//! progress comment, and state-index row for the lifetime of the attempt.

mod parse;
mod phases;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::config::{CommandExecutorConfig, PlanningConfig};
use crate::context::ContextBridge;
use crate::domain::{ReplanType, Task, TaskKey, TaskRecord, TaskStatus};
use crate::environment::EnvironmentManager;
use crate::events::{AgentEvent, EventEmitter};
use crate::llm::LlmClient;
use crate::progress::ProgressComment;
use crate::prompts::PromptLoader;
use crate::state::StateManager;
use crate::tools::ToolExecutor;
use crate::tracker::TrackerError;
use crate::watcher::{PauseWatcher, StopWatcher};

pub use parse::{parse_json_response, ParseError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("llm error: {0}")]
    Llm(#[from] crate::llm::LlmError),
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("environment error: {0}")]
    Environment(#[from] crate::environment::EnvironmentError),
    #[error("context store error: {0}")]
    Context(String),
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("gave up parsing a {phase} response after {attempts} attempt(s): {source}")]
    ParseExhausted { phase: &'static str, attempts: u32, source: ParseError },
    #[error("exceeded max_llm_process_num ({0}) LLM calls")]
    LlmBudgetExhausted(u32),
    #[error("{0}")]
    Fatal(String),
    #[error("task was paused")]
    Paused,
    #[error("task was stopped")]
    Stopped,
}

/// How a task attempt ended, for the caller (consumer) to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Paused,
    Stopped,
}

/// Per-type and global counters for applied `ReplanDecision`s, mirroring the
/// budgets in `domain::replan`.
struct ReplanBudget {
    per_type: HashMap<&'static str, u32>,
    total: u32,
}

impl ReplanBudget {
    fn new() -> Self {
        Self {
            per_type: HashMap::new(),
            total: 0,
        }
    }

    fn applied_for(&self, t: ReplanType) -> u32 {
        *self.per_type.get(replan_type_key(t)).unwrap_or(&0)
    }

    fn record_applied(&mut self, t: ReplanType) {
        *self.per_type.entry(replan_type_key(t)).or_insert(0) += 1;
        self.total += 1;
    }
}

fn replan_type_key(t: ReplanType) -> &'static str {
    match t {
        ReplanType::ClarificationRequest => "clarification_request",
        ReplanType::GoalRevision => "goal_revision",
        ReplanType::TaskRedecomposition => "task_redecomposition",
        ReplanType::ActionRegeneration => "action_regeneration",
        ReplanType::PartialReplan => "partial_replan",
        ReplanType::FullReplan => "full_replan",
        ReplanType::PlanRevision => "plan_revision",
    }
}

fn repo_owner_name(key: &TaskKey) -> (String, String) {
    match key {
        TaskKey::GithubIssue { owner, repo, .. } | TaskKey::GithubPullRequest { owner, repo, .. } => (owner.clone(), repo.clone()),
        TaskKey::GitlabIssue { project_id, .. } | TaskKey::GitlabMergeRequest { project_id, .. } => (project_id.to_string(), project_id.to_string()),
    }
}

fn clone_url(key: &TaskKey) -> String {
    match key {
        TaskKey::GithubIssue { owner, repo, .. } | TaskKey::GithubPullRequest { owner, repo, .. } => {
            format!("https://github.com/{owner}/{repo}.git")
        }
        TaskKey::GitlabIssue { project_id, .. } | TaskKey::GitlabMergeRequest { project_id, .. } => {
            format!("https://gitlab.com/-/snippets/{project_id}.git")
        }
    }
}

/// Drives one task attempt through every phase of the state machine.
pub struct Coordinator {
    task: Task,
    llm: Arc<dyn LlmClient>,
    tools: ToolExecutor,
    environment: Arc<EnvironmentManager>,
    prompts: PromptLoader,
    context: ContextBridge,
    events: EventEmitter,
    state: StateManager,
    pause: PauseWatcher,
    stop: StopWatcher,
    planning: PlanningConfig,
    command_executor: CommandExecutorConfig,
    progress: ProgressComment,
    progress_comment_id: Option<String>,
    record: TaskRecord,
    replan_budget: ReplanBudget,
    llm_calls: u32,
    parse_failures: u32,
    inherited_summary: Option<String>,
    /// Flipped to `false` when environment setup hits a fatal (docker/system)
    /// command failure or exhausts its repair budget; execution still
    /// proceeds, since the task may not need the unready part of the
    /// environment.
    environment_ready: bool,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task: Task,
        llm: Arc<dyn LlmClient>,
        tools: ToolExecutor,
        environment: Arc<EnvironmentManager>,
        prompts: PromptLoader,
        context: ContextBridge,
        events: EventEmitter,
        state: StateManager,
        pause: PauseWatcher,
        stop: StopWatcher,
        planning: PlanningConfig,
        command_executor: CommandExecutorConfig,
        record: TaskRecord,
        inherited_summary: Option<String>,
    ) -> Self {
        Self {
            task,
            llm,
            tools,
            environment,
            prompts,
            context,
            events,
            state,
            pause,
            stop,
            planning,
            command_executor,
            progress: ProgressComment::new(Utc::now()),
            progress_comment_id: None,
            record,
            replan_budget: ReplanBudget::new(),
            llm_calls: 0,
            parse_failures: 0,
            inherited_summary,
            environment_ready: true,
        }
    }

    /// Run every phase to completion, or until the task is paused, stopped,
    /// or fails. Never returns `Err` - every outcome, including failure, is
    /// reported back through `Outcome` after the tracker/state/context side
    /// effects for that outcome have been applied.
    pub async fn run(&mut self) -> Outcome {
        info!(task_uuid = %self.task.uuid, is_resumed = self.task.is_resumed, "Coordinator::run: starting");
        match self.drive().await {
            Ok(()) => self.finish(Outcome::Completed).await,
            Err(CoordinatorError::Paused) => self.finish(Outcome::Paused).await,
            Err(CoordinatorError::Stopped) => self.finish(Outcome::Stopped).await,
            Err(e) => self.finish_failed(e).await,
        }
    }

    async fn drive(&mut self) -> Result<(), CoordinatorError> {
        self.task.tracker.prepare().await?;
        self.update_comment().await?;
        self.check_watchers().await?;

        let pre_planning = self.phase_pre_planning().await?;
        let mut plan = self.phase_planning(&pre_planning).await?;
        self.check_watchers().await?;
        self.phase_env_setup(&mut plan).await?;

        let mut verification_round = 0u32;
        loop {
            self.check_watchers().await?;
            self.phase_execution(&mut plan).await?;

            if !self.planning.verification.enabled {
                break;
            }
            verification_round += 1;
            let result = self.phase_verification(&plan, verification_round).await?;
            if result.additional_work_needed && verification_round < self.planning.verification.max_rounds {
                self.apply_additional_actions(&mut plan, result.additional_actions);
                continue;
            }
            break;
        }
        Ok(())
    }

    async fn check_watchers(&mut self) -> Result<(), CoordinatorError> {
        if self.pause.is_paused() {
            info!(task_uuid = %self.task.uuid, "Coordinator: pause signal observed");
            return Err(CoordinatorError::Paused);
        }
        if self.stop.is_stopped().await {
            info!(task_uuid = %self.task.uuid, "Coordinator: bot no longer assigned, treating as stopped");
            return Err(CoordinatorError::Stopped);
        }
        Ok(())
    }

    async fn update_comment(&mut self) -> Result<(), CoordinatorError> {
        let rendered = self.progress.render(Utc::now());
        if let Some(id) = self.progress_comment_id.clone() {
            self.task.tracker.update_comment(&id, &rendered).await?;
        } else {
            let id = self.task.tracker.comment(&rendered).await?;
            self.progress_comment_id = Some(id);
        }
        Ok(())
    }

    fn final_summary(&self) -> String {
        format!(
            "Completed {}/{} planned action(s) across {} LLM call(s).",
            self.progress.done_count(),
            self.progress.checklist.len(),
            self.llm_calls
        )
    }

    async fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.record.completed_at = Some(taskstore::now_ms());
        let result: Result<(), CoordinatorError> = async {
            match outcome {
                Outcome::Completed => {
                    self.record.status = TaskStatus::Completed;
                    self.progress.status = "completed".to_string();
                    let summary = self.final_summary();
                    self.context.complete(&summary).map_err(|e| CoordinatorError::Context(e.to_string()))?;
                    self.task.tracker.finish().await?;
                    self.events.emit(AgentEvent::TaskCompleted { task_uuid: self.task.uuid.clone() });
                }
                Outcome::Paused => {
                    self.record.status = TaskStatus::Paused;
                    self.progress.status = "paused".to_string();
                    self.context.pause().map_err(|e| CoordinatorError::Context(e.to_string()))?;
                    self.task.tracker.finish_paused().await?;
                    self.events.emit(AgentEvent::TaskPaused { task_uuid: self.task.uuid.clone() });
                }
                Outcome::Stopped => {
                    self.record.status = TaskStatus::Stopped;
                    self.progress.status = "stopped".to_string();
                    self.context.stop().map_err(|e| CoordinatorError::Context(e.to_string()))?;
                    self.task.tracker.finish_stopped().await?;
                    self.events.emit(AgentEvent::TaskStopped { task_uuid: self.task.uuid.clone() });
                }
                Outcome::Failed => unreachable!("finish() is never called with Outcome::Failed; see finish_failed"),
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(task_uuid = %self.task.uuid, error = %e, "Coordinator::finish: a lifecycle side effect failed");
        }
        let _ = self.update_comment().await;
        if let Err(e) = self.state.update(self.record.clone()).await {
            tracing::warn!(task_uuid = %self.task.uuid, error = %e, "Coordinator::finish: failed to persist final state");
        }
        outcome
    }

    async fn finish_failed(&mut self, err: CoordinatorError) -> Outcome {
        tracing::warn!(task_uuid = %self.task.uuid, error = %err, "Coordinator: task attempt failed");
        self.record.status = TaskStatus::Failed;
        self.record.error_message = Some(err.to_string());
        self.record.completed_at = Some(taskstore::now_ms());
        self.progress.status = "failed".to_string();
        self.progress.push_history(Utc::now(), "failed", err.to_string());

        let _ = self.context.fail();
        let _ = self.task.tracker.finish_failed().await;
        self.events.emit(AgentEvent::TaskFailed {
            task_uuid: self.task.uuid.clone(),
            message: err.to_string(),
        });
        let _ = self.update_comment().await;
        if let Err(e) = self.state.update(self.record.clone()).await {
            tracing::warn!(task_uuid = %self.task.uuid, error = %e, "Coordinator::finish_failed: failed to persist final state");
        }
        Outcome::Failed
    }
}
