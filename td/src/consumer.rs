//! Dequeues one envelope at a time and drives it through a `Coordinator`.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::broker::{Envelope, Queue};
use crate::config::Config;
use crate::context::{resolve_inheritance, ContextBridge};
use crate::coordinator::Coordinator;
use crate::domain::{Store, Task, TaskRecord};
use crate::environment::EnvironmentManager;
use crate::events::EventBus;
use crate::llm;
use crate::prompts::PromptLoader;
use crate::state::StateManager;
use crate::tools::ToolExecutor;
use crate::tracker;
use crate::watcher::{PauseWatcher, StopWatcher};

/// Dequeue and run exactly one task, if one is ready within the configured
/// timeout. Returns `true` if a task was processed.
pub async fn run_one(
    config: &Config,
    project_root: &Path,
    queue: &Queue,
    state: &StateManager,
    events: &EventBus,
    stop_signal: &Arc<AtomicBool>,
) -> eyre::Result<bool> {
    let timeout = Duration::from_secs(config.continuous.consumer.queue_timeout_seconds);
    let Some(envelope) = queue.get_with_signal_check(timeout, stop_signal, Duration::from_millis(500)).await? else {
        return Ok(false);
    };

    let uuid = envelope.uuid.clone();
    info!(%uuid, "consumer: dequeued task");

    if let Err(e) = process_envelope(config, project_root, &envelope, state, events).await {
        error!(%uuid, error = %e, "consumer: failed to set up or run the coordinator for this task");
    }
    // Ack regardless of outcome: a setup failure here is not retried
    // automatically - the producer will re-enqueue on its next pass if the
    // tracker item is still trigger-labeled.
    queue.ack(&uuid)?;
    Ok(true)
}

async fn process_envelope(config: &Config, project_root: &Path, envelope: &Envelope, state: &StateManager, events: &EventBus) -> eyre::Result<()> {
    let llm = llm::create_client(&config.llm)?;
    let resolved = config.llm.resolve()?;
    let token = config.tracker.api_token()?;
    let tracker = tracker::from_task_key(envelope.task_key.clone(), token);

    let context_base = &config.context_storage.base_dir;
    let key_hash = envelope.task_key.key_hash();

    let (context, inherited_summary, record) = if envelope.is_resumed {
        let bridge = ContextBridge::resume(context_base, &envelope.uuid)?;
        let record = state.get(&envelope.uuid).await?;
        (bridge, None, record)
    } else {
        let inherited = if config.context_inheritance.enabled {
            let index_path = context_base.join("index");
            let store: Store<TaskRecord> = Store::open(&index_path)?;
            resolve_inheritance(
                &store,
                context_base,
                &key_hash,
                config.context_inheritance.context_expiry_days,
                taskstore::now_ms(),
            )?
        } else {
            None
        };

        let metadata = contextstore::TaskMetadata {
            task_uuid: envelope.uuid.clone(),
            task_source: envelope.task_key.task_source().to_string(),
            created_at: taskstore::now_ms(),
            llm_provider: resolved.provider.clone(),
            model: resolved.model.clone(),
            context_length: resolved.context_length,
            requester: envelope.requester.clone(),
            is_resumed: false,
        };
        let bridge = ContextBridge::create(context_base, &envelope.uuid, metadata)?;
        if let Some(candidate) = &inherited {
            let prompt = tracker.get_prompt().await?;
            bridge
                .store()
                .seed_inheritance(&candidate.summary, &prompt, config.context_inheritance.max_inherited_tokens)?;
        }

        let record = TaskRecord::new(
            envelope.uuid.clone(),
            &envelope.task_key,
            envelope.requester.clone(),
            resolved.provider.clone(),
            resolved.model.clone(),
            resolved.context_length,
        );
        state.create(record.clone()).await?;
        (bridge, inherited.map(|c| c.summary), record)
    };

    let stop = StopWatcher::new(tracker.clone(), config.tracker.bot_login.clone());
    let task = Task::new(envelope.task_key.clone(), envelope.uuid.clone(), envelope.requester.clone(), envelope.is_resumed, tracker);

    let environment = Arc::new(EnvironmentManager::new(config.command_executor.clone()));
    let tools = ToolExecutor::standard();
    let prompts = PromptLoader::new(project_root, None);
    let pause = PauseWatcher::new(Path::new("."), &config.pause_resume.signal_file.to_string_lossy());
    let emitter = events.emitter_for(envelope.uuid.clone());

    let mut coordinator = Coordinator::new(
        task,
        llm,
        tools,
        environment,
        prompts,
        context,
        emitter,
        state.clone(),
        pause,
        stop,
        config.planning.clone(),
        config.command_executor.clone(),
        record,
        inherited_summary,
    );

    coordinator.run().await;
    Ok(())
}
