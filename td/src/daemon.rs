//! Process lifecycle: wires the stop signal, broker, state index, and event
//! bus together and drives the producer or consumer loop until stopped.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::broker::Queue;
use crate::cli::Mode;
use crate::config::Config;
use crate::consumer;
use crate::events::{spawn_event_logger, EventBus};
use crate::producer;
use crate::state::StateManager;

/// Installs Ctrl-C and SIGTERM handlers that flip a shared stop flag, then
/// runs the requested mode until that flag is set (or, for a one-shot pass,
/// until the single pass completes).
pub async fn run(config: Config, mode: Mode, continuous: bool, project_root: &Path) -> eyre::Result<()> {
    let stop_signal = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(stop_signal.clone());

    let db_path = config.context_storage.base_dir.join(&config.broker.db_file);
    let queue = Queue::open_with_lease(&db_path, config.broker.lease_seconds)?;
    let state = StateManager::spawn(config.context_storage.base_dir.join("index"))?;
    let events = Arc::new(EventBus::with_default_capacity());
    spawn_event_logger(&config.context_storage.base_dir, events.clone());

    match mode {
        Mode::Producer => run_producer(&config, project_root, &queue, &state, continuous, &stop_signal).await,
        Mode::Consumer => run_consumer(&config, project_root, &queue, &state, &events, continuous, &stop_signal).await,
    }
}

async fn run_producer(config: &Config, base_dir: &Path, queue: &Queue, state: &StateManager, continuous: bool, stop_signal: &Arc<AtomicBool>) -> eyre::Result<()> {
    if !continuous {
        producer::run_once(config, base_dir, queue, state).await?;
        return Ok(());
    }

    let interval = Duration::from_secs(u64::from(config.continuous.producer.interval_minutes) * 60);
    if config.continuous.producer.delay_first_run {
        sleep_interruptible(interval, stop_signal).await;
    }
    while !stop_signal.load(Ordering::Relaxed) {
        if let Err(e) = producer::run_once(config, base_dir, queue, state).await {
            warn!(error = %e, "daemon: producer pass failed");
        }
        sleep_interruptible(interval, stop_signal).await;
    }
    info!("daemon: producer loop stopped");
    Ok(())
}

async fn run_consumer(config: &Config, project_root: &Path, queue: &Queue, state: &StateManager, events: &EventBus, continuous: bool, stop_signal: &Arc<AtomicBool>) -> eyre::Result<()> {
    if !continuous {
        consumer::run_one(config, project_root, queue, state, events, stop_signal).await?;
        return Ok(());
    }

    let min_interval = Duration::from_secs(config.continuous.consumer.min_interval_seconds);
    while !stop_signal.load(Ordering::Relaxed) {
        let processed = consumer::run_one(config, project_root, queue, state, events, stop_signal).await?;
        if !processed {
            continue;
        }
        sleep_interruptible(min_interval, stop_signal).await;
    }
    info!("daemon: consumer loop stopped");
    Ok(())
}

/// Sleep for `duration`, but wake early if the stop signal flips - keeps
/// shutdown latency bounded well under the timers above.
async fn sleep_interruptible(duration: Duration, stop_signal: &Arc<AtomicBool>) {
    const POLL: Duration = Duration::from_millis(500);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if stop_signal.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(POLL);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}

fn spawn_signal_listener(stop_signal: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "daemon: failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("daemon: received Ctrl-C, requesting graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("daemon: received SIGTERM, requesting graceful shutdown");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("daemon: received Ctrl-C, requesting graceful shutdown");
            }
        }
        stop_signal.store(true, Ordering::Relaxed);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_interruptible_wakes_early_on_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::Relaxed);
        });
        let start = tokio::time::Instant::now();
        sleep_interruptible(Duration::from_secs(30), &stop).await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
