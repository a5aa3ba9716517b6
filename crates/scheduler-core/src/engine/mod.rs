//! Task engine: the in-process dispatch loop.
//!
//! Poll -> submit to worker pool -> track the running set -> invoke the
//! handler -> on failure, drive compensation -> final write-back. Grounded
//! on the orchestrator's semaphore-gated spawn loop, generalized from DAG
//! task scheduling to a flat claim-one-task poll.

mod error;
mod worker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use error::EngineError;

use scheduler_db::picker::TaskPicker;
use crate::compensator::CompensatorRegistry;
use crate::handler::HandlerRegistry;

/// Tunables for the dispatch loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between poll ticks.
    pub poll_delay: Duration,
    /// Maximum dispatches attempted per tick.
    pub poll_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_millis(2000),
            poll_batch: 16,
        }
    }
}

/// Owns the runners map, the running set, and the per-task cancellation
/// tokens used for cooperative interruption.
pub struct Engine {
    pool: PgPool,
    picker: Arc<dyn TaskPicker>,
    handlers: Arc<HandlerRegistry>,
    compensators: Arc<CompensatorRegistry>,
    owner: String,
    semaphore: Arc<Semaphore>,
    running: Arc<Mutex<HashSet<Uuid>>>,
    tokens: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        pool: PgPool,
        picker: Arc<dyn TaskPicker>,
        handlers: HandlerRegistry,
        compensators: CompensatorRegistry,
        owner: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        let permits = std::cmp::max(16, num_cpus() * 8);
        Self {
            pool,
            picker,
            handlers: Arc::new(handlers),
            compensators: Arc::new(compensators),
            owner: owner.into(),
            semaphore: Arc::new(Semaphore::new(permits)),
            running: Arc::new(Mutex::new(HashSet::new())),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Task identities currently executing on this process.
    pub async fn running_ids(&self) -> Vec<Uuid> {
        self.running.lock().await.iter().copied().collect()
    }

    /// Cancel the worker's shared token if `task_id` is currently running on
    /// this process. Unlike `JoinHandle::abort`, this lets the worker record
    /// a clean CANCELED write-back rather than being killed mid-future.
    pub async fn interrupt_if_running(&self, task_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().await.get(&task_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// One dispatch attempt: claim a task, create its run, spawn a worker.
    /// Returns `false` when nothing was claimable.
    pub async fn poll_and_run_once(self: &Arc<Self>) -> Result<bool> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;

        let Some(task) = crate::transactional::claim_one(&self.pool, self.picker.as_ref(), &self.owner).await? else {
            return Ok(false);
        };

        let run = crate::transactional::create_run(&self.pool, task.id).await?;

        let token = CancellationToken::new();
        self.tokens.lock().await.insert(task.id, token.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            worker::execute_and_complete(&engine, &task, run.id, token).await;
            engine.tokens.lock().await.remove(&task.id);
        });

        Ok(true)
    }

    /// Run the poll loop until `cancel` fires, then drain in-flight workers
    /// up to a bounded timeout before returning.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!("engine cancelled, waiting for in-flight workers to drain");
                let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
                while !self.running.lock().await.is_empty() {
                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!("drain timeout expired with workers still in flight");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                return Ok(());
            }

            let mut dispatched_this_tick = 0;
            for _ in 0..self.config.poll_batch {
                match self.poll_and_run_once().await {
                    Ok(true) => dispatched_this_tick += 1,
                    Ok(false) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "poll tick failed");
                        break;
                    }
                }
            }
            let _ = dispatched_this_tick;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub(crate) fn compensators(&self) -> &CompensatorRegistry {
        &self.compensators
    }

    pub(crate) fn running(&self) -> &Mutex<HashSet<Uuid>> {
        &self.running
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
