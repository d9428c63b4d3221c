use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Config;
use crate::counters::Counters;
use crate::error::ConfigError;
use crate::session::{Session, SessionOutcome};
use crate::stats::SessionStats;

// =============================================================================
// Worker
// =============================================================================

/// What a worker did over its run budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub iterations: u32,
    pub failed: u32,
    pub abandoned: usize,
}

/// Runs a random number of sessions one after another, cools down, then
/// reports done.
pub struct Worker {
    id: usize,
    config: Arc<Config>,
    counters: Arc<Counters>,
    stats: Arc<SessionStats>,
    rng: StdRng,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        counters: Arc<Counters>,
        stats: Arc<SessionStats>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_os_rng(),
        };
        Self {
            id,
            config,
            counters,
            stats,
            rng,
        }
    }

    pub async fn run(mut self) -> WorkerReport {
        let iterations = self.config.iterations.sample(&mut self.rng);
        debug!("Worker {} running {} sessions", self.id, iterations);

        // Abandoned connections stay open until the worker finishes.
        let mut abandoned: Vec<TcpStream> = Vec::new();
        let mut failed = 0;

        for iteration in 0..iterations {
            let session = Session::new(
                self.id,
                iteration,
                &self.config,
                &self.counters,
                &self.stats,
                &mut self.rng,
            );
            match session.run().await {
                Ok(SessionOutcome::Closed) => {}
                Ok(SessionOutcome::Abandoned(stream)) => abandoned.push(stream),
                Err(_) => failed += 1,
            }
        }

        sleep(self.config.cooldown()).await;
        info!("Worker {} done", self.id);

        WorkerReport {
            id: self.id,
            iterations,
            failed,
            abandoned: abandoned.len(),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Spawns every worker at once and joins them.
pub struct Orchestrator {
    tasks: Vec<JoinHandle<WorkerReport>>,
    completed: Arc<AtomicUsize>,
}

impl Orchestrator {
    /// Rejects an invalid config before any worker starts.
    pub fn spawn(
        config: Arc<Config>,
        counters: Arc<Counters>,
        stats: Arc<SessionStats>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::with_capacity(config.workers);

        info!("Spawning {} workers", config.workers);

        for id in 0..config.workers {
            let worker = Worker::new(
                id,
                Arc::clone(&config),
                Arc::clone(&counters),
                Arc::clone(&stats),
            );
            let completed = Arc::clone(&completed);

            let task = tokio::spawn(async move {
                let report = worker.run().await;
                completed.fetch_add(1, Ordering::Release);
                report
            });

            tasks.push(task);
        }

        Ok(Self { tasks, completed })
    }

    pub fn workers(&self) -> usize {
        self.tasks.len()
    }

    /// Workers that have finished their budget and cooldown.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.completed() == self.workers()
    }

    /// Blocks until every worker has signalled completion. A worker that
    /// panicked is the only error.
    pub async fn await_all(self) -> Result<Vec<WorkerReport>, JoinError> {
        futures_util::future::join_all(self.tasks)
            .await
            .into_iter()
            .collect()
    }
}
