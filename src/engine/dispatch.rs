//! Wave dispatch: claim a batch from the store and hand it to workers
//! through a bounded in-memory queue.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use super::EngineConfig;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Task, TaskId};

/// What a worker got from the queue.
#[derive(Debug)]
pub enum Dequeue {
    Task(Task),
    /// Queue closed and empty; the wave is over for this worker.
    Drained,
    /// Nothing arrived within the wait.
    TimedOut,
}

/// Shared consumer end of one wave's tasks, in claim order.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    len: usize,
}

impl WorkQueue {
    /// Load `tasks` into a closed queue of exactly their size.
    pub async fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        let len = tasks.len();
        let (tx, rx) = mpsc::channel(len.max(1));
        for task in tasks {
            tx.send(task)
                .await
                .map_err(|_| Error::Other("work queue closed while loading".to_string()))?;
        }
        // Dropping the sender lets consumers see the end of the wave.
        drop(tx);
        Ok(Self {
            rx: Arc::new(Mutex::new(rx)),
            len,
        })
    }

    /// Tasks loaded at creation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Take the next task, waiting at most `wait`.
    pub async fn next(&self, wait: Duration) -> Dequeue {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(task)) => Dequeue::Task(task),
            Ok(None) => Dequeue::Drained,
            Err(_) => Dequeue::TimedOut,
        }
    }
}

/// Produces one [`WorkQueue`] per wave until the store runs dry.
pub struct Dispatcher {
    db: Arc<Db>,
    capacity: usize,
    include_failed: bool,
    max_waves: Option<usize>,
    waves: usize,
    /// Tasks whose outcome could not be recorded this run.
    skipped: HashSet<TaskId>,
}

impl Dispatcher {
    pub fn new(db: Arc<Db>, config: &EngineConfig) -> Self {
        Self {
            db,
            capacity: config.wave_capacity(),
            include_failed: config.retry_failed,
            max_waves: config.max_waves,
            waves: 0,
            skipped: HashSet::new(),
        }
    }

    /// Waves dispatched so far.
    pub fn waves(&self) -> usize {
        self.waves
    }

    /// Exclude a task from the rest of this run.
    ///
    /// An unrecorded task stays eligible in the store and would otherwise
    /// be claimed again every wave.
    pub fn skip(&mut self, id: TaskId) {
        self.skipped.insert(id);
    }

    /// Claim the next wave. `Ok(None)` means the run is done.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the claim; those abort the run.
    pub async fn refill(&mut self) -> Result<Option<WorkQueue>> {
        if self.max_waves.is_some_and(|max| self.waves >= max) {
            info!(waves = self.waves, "wave limit reached");
            return Ok(None);
        }

        // Over-claim by the skip set so skipped ids cannot crowd out
        // eligible work.
        let limit = self.capacity + self.skipped.len();
        let claimed = self.db.claim_batch(limit, self.include_failed).await?;
        let tasks: Vec<Task> = claimed
            .into_iter()
            .filter(|task| !self.skipped.contains(&task.id))
            .take(self.capacity)
            .collect();

        if tasks.is_empty() {
            debug!(skipped = self.skipped.len(), "no eligible tasks");
            return Ok(None);
        }

        self.waves += 1;
        let queue = WorkQueue::from_tasks(tasks).await?;
        info!(wave = self.waves, tasks = queue.len(), "wave dispatched");
        Ok(Some(queue))
    }
}
