use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::pipeline::Pipeline;
use crate::task_worker::{CancelHandle, RunHandle, WorkerPool};

/// Runs in flight, keyed by run id, plus the pool they execute on.
#[derive(Clone)]
pub struct GraderState {
    pub pool: WorkerPool,
    pub runs: Arc<AsyncMutex<HashMap<String, CancelHandle>>>,
}

impl GraderState {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: WorkerPool::new(pool_size),
            runs: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    pub async fn start(&self, pipeline: Pipeline) -> RunHandle {
        let handle = self.pool.submit(pipeline);
        self.runs
            .lock()
            .await
            .insert(handle.run_id.clone(), handle.cancel.clone());
        info!(run_id = %handle.run_id, "run registered");
        handle
    }

    pub async fn cancel(&self, run_id: &str) -> Result<(), String> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| format!("Run `{run_id}` is not active"))?;
        handle.cancel();
        info!(run_id, "cancellation requested");
        Ok(())
    }

    pub async fn finish(&self, run_id: &str) {
        self.runs.lock().await.remove(run_id);
    }

    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.len()
    }
}
