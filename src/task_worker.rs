use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::PipelineEvent;
use crate::pipeline::Pipeline;
use crate::task_helpers::EventSink;

/// Shared cancellation flag of one run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// Consumer side of a submitted run.
pub struct RunHandle {
    pub run_id: String,
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    pub cancel: CancelHandle,
    pub worker: JoinHandle<()>,
}

impl RunHandle {
    /// Next event, or `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }
}

/// Caps how many pipelines run at once.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Queues `pipeline` until a worker is free. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, pipeline: Pipeline) -> RunHandle {
        let semaphore = self.semaphore.clone();
        start_run(pipeline, async move { semaphore.acquire_owned().await.ok() })
    }

    /// Starts `pipeline` only if a worker is free right now.
    pub fn try_submit(&self, pipeline: Pipeline) -> Result<RunHandle, String> {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| "All grading workers are busy".to_string())?;
        Ok(start_run(pipeline, async move { Some(permit) }))
    }
}

fn start_run<F>(pipeline: Pipeline, permit: F) -> RunHandle
where
    F: Future<Output = Option<OwnedSemaphorePermit>> + Send + 'static,
{
    let run_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelHandle::default();
    let sink = EventSink::new(tx, cancel.flag());

    let worker_run_id = run_id.clone();
    let worker = tokio::spawn(async move {
        let Some(_permit) = permit.await else {
            sink.emit(PipelineEvent::Stopped(Some("Worker pool is closed".to_string())));
            return;
        };
        info!(run_id = %worker_run_id, "worker acquired");

        let blocking_sink = sink.clone();
        let outcome = tokio::task::spawn_blocking(move || pipeline.run(&blocking_sink)).await;
        if let Err(join_error) = outcome {
            error!(run_id = %worker_run_id, %join_error, "grading worker failed");
            if !sink.has_terminated() {
                sink.emit(PipelineEvent::Stopped(Some(format!(
                    "Grading worker failed: {join_error}"
                ))));
            }
        }
    });

    RunHandle {
        run_id,
        events: rx,
        cancel,
        worker,
    }
}
