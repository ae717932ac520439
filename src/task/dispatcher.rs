//! Bounded worker pool that runs queued tasks through the pipeline:
//! normalize, recognize, segment, persist.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn};

use super::model::{Task, TaskId};
use super::store::{StoreError, TaskStore};
use crate::audio::{AudioNormalizer, ConversionError, remove_staged};
use crate::config::Config;
use crate::recognition::{ModelCatalog, RecognitionAdapter, RecognitionError};
use crate::transcription::TranscriptResult;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error("Failed to write transcript output: {0}")]
    Output(#[from] std::io::Error),
    #[error("Failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything one worker needs to take a task from `queued` to terminal
pub struct Pipeline {
    config: Arc<Config>,
    store: Arc<TaskStore>,
    catalog: Arc<ModelCatalog>,
    normalizer: Arc<dyn AudioNormalizer>,
    adapter: Arc<RecognitionAdapter>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        store: Arc<TaskStore>,
        catalog: Arc<ModelCatalog>,
        normalizer: Arc<dyn AudioNormalizer>,
        adapter: Arc<RecognitionAdapter>,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            normalizer,
            adapter,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Run one task to completion. Store failures are logged and end the run;
    /// they never panic the worker.
    pub fn execute(&self, id: TaskId) {
        let span = info_span!("task", task_id = %id);
        let _guard = span.enter();

        let task = match self.store.update(id, Task::start_processing) {
            Ok(task) => task,
            Err(e) => {
                error!("Cannot start task: {}", e);
                return;
            }
        };
        info!(
            "Processing {:?} ({}/{})",
            task.input_file(),
            task.language(),
            task.model_size()
        );

        match self.process(&task) {
            Ok((result, output_file)) => {
                let words = result.word_count();
                match self
                    .store
                    .update(id, |t| t.complete(result, Some(output_file)))
                {
                    Ok(_) => info!("Task done ({} words)", words),
                    Err(e) => {
                        error!("Failed to persist result: {}", e);
                        self.record_failure(id, &format!("Failed to persist result: {}", e));
                    }
                }
            }
            Err(e) => {
                error!("Task failed: {}", e);
                self.record_failure(id, &e.to_string());
            }
        }
    }

    fn record_failure(&self, id: TaskId, message: &str) {
        if let Err(e) = self.store.update(id, |t| t.fail(message)) {
            error!("Failed to record task failure: {}", e);
        }
    }

    /// Normalize, recognize and write outputs. The normalized file is removed
    /// whatever the outcome.
    fn process(&self, task: &Task) -> Result<(TranscriptResult, PathBuf), PipelineError> {
        let normalized = self.normalizer.normalize(task.input_file())?;

        let outcome = self.recognize_and_write(task, &normalized);
        remove_staged(&[normalized]);
        outcome
    }

    fn recognize_and_write(
        &self,
        task: &Task,
        normalized: &std::path::Path,
    ) -> Result<(TranscriptResult, PathBuf), PipelineError> {
        let model = self.catalog.resolve(task.language(), task.model_size());
        let result = self.adapter.transcribe(normalized, &model)?;

        std::fs::create_dir_all(&self.config.output_dir)?;
        let text_path = self.config.output_dir.join(format!("{}.txt", task.id()));
        let json_path = self.config.output_dir.join(format!("{}.json", task.id()));
        std::fs::write(&text_path, &result.text)?;
        std::fs::write(&json_path, serde_json::to_vec_pretty(&result)?)?;

        Ok((result, text_path))
    }
}

/// Handle to the worker pool. Cloning is cheap; every clone feeds the same
/// queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Arc<std::sync::Mutex<Option<mpsc::Sender<TaskId>>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    store: Arc<TaskStore>,
}

impl Dispatcher {
    /// Spawn `worker_count` workers sharing a queue of `queue_capacity` ids.
    /// Must be called from within a tokio runtime.
    pub fn start(pipeline: Pipeline, worker_count: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let store = pipeline.store().clone();
        let pipeline = Arc::new(pipeline);

        let workers = (0..worker_count.max(1))
            .map(|n| tokio::spawn(worker_loop(n, rx.clone(), pipeline.clone())))
            .collect();

        info!(
            "Dispatcher started with {} workers, queue capacity {}",
            worker_count.max(1),
            queue_capacity.max(1)
        );

        Self {
            tx: Arc::new(std::sync::Mutex::new(Some(tx))),
            workers: Arc::new(Mutex::new(workers)),
            store,
        }
    }

    /// Queue a task without waiting. If the queue is full or closed the task
    /// is marked failed instead.
    pub fn dispatch(&self, id: TaskId) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let reason = match sender {
            None => "dispatcher is shut down",
            Some(tx) => match tx.try_send(id) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(_)) => "task queue is full",
                Err(mpsc::error::TrySendError::Closed(_)) => "dispatcher is shut down",
            },
        };

        warn!("Task {} not dispatched: {}", id, reason);
        if let Err(e) = self.store.update(id, |t| t.fail(reason)) {
            error!("Failed to record dispatch failure for {}: {}", id, e);
        }
    }

    /// Stop accepting work, let queued tasks finish and wait for the workers
    pub async fn shutdown(&self) {
        self.tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker ended abnormally: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn worker_loop(
    n: usize,
    rx: Arc<Mutex<mpsc::Receiver<TaskId>>>,
    pipeline: Arc<Pipeline>,
) {
    info!("Worker {} started", n);
    loop {
        let next = rx.lock().await.recv().await;
        let Some(id) = next else {
            break;
        };

        let job = pipeline.clone();
        match tokio::task::spawn_blocking(move || job.execute(id)).await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let message = format!("Task processing panicked: {}", panic_message(payload.as_ref()));
                error!("Worker {} caught panic in task {}: {}", n, id, message);
                pipeline.record_failure(id, &message);
            }
            Err(e) => error!("Worker {} lost task {}: {}", n, id, e),
        }
    }
    info!("Worker {} stopped: queue closed", n);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
