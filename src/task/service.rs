//! Submit / poll facade over the store, the catalog and the dispatcher.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::dispatcher::{Dispatcher, Pipeline};
use super::model::{Task, TaskId, TaskStatus};
use super::store::{StoreError, TaskStore};
use super::validation::{self, ValidationError};
use crate::audio::{AudioNormalizer, SymphoniaNormalizer};
use crate::config::Config;
use crate::recognition::{ModelCatalog, RecognitionAdapter, RecognitionEngine};
use crate::transcription::Segmenter;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to store task: {0}")]
    Persistence(#[from] StoreError),
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded file plus the recognition options chosen for it
#[derive(Debug, Clone)]
pub struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub language: String,
    pub model_size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Subtitle,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "subtitle" | "vtt" => Ok(OutputFormat::Subtitle),
            _ => Err(format!("Invalid output format: {} (expected text, subtitle or vtt)", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Subtitle => write!(f, "subtitle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Text { text: String, confidence: f64 },
    Subtitle { subtitle: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResponse {
    fn from_task(task: &Task, format: OutputFormat) -> Self {
        let result = task.result().map(|result| match format {
            OutputFormat::Text => TaskOutput::Text {
                text: result.text.clone(),
                confidence: result.confidence,
            },
            OutputFormat::Subtitle => TaskOutput::Subtitle {
                subtitle: result.to_vtt(),
            },
        });

        Self {
            task_id: task.id(),
            status: task.status(),
            result,
            error: task.error().map(str::to_string),
        }
    }
}

pub struct TranscriptionService {
    config: Arc<Config>,
    store: Arc<TaskStore>,
    catalog: Arc<ModelCatalog>,
    dispatcher: Dispatcher,
}

impl TranscriptionService {
    /// Create directories, load the model catalog and start the worker pool.
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config, engine: Arc<dyn RecognitionEngine>) -> Result<Self, ServiceError> {
        Self::with_normalizer(config, engine, Arc::new(SymphoniaNormalizer::new()))
    }

    pub fn with_normalizer(
        config: Config,
        engine: Arc<dyn RecognitionEngine>,
        normalizer: Arc<dyn AudioNormalizer>,
    ) -> Result<Self, ServiceError> {
        config.ensure_dirs()?;
        let config = Arc::new(config);
        let store = Arc::new(TaskStore::open(&config.tasks_dir)?);
        let catalog = Arc::new(ModelCatalog::load(&config.models_dir));
        let adapter = Arc::new(RecognitionAdapter::new(
            engine,
            Segmenter::new(config.segmenter),
        ));

        let pipeline = Pipeline::new(
            config.clone(),
            store.clone(),
            catalog.clone(),
            normalizer,
            adapter,
        );
        let dispatcher = Dispatcher::start(pipeline, config.worker_count, config.queue_capacity);

        Ok(Self {
            config,
            store,
            catalog,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Validate, stage the upload, record the task as queued and hand it to
    /// the dispatcher. Returns as soon as the record is persisted.
    pub fn submit(&self, submission: Submission) -> Result<SubmitReceipt, ServiceError> {
        validation::validate_file(
            &submission.file_name,
            submission.bytes.len() as u64,
            self.config.max_file_size,
        )?;
        validation::validate_language_and_model(&submission.language, &submission.model_size)?;

        let id = TaskId::new();
        let input_file = self.stage(id, &submission)?;
        let task = Task::new(id, &input_file, &submission.language, &submission.model_size);

        if let Err(e) = self.store.create(&task) {
            if let Err(rm) = std::fs::remove_file(&input_file) {
                warn!("Failed to remove staged upload {:?}: {}", input_file, rm);
            }
            return Err(e.into());
        }

        info!(
            "Queued task {} for {:?} ({}/{}, {} bytes)",
            id,
            input_file,
            submission.language,
            submission.model_size,
            submission.bytes.len()
        );

        if self.config.background_tasks {
            self.dispatcher.dispatch(id);
        } else {
            info!("Background processing disabled, task {} stays queued", id);
        }

        Ok(SubmitReceipt {
            task_id: id,
            status: TaskStatus::Queued,
        })
    }

    fn stage(&self, id: TaskId, submission: &Submission) -> Result<PathBuf, ServiceError> {
        let name = validation::sanitize_file_name(&submission.file_name);
        let path = self.config.input_dir.join(format!("{}_{}", id, name));
        std::fs::write(&path, &submission.bytes)?;
        Ok(path)
    }

    /// Current state of a task. `None` means not found: unknown or malformed
    /// id, or a record that cannot be read.
    pub fn poll(&self, task_id: &str, format: OutputFormat) -> Option<PollResponse> {
        let id = task_id.parse::<TaskId>().ok()?;
        let task = self.store.get(id)?;
        Some(PollResponse::from_task(&task, format))
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.store.get(id)
    }

    pub fn list(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.list()?)
    }

    pub fn purge_older_than(&self, age: chrono::Duration) -> Result<usize, ServiceError> {
        Ok(self.store.purge_older_than(age)?)
    }

    /// Stop the worker pool after the queued tasks finish
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
