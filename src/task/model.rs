use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::transcription::TranscriptResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// `queued -> processing -> done | failed`, plus `queued -> failed` when
    /// dispatch cannot start
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Processing)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Done)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid task transition from {from} to {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A transcription task as persisted in the task store.
///
/// Status changes go through [`Task::start_processing`], [`Task::complete`]
/// and [`Task::fail`], which keep `result` set only when done and `error`
/// set only when failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    status: TaskStatus,
    input_file: PathBuf,
    output_file: Option<PathBuf>,
    language: String,
    model_size: String,
    result: Option<TranscriptResult>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        input_file: impl Into<PathBuf>,
        language: impl Into<String>,
        model_size: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Queued,
            input_file: input_file.into(),
            output_file: None,
            language: language.into(),
            model_size: model_size.into(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn model_size(&self) -> &str {
        &self.model_size
    }

    pub fn result(&self) -> Option<&TranscriptResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Processing)
    }

    pub fn complete(
        &mut self,
        result: TranscriptResult,
        output_file: Option<PathBuf>,
    ) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Done)?;
        self.result = Some(result);
        self.output_file = output_file;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Whether result and error agree with the status. Records read back
    /// from disk are checked with this before being handed out.
    pub fn is_consistent(&self) -> bool {
        let result_ok = self.result.is_some() == (self.status == TaskStatus::Done);
        let error_ok = self.error.is_some() == (self.status == TaskStatus::Failed);
        result_ok && error_ok
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: chrono::Duration) {
        self.created_at -= by;
        self.updated_at -= by;
    }

    #[cfg(test)]
    pub(crate) fn backdate_creation(&mut self, by: chrono::Duration) {
        self.created_at -= by;
    }
}
