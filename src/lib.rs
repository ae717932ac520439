//! Offline transcription service: uploaded media is normalized, run through a
//! speech recognizer on a bounded worker pool, and returned as text or WebVTT
//! while the caller polls the task record.

pub mod audio;
pub mod config;
pub mod recognition;
pub mod task;
pub mod transcription;

pub use config::{Config, ConfigError};
pub use task::{OutputFormat, PollResponse, Submission, TaskId, TaskStatus, TranscriptionService};
