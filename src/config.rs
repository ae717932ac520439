//! Service configuration, built once at startup and passed to each component.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::transcription::SegmenterConfig;

/// Languages a submission may request
pub const SUPPORTED_LANGUAGES: &[&str] = &["zh", "en", "ja"];
/// Model sizes a submission may request
pub const SUPPORTED_MODEL_SIZES: &[&str] = &["small", "large"];
/// Accepted upload extensions (matched case-insensitively)
pub const SUPPORTED_FILE_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".mp4", ".mov"];

const MIB: u64 = 1024 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub models_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub tasks_dir: PathBuf,
    /// Upload limit in bytes
    pub max_file_size: u64,
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// When false, submissions are recorded but never dispatched
    pub background_tasks: bool,
    pub segmenter: SegmenterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            tasks_dir: PathBuf::from("data/tasks"),
            max_file_size: 100 * MIB,
            worker_count: default_worker_count(),
            queue_capacity: 64,
            background_tasks: true,
            segmenter: SegmenterConfig::default(),
        }
    }
}

impl Config {
    /// Load `.env` (if present), then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults, malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let path = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let max_file_size_mib: u64 = parse_or(
            var("MAX_FILE_SIZE"),
            "MAX_FILE_SIZE",
            "an integer number of MiB",
            defaults.max_file_size / MIB,
        )?;
        let worker_count: usize = parse_or(
            var("WORKER_COUNT"),
            "WORKER_COUNT",
            "a positive integer",
            defaults.worker_count,
        )?;
        let queue_capacity: usize = parse_or(
            var("QUEUE_CAPACITY"),
            "QUEUE_CAPACITY",
            "a positive integer",
            defaults.queue_capacity,
        )?;
        let max_duration: f64 = parse_or(
            var("SEGMENT_MAX_DURATION"),
            "SEGMENT_MAX_DURATION",
            "seconds",
            defaults.segmenter.max_duration,
        )?;
        let max_gap: f64 = parse_or(
            var("SEGMENT_MAX_GAP"),
            "SEGMENT_MAX_GAP",
            "seconds",
            defaults.segmenter.max_gap,
        )?;

        let max_file_size = max_file_size_mib.checked_mul(MIB).ok_or_else(|| {
            invalid(
                "MAX_FILE_SIZE",
                &max_file_size_mib.to_string(),
                "an integer number of MiB",
            )
        })?;
        if worker_count == 0 {
            return Err(invalid("WORKER_COUNT", "0", "a positive integer"));
        }
        if queue_capacity == 0 {
            return Err(invalid("QUEUE_CAPACITY", "0", "a positive integer"));
        }
        if !(max_duration.is_finite() && max_duration > 0.0) {
            return Err(invalid(
                "SEGMENT_MAX_DURATION",
                &max_duration.to_string(),
                "positive seconds",
            ));
        }
        if !(max_gap.is_finite() && max_gap >= 0.0) {
            return Err(invalid(
                "SEGMENT_MAX_GAP",
                &max_gap.to_string(),
                "non-negative seconds",
            ));
        }

        let background_tasks = match var("BACKGROUND_TASK_ENABLED") {
            None => defaults.background_tasks,
            Some(v) => v.eq_ignore_ascii_case("true"),
        };

        Ok(Self {
            models_dir: path("MODELS_DIR", defaults.models_dir),
            input_dir: path("INPUT_DIR", defaults.input_dir),
            output_dir: path("OUTPUT_DIR", defaults.output_dir),
            tasks_dir: path("TASKS_DIR", defaults.tasks_dir),
            max_file_size,
            worker_count,
            queue_capacity,
            background_tasks,
            segmenter: SegmenterConfig {
                max_duration,
                max_gap,
            },
        })
    }

    /// Point every data directory below `root`
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            models_dir: root.join("models"),
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            tasks_dir: root.join("tasks"),
            ..Self::default()
        }
    }

    /// Create the input, output and task directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.input_dir, &self.output_dir, &self.tasks_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .max(1)
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| invalid(key, &v, expected)),
    }
}

fn invalid(key: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected,
    }
}
