use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voskd::recognition::RecognitionEngine;
use voskd::task::TaskOutput;
use voskd::{Config, OutputFormat, PollResponse, Submission, TaskStatus, TranscriptionService};

/// Longest purge age accepted on the command line (about a century)
const MAX_PURGE_DAYS: i64 = 36_500;

/// Whether a recognition engine was compiled in
const ENGINE_AVAILABLE: bool = cfg!(feature = "whisper");

/// Offline speech-to-text with polling task records.
#[derive(Parser)]
#[command(name = "voskd", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a media file and wait for its transcript.
    Transcribe {
        /// Audio or video file (.wav, .mp3, .mp4, .mov).
        file: PathBuf,

        /// Language code: zh, en or ja.
        #[arg(long, default_value = "en")]
        language: String,

        /// Model size: small or large.
        #[arg(long, default_value = "small")]
        model: String,

        /// Output format: text, subtitle or vtt.
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Delay between status polls.
        #[arg(long, default_value = "500")]
        poll_interval_ms: u64,
    },
    /// Show the state of a stored task.
    Status {
        id: String,

        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// List the available languages and model sizes.
    Models,
    /// Delete task records created more than the given number of days ago.
    Purge {
        #[arg(
            long,
            default_value = "7",
            value_parser = clap::value_parser!(u32).range(..=MAX_PURGE_DAYS)
        )]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let service = TranscriptionService::start(config, engine())
        .context("Failed to start transcription service")?;

    let outcome = run(&service, cli.command).await;
    service.shutdown().await;
    outcome
}

async fn run(service: &TranscriptionService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Transcribe {
            file,
            language,
            model,
            format,
            poll_interval_ms,
        } => {
            if !service.config().background_tasks {
                bail!(
                    "Background processing is disabled (BACKGROUND_TASK_ENABLED=false); \
                     the task would never finish"
                );
            }
            if !ENGINE_AVAILABLE {
                bail!("No recognition engine in this build; rebuild with `--features whisper`");
            }

            let bytes = std::fs::read(&file).with_context(|| format!("Cannot read {:?}", file))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let receipt = service.submit(Submission {
                file_name,
                bytes,
                language,
                model_size: model,
            })?;
            info!("Submitted task {}", receipt.task_id);

            let id = receipt.task_id.to_string();
            loop {
                let poll = service
                    .poll(&id, format)
                    .with_context(|| format!("Task {} disappeared", id))?;
                if poll.status.is_terminal() {
                    return print_poll(&poll);
                }
                tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
            }
        }
        Command::Status { id, format } => match service.poll(&id, format) {
            Some(poll) => print_poll(&poll),
            None => bail!("Task not found: {}", id),
        },
        Command::Models => {
            let catalog = service.catalog();
            if catalog.is_fallback() {
                info!("No models installed under {:?}, showing defaults", catalog.models_dir());
            }
            for spec in catalog.entries() {
                let marker = if spec.path.exists() { "" } else { " (missing)" };
                println!("{}\t{}\t{}{}", spec.language, spec.size, spec.path.display(), marker);
            }
            Ok(())
        }
        Command::Purge { days } => {
            let removed = service.purge_older_than(chrono::Duration::days(i64::from(days)))?;
            println!("Removed {} task records", removed);
            Ok(())
        }
    }
}

fn print_poll(poll: &PollResponse) -> anyhow::Result<()> {
    match (poll.status, &poll.result) {
        (TaskStatus::Done, Some(TaskOutput::Text { text, confidence })) => {
            info!("Task {} done (confidence {:.3})", poll.task_id, confidence);
            println!("{}", text);
            Ok(())
        }
        (TaskStatus::Done, Some(TaskOutput::Subtitle { subtitle })) => {
            print!("{}", subtitle);
            Ok(())
        }
        (TaskStatus::Failed, _) => bail!(
            "Task {} failed: {}",
            poll.task_id,
            poll.error.as_deref().unwrap_or("unknown error")
        ),
        (status, _) => {
            println!("{}\t{}", poll.task_id, status);
            Ok(())
        }
    }
}

#[cfg(feature = "whisper")]
fn engine() -> Arc<dyn RecognitionEngine> {
    Arc::new(voskd::recognition::WhisperEngine::new())
}

#[cfg(not(feature = "whisper"))]
fn engine() -> Arc<dyn RecognitionEngine> {
    tracing::warn!("Built without a recognition engine; tasks will fail (enable the `whisper` feature)");
    Arc::new(voskd::recognition::UnavailableEngine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voskd::recognition::UnavailableEngine;

    #[test]
    fn test_purge_days_default_and_bounds() {
        let cli = Cli::try_parse_from(["voskd", "purge"]).unwrap();
        assert!(matches!(cli.command, Command::Purge { days: 7 }));

        let cli = Cli::try_parse_from(["voskd", "purge", "--days", "0"]).unwrap();
        assert!(matches!(cli.command, Command::Purge { days: 0 }));

        assert!(Cli::try_parse_from(["voskd", "purge", "--days", "-1"]).is_err());
        assert!(Cli::try_parse_from(["voskd", "purge", "--days", "36501"]).is_err());
        assert!(Cli::try_parse_from(["voskd", "purge", "--days", "9223372036854775807"]).is_err());
    }

    #[cfg(not(feature = "whisper"))]
    #[tokio::test]
    async fn test_transcribe_refuses_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let service =
            TranscriptionService::start(Config::rooted_at(dir.path()), Arc::new(UnavailableEngine)).unwrap();

        let outcome = run(
            &service,
            Command::Transcribe {
                file: dir.path().join("clip.wav"),
                language: "en".to_string(),
                model: "small".to_string(),
                format: OutputFormat::Text,
                poll_interval_ms: 10,
            },
        )
        .await;

        assert!(outcome.unwrap_err().to_string().starts_with("No recognition engine"));
        assert!(service.list().unwrap().is_empty());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_transcribe_refuses_when_background_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.background_tasks = false;
        let service = TranscriptionService::start(config, Arc::new(UnavailableEngine)).unwrap();

        let outcome = run(
            &service,
            Command::Transcribe {
                file: dir.path().join("clip.wav"),
                language: "en".to_string(),
                model: "small".to_string(),
                format: OutputFormat::Text,
                poll_interval_ms: 10,
            },
        )
        .await;

        let err = outcome.unwrap_err();
        assert!(err.to_string().starts_with("Background processing is disabled"));
        assert!(service.list().unwrap().is_empty());
        service.shutdown().await;
    }
}
