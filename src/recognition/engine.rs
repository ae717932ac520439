//! The seam between the adapter and a streaming speech recognizer.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::audio::PcmProfile;
use crate::transcription::Utterance;

/// A resolved model: language, size and the directory holding it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModelSpec {
    pub language: String,
    pub size: String,
    pub path: PathBuf,
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Model not found at {0}. Please ensure models are downloaded.")]
    ModelNotFound(PathBuf),
    #[error("Audio file must be WAV format mono PCM 16kHz, got {0}")]
    Format(PcmProfile),
    #[error("Failed to read audio: {0}")]
    Audio(#[from] hound::Error),
    #[error("Speech recognition failed: {0}")]
    Engine(String),
}

/// A speech recognizer that can open streaming sessions for a model.
pub trait RecognitionEngine: Send + Sync {
    fn open(
        &self,
        model: &ModelSpec,
        sample_rate: u32,
    ) -> Result<Box<dyn RecognizerSession>, RecognitionError>;
}

/// One streaming recognition pass over a single audio file.
pub trait RecognizerSession {
    /// Feed the next block of samples. Returns an utterance when the engine
    /// has completed one.
    fn accept_waveform(&mut self, pcm: &[i16]) -> Result<Option<Utterance>, RecognitionError>;

    /// Flush the engine after the last block, yielding whatever is pending.
    fn final_result(&mut self) -> Result<Utterance, RecognitionError>;
}

/// Engine used when no recognizer backend is compiled in
#[derive(Debug, Default)]
pub struct UnavailableEngine;

impl RecognitionEngine for UnavailableEngine {
    fn open(
        &self,
        _model: &ModelSpec,
        _sample_rate: u32,
    ) -> Result<Box<dyn RecognizerSession>, RecognitionError> {
        Err(RecognitionError::Engine(
            "no speech recognition engine in this build (enable the `whisper` feature)"
                .to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_engine_reports_engine_error() {
        let model = ModelSpec {
            language: "en".to_string(),
            size: "small".to_string(),
            path: PathBuf::from("models/en/small"),
        };
        let err = UnavailableEngine.open(&model, 16_000).err().unwrap();
        assert!(matches!(err, RecognitionError::Engine(_)));
        assert!(err.to_string().starts_with("Speech recognition failed"));
    }

    #[test]
    fn test_format_error_mentions_profile() {
        let profile = PcmProfile {
            channels: 2,
            ..PcmProfile::RECOGNIZER
        };
        let err = RecognitionError::Format(profile);
        assert_eq!(
            err.to_string(),
            "Audio file must be WAV format mono PCM 16kHz, got 2 ch, 16000 Hz, 16-bit int"
        );
    }
}
