//! Streams normalized audio through a recognition engine and aggregates the
//! utterances it emits into a [`TranscriptResult`].

use std::path::Path;
use std::sync::Arc;

use hound::WavReader;
use tracing::{debug, info};

use super::engine::{ModelSpec, RecognitionEngine, RecognitionError};
use crate::audio::PcmProfile;
use crate::transcription::{SegmentStats, Segmenter, TranscriptResult, Utterance, WordSpan};

/// Samples fed to the engine per block (250 ms at 16 kHz)
pub const CHUNK_FRAMES: usize = 4000;

/// Text, confidence and words collected from a sequence of utterances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub text: String,
    pub confidence: f64,
    pub utterances: Vec<Utterance>,
    pub words: Vec<WordSpan>,
}

impl Aggregate {
    /// Utterances without text are dropped. Words that carry no confidence
    /// are left out of both the sum and the count; with no scored words the
    /// confidence is 0.0.
    pub fn from_utterances(utterances: impl IntoIterator<Item = Utterance>) -> Self {
        let utterances: Vec<Utterance> = utterances.into_iter().filter(Utterance::has_text).collect();

        let text = utterances
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        let words: Vec<WordSpan> = utterances
            .iter()
            .flat_map(|u| u.words.iter().cloned())
            .collect();

        let (sum, scored) = words
            .iter()
            .filter_map(|w| w.confidence)
            .fold((0.0f64, 0usize), |(sum, n), c| (sum + c as f64, n + 1));

        let confidence = if scored > 0 {
            round_confidence(sum / scored as f64)
        } else {
            0.0
        };

        Self {
            text,
            confidence,
            utterances,
            words,
        }
    }
}

fn round_confidence(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Recognition adapter: model check, PCM check, chunked streaming, aggregation
pub struct RecognitionAdapter {
    engine: Arc<dyn RecognitionEngine>,
    segmenter: Segmenter,
}

impl RecognitionAdapter {
    pub fn new(engine: Arc<dyn RecognitionEngine>, segmenter: Segmenter) -> Self {
        Self { engine, segmenter }
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Transcribe a normalized (mono, 16 kHz, 16-bit PCM) WAV file
    pub fn transcribe(
        &self,
        audio: &Path,
        model: &ModelSpec,
    ) -> Result<TranscriptResult, RecognitionError> {
        if !model.path.exists() {
            return Err(RecognitionError::ModelNotFound(model.path.clone()));
        }

        let mut reader = WavReader::open(audio)?;
        let profile = PcmProfile::of(reader.spec());
        if !profile.is_recognizer_ready() {
            return Err(RecognitionError::Format(profile));
        }

        info!(
            "Recognizing {:?} with {}/{} model ({:.2}s of audio)",
            audio,
            model.language,
            model.size,
            reader.duration() as f64 / profile.sample_rate as f64
        );

        let mut session = self.engine.open(model, profile.sample_rate)?;
        let mut utterances = Vec::new();
        let mut block: Vec<i16> = Vec::with_capacity(CHUNK_FRAMES);
        let mut blocks = 0usize;

        for sample in reader.samples::<i16>() {
            block.push(sample?);
            if block.len() == CHUNK_FRAMES {
                utterances.extend(session.accept_waveform(&block)?);
                block.clear();
                blocks += 1;
            }
        }
        if !block.is_empty() {
            utterances.extend(session.accept_waveform(&block)?);
            blocks += 1;
        }
        utterances.push(session.final_result()?);

        debug!(
            "Fed {} blocks, engine emitted {} utterances",
            blocks,
            utterances.len()
        );

        let aggregate = Aggregate::from_utterances(utterances);
        let vtt_segments = self.segmenter.segment(&aggregate.words);
        let stats = SegmentStats::compute(&vtt_segments);

        info!(
            "Recognized {} words in {} utterances (confidence {:.3}), {} subtitle segments",
            aggregate.words.len(),
            aggregate.utterances.len(),
            aggregate.confidence,
            stats.total_segments
        );
        debug!(
            "Subtitle segments: avg {:.2}s, max {:.2}s",
            stats.avg_segment_duration_secs, stats.max_segment_duration_secs
        );

        Ok(TranscriptResult {
            text: aggregate.text,
            confidence: aggregate.confidence,
            segments: aggregate.utterances,
            vtt_segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_pcm16;
    use crate::recognition::ModelCatalog;
    use crate::recognition::engine::testing::{FailingEngine, ScriptedEngine};
    use crate::transcription::SubtitleSegment;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::path::PathBuf;

    fn model_in(dir: &Path) -> ModelSpec {
        let path = dir.join("models").join("en").join("small");
        std::fs::create_dir_all(&path).unwrap();
        ModelSpec {
            language: "en".to_string(),
            size: "small".to_string(),
            path,
        }
    }

    fn silence(dir: &Path, samples: usize) -> PathBuf {
        let path = dir.join("silence.wav");
        write_pcm16(&path, &vec![0; samples]).unwrap();
        path
    }

    fn scored(start: f64, end: f64, text: &str, conf: f32) -> WordSpan {
        WordSpan::new(start, end, text).with_confidence(conf)
    }

    #[test]
    fn test_aggregate_joins_text_and_averages_confidence() {
        let aggregate = Aggregate::from_utterances(vec![
            Utterance::from_words(vec![scored(0.0, 0.5, "hi", 1.0), scored(0.6, 1.0, "there", 0.5)]),
            Utterance::default(),
            Utterance::from_words(vec![scored(3.0, 3.5, "ok", 0.6)]),
        ]);

        assert_eq!(aggregate.text, "hi there ok");
        assert_eq!(aggregate.confidence, 0.7);
        assert_eq!(aggregate.utterances.len(), 2);
        assert_eq!(aggregate.words.len(), 3);
        assert_eq!(aggregate.words[2].text, "ok");
    }

    #[test]
    fn test_unscored_words_do_not_dilute_confidence() {
        let aggregate = Aggregate::from_utterances(vec![Utterance::from_words(vec![
            scored(0.0, 0.2, "yes", 0.9),
            WordSpan::new(0.3, 0.4, "um"),
            WordSpan::new(0.5, 0.6, "uh"),
        ])]);

        assert_eq!(aggregate.confidence, 0.9);
        assert_eq!(aggregate.words.len(), 3);
    }

    #[test]
    fn test_no_scored_words_means_zero_confidence() {
        let aggregate = Aggregate::from_utterances(vec![Utterance::from_words(vec![
            WordSpan::new(0.0, 0.2, "hmm"),
        ])]);
        assert_eq!(aggregate.confidence, 0.0);

        let empty = Aggregate::from_utterances(Vec::new());
        assert_eq!(empty.confidence, 0.0);
        assert_eq!(empty.text, "");
        assert!(empty.words.is_empty());
    }

    #[test]
    fn test_confidence_is_rounded_to_three_places() {
        let aggregate = Aggregate::from_utterances(vec![Utterance::from_words(vec![
            scored(0.0, 0.1, "a", 1.0),
            scored(0.1, 0.2, "b", 0.5),
            scored(0.2, 0.3, "c", 0.5),
        ])]);
        assert_eq!(aggregate.confidence, 0.667);
    }

    #[test]
    fn test_transcribe_zero_length_audio_for_every_model() {
        let dir = tempfile::tempdir().unwrap();
        let audio = silence(dir.path(), 0);
        let adapter = RecognitionAdapter::new(Arc::new(ScriptedEngine::silent()), Segmenter::with_defaults());
        let models = ModelCatalog::default_table(&dir.path().join("models")).entries();
        assert_eq!(models.len(), 6);

        for model in models {
            std::fs::create_dir_all(&model.path).unwrap();

            let result = adapter.transcribe(&audio, &model).unwrap();

            assert_eq!(result.text, "", "{}/{}", model.language, model.size);
            assert_eq!(result.confidence, 0.0);
            assert!(result.segments.is_empty());
            assert!(result.vtt_segments.is_empty());
        }
    }

    #[test]
    fn test_transcribe_collects_partial_and_final_utterances() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_in(dir.path());
        let audio = silence(dir.path(), 16_000 * 4);
        let engine = ScriptedEngine::new(
            vec![Utterance::from_words(vec![
                scored(0.0, 0.5, "hi", 0.8),
                scored(0.6, 1.0, "there", 0.9),
            ])],
            Utterance::from_words(vec![scored(3.0, 3.5, "ok", 1.0)]),
        );
        let adapter = RecognitionAdapter::new(Arc::new(engine), Segmenter::with_defaults());

        let result = adapter.transcribe(&audio, &model).unwrap();

        assert_eq!(result.text, "hi there ok");
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.segments.len(), 2);
        assert_eq!(
            result.vtt_segments,
            vec![
                SubtitleSegment::new(0.0, 1.0, "hi there"),
                SubtitleSegment::new(3.0, 3.5, "ok"),
            ]
        );
    }

    #[test]
    fn test_transcribe_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let audio = silence(dir.path(), 1600);
        let model = ModelSpec {
            language: "ja".to_string(),
            size: "large".to_string(),
            path: dir.path().join("models/ja/large"),
        };
        let adapter = RecognitionAdapter::new(Arc::new(ScriptedEngine::silent()), Segmenter::with_defaults());

        let err = adapter.transcribe(&audio, &model).unwrap_err();

        assert!(matches!(err, RecognitionError::ModelNotFound(_)));
    }

    #[test]
    fn test_transcribe_rejects_wrong_pcm_profile() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_in(dir.path());
        let audio = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&audio, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        let adapter = RecognitionAdapter::new(Arc::new(ScriptedEngine::silent()), Segmenter::with_defaults());

        let err = adapter.transcribe(&audio, &model).unwrap_err();

        match err {
            RecognitionError::Format(profile) => {
                assert_eq!(profile.channels, 2);
                assert_eq!(profile.sample_rate, 44_100);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_transcribe_surfaces_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_in(dir.path());
        let audio = silence(dir.path(), 1600);
        let adapter = RecognitionAdapter::new(Arc::new(FailingEngine), Segmenter::with_defaults());

        let err = adapter.transcribe(&audio, &model).unwrap_err();

        assert_eq!(err.to_string(), "Speech recognition failed: decoder crashed");
    }
}
