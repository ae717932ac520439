//! whisper.cpp backend for the recognition seam.
//!
//! whisper.cpp decodes whole windows rather than a live stream, so the
//! session buffers accepted blocks and runs inference once per 30 s window
//! and once more on the final flush. Each window becomes one utterance.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

use super::engine::{ModelSpec, RecognitionEngine, RecognitionError, RecognizerSession};
use crate::transcription::{Utterance, WordSpan};

/// Seconds of audio decoded per inference pass
const WINDOW_SECS: u32 = 30;

/// Recognition engine backed by whisper-rs. Loaded contexts are cached per
/// model file and shared between sessions.
pub struct WhisperEngine {
    contexts: DashMap<PathBuf, Arc<WhisperContext>>,
    n_threads: i32,
}

impl WhisperEngine {
    pub fn new() -> Self {
        let n_threads = std::thread::available_parallelism()
            .map(|p| (p.get() as i32).max(1))
            .unwrap_or(4);

        Self {
            contexts: DashMap::new(),
            n_threads,
        }
    }

    fn context(&self, model_file: &Path) -> Result<Arc<WhisperContext>, RecognitionError> {
        if let Some(ctx) = self.contexts.get(model_file) {
            return Ok(ctx.clone());
        }

        let path = model_file
            .to_str()
            .ok_or_else(|| RecognitionError::Engine(format!("invalid model path {:?}", model_file)))?;

        info!("Loading Whisper model from {:?}", model_file);
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| RecognitionError::Engine(format!("Failed to load model: {}", e)))?;
        let ctx = Arc::new(ctx);

        self.contexts.insert(model_file.to_path_buf(), ctx.clone());
        Ok(ctx)
    }
}

impl Default for WhisperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for WhisperEngine {
    fn open(
        &self,
        model: &ModelSpec,
        sample_rate: u32,
    ) -> Result<Box<dyn RecognizerSession>, RecognitionError> {
        let model_file = find_model_file(&model.path)?;
        let ctx = self.context(&model_file)?;

        Ok(Box::new(WhisperSession {
            ctx,
            language: model.language.clone(),
            n_threads: self.n_threads,
            sample_rate,
            window: Vec::with_capacity((WINDOW_SECS * sample_rate) as usize),
            offset_secs: 0.0,
        }))
    }
}

/// The first `*.bin` file in the model directory
fn find_model_file(model_dir: &Path) -> Result<PathBuf, RecognitionError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)
        .map_err(|_| RecognitionError::ModelNotFound(model_dir.to_path_buf()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| RecognitionError::ModelNotFound(model_dir.to_path_buf()))
}

struct WhisperSession {
    ctx: Arc<WhisperContext>,
    language: String,
    n_threads: i32,
    sample_rate: u32,
    window: Vec<f32>,
    offset_secs: f64,
}

impl WhisperSession {
    fn window_len(&self) -> usize {
        (WINDOW_SECS * self.sample_rate) as usize
    }

    fn decode_window(&mut self) -> Result<Utterance, RecognitionError> {
        let samples = std::mem::take(&mut self.window);
        let window_secs = samples.len() as f64 / self.sample_rate as f64;
        let offset = self.offset_secs;
        self.offset_secs += window_secs;

        let start_time = Instant::now();

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.n_threads);
        params.set_language(Some(self.language.as_str()));
        params.set_translate(false);
        params.set_token_timestamps(true);
        params.set_no_context(true);
        params.set_suppress_non_speech_tokens(true);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| RecognitionError::Engine(format!("Failed to create state: {}", e)))?;
        state
            .full(params, &samples)
            .map_err(|e| RecognitionError::Engine(format!("Inference failed: {}", e)))?;

        let words = collect_words(&state, offset)?;

        debug!(
            "Decoded {:.2}s window at {:.2}s in {:.1}s: {} words",
            window_secs,
            offset,
            start_time.elapsed().as_secs_f32(),
            words.len()
        );

        Ok(Utterance::from_words(words))
    }
}

impl RecognizerSession for WhisperSession {
    fn accept_waveform(&mut self, pcm: &[i16]) -> Result<Option<Utterance>, RecognitionError> {
        self.window
            .extend(pcm.iter().map(|&s| s as f32 / i16::MAX as f32));

        if self.window.len() >= self.window_len() {
            return self.decode_window().map(Some);
        }
        Ok(None)
    }

    fn final_result(&mut self) -> Result<Utterance, RecognitionError> {
        if self.window.is_empty() {
            return Ok(Utterance::default());
        }
        self.decode_window()
    }
}

/// Merge whisper tokens into words. A token with a leading space starts a
/// new word; special tokens are skipped. Token times are centiseconds.
fn collect_words(state: &WhisperState, offset: f64) -> Result<Vec<WordSpan>, RecognitionError> {
    let engine_err = |e: whisper_rs::WhisperError| RecognitionError::Engine(e.to_string());

    let mut words: Vec<WordSpan> = Vec::new();
    let mut probs: Vec<f32> = Vec::new();

    let n_segments = state.full_n_segments().map_err(engine_err)?;
    for segment in 0..n_segments {
        let n_tokens = state.full_n_tokens(segment).map_err(engine_err)?;
        for token in 0..n_tokens {
            let Ok(text) = state.full_get_token_text(segment, token) else {
                continue;
            };
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with('<') {
                continue;
            }

            let data = state.full_get_token_data(segment, token).map_err(engine_err)?;
            let start = offset + data.t0 as f64 / 100.0;
            let end = offset + data.t1 as f64 / 100.0;

            let continues_word = !text.starts_with(' ') && !words.is_empty();
            if continues_word {
                if let Some(word) = words.last_mut() {
                    word.text.push_str(trimmed);
                    word.end = word.end.max(end);
                    probs.push(data.p);
                    word.confidence = Some(mean(&probs));
                }
            } else {
                probs.clear();
                probs.push(data.p);
                words.push(WordSpan::new(start, end.max(start), trimmed).with_confidence(data.p));
            }
        }
    }

    Ok(words)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
