//! Speech recognition: engine seam, streaming adapter and model catalog.

pub mod adapter;
pub mod catalog;
pub mod engine;
#[cfg(feature = "whisper")]
pub mod whisper;

pub use adapter::{Aggregate, CHUNK_FRAMES, RecognitionAdapter};
pub use catalog::ModelCatalog;
pub use engine::{
    ModelSpec, RecognitionEngine, RecognitionError, RecognizerSession, UnavailableEngine,
};
#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;
