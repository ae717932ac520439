//! Audio normalization staging.

pub mod normalize;
pub mod wav;

pub use normalize::{
    AudioNormalizer, ConversionError, SymphoniaNormalizer, normalized_path, remove_staged,
};
pub use wav::{PcmProfile, TARGET_SAMPLE_RATE, write_pcm16};
