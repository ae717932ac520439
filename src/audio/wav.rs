use std::fmt;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Sample rate required by the recognizer
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
/// Channel count required by the recognizer
pub const TARGET_CHANNELS: u16 = 1;
/// Bit depth required by the recognizer
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

/// The PCM layout of a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmProfile {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
}

impl PcmProfile {
    /// Mono, 16 kHz, 16-bit integer PCM
    pub const RECOGNIZER: PcmProfile = PcmProfile {
        channels: TARGET_CHANNELS,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: TARGET_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    pub fn of(spec: WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: spec.sample_format,
        }
    }

    /// Read the profile from a WAV file header
    pub fn read(path: &Path) -> Result<Self, hound::Error> {
        let reader = WavReader::open(path)?;
        Ok(Self::of(reader.spec()))
    }

    pub fn is_recognizer_ready(&self) -> bool {
        *self == Self::RECOGNIZER
    }

    pub fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: self.sample_format,
        }
    }
}

impl fmt::Display for PcmProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sample_format {
            SampleFormat::Int => "int",
            SampleFormat::Float => "float",
        };
        write!(
            f,
            "{} ch, {} Hz, {}-bit {}",
            self.channels, self.sample_rate, self.bits_per_sample, kind
        )
    }
}

/// Write mono 16 kHz 16-bit PCM samples to `path`
pub fn write_pcm16(path: &Path, samples: &[i16]) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, PcmProfile::RECOGNIZER.spec())?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Convert normalized f32 samples to i16
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}
