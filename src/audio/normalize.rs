//! Conversion of uploaded media into the recognizer's PCM profile.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::wav::{TARGET_SAMPLE_RATE, f32_to_pcm16, write_pcm16};

const NORMALIZED_EXTENSION: &str = "wav";
/// Input block size for the resampler
const RESAMPLE_CHUNK: usize = 1024;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Audio conversion failed: cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Audio conversion failed: {0}")]
    Decode(String),
    #[error("Audio conversion failed: resampling error: {0}")]
    Resample(String),
    #[error("Audio conversion failed: cannot write {path}: {source}")]
    Write { path: PathBuf, source: hound::Error },
}

/// Converts an arbitrary media file into mono 16 kHz 16-bit PCM WAV.
///
/// Implementations create exactly one new file and never touch the source;
/// the caller removes the produced file when done with it.
pub trait AudioNormalizer: Send + Sync {
    fn normalize(&self, source: &Path) -> Result<PathBuf, ConversionError>;
}

/// Path of the normalized file for `source`: same directory and basename
/// with a `.wav` extension, or `<stem>_16k.wav` when the source already is a
/// `.wav` file.
pub fn normalized_path(source: &Path) -> PathBuf {
    let is_wav = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(NORMALIZED_EXTENSION));

    if is_wav {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{stem}_16k.{NORMALIZED_EXTENSION}"))
    } else {
        source.with_extension(NORMALIZED_EXTENSION)
    }
}

/// Remove staged temporary files, logging failures instead of returning them
pub fn remove_staged(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed staged file {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged file {:?}: {}", path, e),
        }
    }
}

/// Normalizer backed by symphonia (demux + decode) and rubato (resampling)
#[derive(Debug, Clone, Default)]
pub struct SymphoniaNormalizer;

impl SymphoniaNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioNormalizer for SymphoniaNormalizer {
    fn normalize(&self, source: &Path) -> Result<PathBuf, ConversionError> {
        let (samples, source_rate) = decode_to_mono(source)?;

        let samples = if source_rate != TARGET_SAMPLE_RATE && !samples.is_empty() {
            resample(&samples, source_rate, TARGET_SAMPLE_RATE)?
        } else {
            samples
        };

        let output = normalized_path(source);
        write_pcm16(&output, &f32_to_pcm16(&samples)).map_err(|e| ConversionError::Write {
            path: output.clone(),
            source: e,
        })?;

        info!(
            "Normalized {:?} -> {:?} ({:.2}s at {} Hz, source {} Hz)",
            source,
            output,
            samples.len() as f64 / TARGET_SAMPLE_RATE as f64,
            TARGET_SAMPLE_RATE,
            source_rate
        );

        Ok(output)
    }
}

/// Decode the first audio track of `source`, downmixing to mono.
/// Returns the samples in [-1.0, 1.0] and the source sample rate.
fn decode_to_mono(source: &Path) -> Result<(Vec<f32>, u32), ConversionError> {
    let file = File::open(source).map_err(|e| ConversionError::Open {
        path: source.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ConversionError::Decode(format!("probe: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| ConversionError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| ConversionError::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ConversionError::Decode(format!("codec: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(e) => {
                end_of_stream(source, e, mono.len())?;
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt audio frame in {:?}: {}", source, e);
                continue;
            }
            Err(e) => return Err(ConversionError::Decode(format!("decode: {}", e))),
        };

        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        if channels > 1 {
            mono.extend(
                sample_buf
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            mono.extend_from_slice(sample_buf.samples());
        }
    }

    debug!(
        "Decoded {} mono samples at {} Hz from {:?}",
        mono.len(),
        source_rate,
        source
    );

    Ok((mono, source_rate))
}

/// Decide whether a demuxer error ends the stream cleanly. A reset request
/// (a chained stream with new parameters) keeps what was decoded so far.
fn end_of_stream(source: &Path, err: SymphoniaError, decoded: usize) -> Result<(), ConversionError> {
    match err {
        SymphoniaError::IoError(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
        SymphoniaError::ResetRequired => {
            warn!(
                "Decoder reset required in {:?}, stopping at {} samples",
                source, decoded
            );
            Ok(())
        }
        e => Err(ConversionError::Decode(format!("packet: {}", e))),
    }
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ConversionError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (samples.len() as f64 * ratio).round() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| ConversionError::Resample(format!("init: {}", e)))?;

    let mut output = Vec::with_capacity(expected_len + RESAMPLE_CHUNK);

    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let mut input = chunk.to_vec();
        input.resize(RESAMPLE_CHUNK, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| ConversionError::Resample(e.to_string()))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate(expected_len);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::PcmProfile;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 8000.0;
            writer.write_sample(sample as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_normalized_path_for_non_wav() {
        assert_eq!(
            normalized_path(Path::new("/data/input/abc_talk.mp3")),
            PathBuf::from("/data/input/abc_talk.wav")
        );
    }

    #[test]
    fn test_normalized_path_never_overwrites_wav_source() {
        assert_eq!(
            normalized_path(Path::new("/data/input/abc_talk.WAV")),
            PathBuf::from("/data/input/abc_talk_16k.wav")
        );
    }

    #[test]
    fn test_normalize_downmixes_and_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("stereo.wav");
        write_wav(&source, 44_100, 2, 44_100);

        let output = SymphoniaNormalizer::new().normalize(&source).unwrap();

        assert_eq!(output, dir.path().join("stereo_16k.wav"));
        assert!(source.exists());
        assert!(PcmProfile::read(&output).unwrap().is_recognizer_ready());

        let frames = hound::WavReader::open(&output).unwrap().len();
        assert_eq!(frames, 16_000);
    }

    #[test]
    fn test_normalize_keeps_duration_of_ready_audio() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("speech.wav");
        write_wav(&source, 16_000, 1, 8_000);

        let output = SymphoniaNormalizer::new().normalize(&source).unwrap();

        assert_eq!(hound::WavReader::open(&output).unwrap().len(), 8_000);
    }

    #[test]
    fn test_normalize_rejects_undecodable_input() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.mp3");
        std::fs::write(&source, b"definitely not audio").unwrap();

        let err = SymphoniaNormalizer::new().normalize(&source).unwrap_err();

        assert!(matches!(err, ConversionError::Decode(_)));
        assert!(!normalized_path(&source).exists());
    }

    #[test]
    fn test_normalize_missing_source() {
        let err = SymphoniaNormalizer::new()
            .normalize(Path::new("/nonexistent/input.mp3"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_remove_staged_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("a.wav");
        std::fs::write(&staged, b"x").unwrap();

        remove_staged(&[staged.clone(), dir.path().join("missing.wav")]);

        assert!(!staged.exists());
    }

    #[test]
    fn test_stream_reset_keeps_decoded_audio() {
        let source = Path::new("chained.ogg");
        let eof = SymphoniaError::IoError(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));

        assert!(end_of_stream(source, eof, 0).is_ok());
        assert!(end_of_stream(source, SymphoniaError::ResetRequired, 48_000).is_ok());

        let err = end_of_stream(source, SymphoniaError::Unsupported("feature"), 0).unwrap_err();
        assert!(matches!(err, ConversionError::Decode(_)));
    }
}
