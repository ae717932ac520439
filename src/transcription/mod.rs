//! Transcript data model, word segmentation and subtitle output.

pub mod segment;
pub mod subtitle;
pub mod transcript;

pub use segment::{SegmentStats, Segmenter, SegmenterConfig};
pub use subtitle::{SubtitleParseError, format_vtt_time, parse_vtt, render_vtt};
pub use transcript::{SubtitleSegment, TranscriptResult, Utterance, WordSpan};
