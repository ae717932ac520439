//! WebVTT rendering and parsing.

use std::fmt::Write as FmtWrite;

use thiserror::Error;

use super::transcript::SubtitleSegment;

const VTT_HEADER: &str = "WEBVTT";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubtitleParseError {
    #[error("Missing WEBVTT header")]
    MissingHeader,
    #[error("Invalid cue timing line: {0}")]
    InvalidTiming(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Render segments as a WebVTT document.
///
/// Segments whose text is empty after trimming are skipped.
pub fn render_vtt(segments: &[SubtitleSegment]) -> String {
    let mut output = format!("{VTT_HEADER}\n\n");

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }

        let _ = writeln!(
            output,
            "{} --> {}",
            format_vtt_time(segment.start),
            format_vtt_time(segment.end)
        );
        let _ = writeln!(output, "{}", text);
        let _ = writeln!(output);
    }

    output
}

/// Parse a WebVTT document back into segments.
///
/// Cue identifiers are accepted and ignored; multi-line cue text is joined
/// with newlines.
pub fn parse_vtt(document: &str) -> Result<Vec<SubtitleSegment>, SubtitleParseError> {
    let document = document.strip_prefix('\u{feff}').unwrap_or(document);
    let mut lines = document.lines();

    match lines.next() {
        Some(first) if first.trim_end().starts_with(VTT_HEADER) => {}
        _ => return Err(SubtitleParseError::MissingHeader),
    }

    let mut segments = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in lines.chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            block.push(line);
            continue;
        }
        if block.is_empty() {
            continue;
        }

        if let Some(timing_idx) = block.iter().position(|l| l.contains("-->")) {
            let (start, end) = parse_timing(block[timing_idx])?;
            let text = block[timing_idx + 1..].join("\n");
            segments.push(SubtitleSegment::new(start, end, text));
        }
        block.clear();
    }

    Ok(segments)
}

fn parse_timing(line: &str) -> Result<(f64, f64), SubtitleParseError> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| SubtitleParseError::InvalidTiming(line.to_string()))?;
    // Cue settings may follow the end timestamp
    let end = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| SubtitleParseError::InvalidTiming(line.to_string()))?;

    Ok((parse_vtt_time(start.trim())?, parse_vtt_time(end)?))
}

/// Format time for VTT (HH:MM:SS.mmm)
pub fn format_vtt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds
pub fn parse_vtt_time(value: &str) -> Result<f64, SubtitleParseError> {
    let invalid = || SubtitleParseError::InvalidTimestamp(value.to_string());

    let parts: Vec<&str> = value.split(':').collect();
    let (hours, mins, secs) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(invalid()),
    };

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let mins: u64 = mins.parse().map_err(|_| invalid())?;
    let secs: f64 = secs.parse().map_err(|_| invalid())?;
    if mins >= 60 || !(0.0..60.0).contains(&secs) {
        return Err(invalid());
    }

    Ok(hours as f64 * 3600.0 + mins as f64 * 60.0 + secs)
}
