//! Transcript types shared by the recognizer, the segmenter and the task store.

use serde::{Deserialize, Serialize};

use super::subtitle;

/// A recognized word with timing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSpan {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// The word text
    #[serde(rename = "word")]
    pub text: String,
    /// Confidence score (0.0 - 1.0), if the engine reported one
    #[serde(rename = "conf", default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl WordSpan {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Duration of the word in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One result emitted by the recognition engine, partial or final.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    #[serde(rename = "result", default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordSpan>,
}

impl Utterance {
    /// Build an utterance whose text is its words joined by spaces
    pub fn from_words(words: Vec<WordSpan>) -> Self {
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, words }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A display unit of one or more consecutive words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Space-joined word texts
    pub text: String,
}

impl SubtitleSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub(crate) fn from_word(word: &WordSpan) -> Self {
        Self::new(word.start, word.end, word.text.clone())
    }

    /// Duration of the segment in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Complete recognition output for one task.
///
/// Produced once by the recognition adapter and embedded, unchanged, in the
/// task record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// All utterance texts joined by single spaces
    pub text: String,
    /// Mean confidence over the words that reported one, 0.0 when none did
    pub confidence: f64,
    /// Raw engine utterances in emission order
    pub segments: Vec<Utterance>,
    /// Subtitle segments built from the flattened words
    pub vtt_segments: Vec<SubtitleSegment>,
}

impl TranscriptResult {
    /// Render the subtitle segments as a WebVTT document
    pub fn to_vtt(&self) -> String {
        subtitle::render_vtt(&self.vtt_segments)
    }

    /// Number of recognized words across all utterances
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|u| u.words.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_span_serializes_engine_field_names() {
        let word = WordSpan::new(0.5, 0.9, "hello").with_confidence(0.75);
        let json = serde_json::to_value(&word).unwrap();
        assert_eq!(json["word"], "hello");
        assert_eq!(json["conf"], 0.75);

        let unscored = serde_json::to_value(WordSpan::new(0.0, 0.1, "uh")).unwrap();
        assert!(unscored.get("conf").is_none());
    }

    #[test]
    fn test_utterance_from_words_joins_text() {
        let utterance = Utterance::from_words(vec![
            WordSpan::new(0.0, 0.4, "good"),
            WordSpan::new(0.5, 0.9, "morning"),
        ]);
        assert_eq!(utterance.text, "good morning");
        assert!(utterance.has_text());
        assert!(!Utterance::default().has_text());
    }

    #[test]
    fn test_transcript_result_word_count() {
        let result = TranscriptResult {
            text: "a b c".to_string(),
            confidence: 1.0,
            segments: vec![
                Utterance::from_words(vec![WordSpan::new(0.0, 0.1, "a")]),
                Utterance::from_words(vec![
                    WordSpan::new(0.2, 0.3, "b"),
                    WordSpan::new(0.4, 0.5, "c"),
                ]),
            ],
            vtt_segments: Vec::new(),
        };
        assert_eq!(result.word_count(), 3);
        assert_eq!(result.to_vtt(), "WEBVTT\n\n");
    }
}
