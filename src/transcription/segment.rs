//! Word-to-sentence segmentation.
//!
//! Groups consecutive recognized words into subtitle segments, closing a
//! segment when it would grow too long or when the speaker pauses.

use super::transcript::{SubtitleSegment, WordSpan};

/// Configuration for segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    /// Maximum segment length in seconds (default: 5.0)
    pub max_duration: f64,
    /// Maximum silence between words in seconds (default: 1.0)
    pub max_gap: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_duration: 5.0,
            max_gap: 1.0,
        }
    }
}

/// Groups word spans into subtitle segments
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SegmenterConfig::default())
    }

    /// Single left-to-right pass over `words`.
    ///
    /// A word extends the open segment unless the extended segment would last
    /// longer than `max_duration` or the silence before the word exceeds
    /// `max_gap`; in that case the open segment is closed and the word seeds
    /// the next one.
    pub fn segment(&self, words: &[WordSpan]) -> Vec<SubtitleSegment> {
        let Some((first, rest)) = words.split_first() else {
            return Vec::new();
        };

        let mut segments = Vec::new();
        let mut current = SubtitleSegment::from_word(first);

        for word in rest {
            let duration = word.end - current.start;
            let gap = word.start - current.end;

            if duration > self.config.max_duration || gap > self.config.max_gap {
                let closed = std::mem::replace(&mut current, SubtitleSegment::from_word(word));
                segments.push(closed);
            } else {
                current.end = word.end;
                current.text.push(' ');
                current.text.push_str(&word.text);
            }
        }

        if !current.text.is_empty() {
            segments.push(current);
        }

        segments
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }
}

/// Statistics about segmentation results
#[derive(Debug, Default, PartialEq)]
pub struct SegmentStats {
    pub total_segments: usize,
    pub total_duration_secs: f64,
    pub avg_segment_duration_secs: f64,
    pub max_segment_duration_secs: f64,
}

impl SegmentStats {
    pub fn compute(segments: &[SubtitleSegment]) -> Self {
        if segments.is_empty() {
            return Self::default();
        }

        let total_duration_secs: f64 = segments.iter().map(SubtitleSegment::duration).sum();
        let max_segment_duration_secs = segments
            .iter()
            .map(SubtitleSegment::duration)
            .fold(0.0, f64::max);

        Self {
            total_segments: segments.len(),
            total_duration_secs,
            avg_segment_duration_secs: total_duration_secs / segments.len() as f64,
            max_segment_duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(start: f64, end: f64, text: &str) -> WordSpan {
        WordSpan::new(start, end, text)
    }

    #[test]
    fn test_segmenter_config_default() {
        let config = SegmenterConfig::default();
        assert_eq!(config.max_duration, 5.0);
        assert_eq!(config.max_gap, 1.0);
    }

    #[test]
    fn test_empty_input_yields_no_segments() {
        assert!(Segmenter::with_defaults().segment(&[]).is_empty());
    }

    #[test]
    fn test_gap_splits_into_two_segments() {
        let words = vec![
            word(0.0, 0.5, "hi"),
            word(0.6, 1.0, "there"),
            word(3.0, 3.5, "ok"),
        ];

        let segments = Segmenter::with_defaults().segment(&words);

        assert_eq!(
            segments,
            vec![
                SubtitleSegment::new(0.0, 1.0, "hi there"),
                SubtitleSegment::new(3.0, 3.5, "ok"),
            ]
        );
    }

    #[test]
    fn test_close_words_form_one_segment() {
        let words: Vec<WordSpan> = (0..8)
            .map(|i| {
                let start = i as f64 * 0.5;
                word(start, start + 0.4, &format!("w{i}"))
            })
            .collect();

        let segments = Segmenter::with_defaults().segment(&words);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, words[7].end);
        assert_eq!(segments[0].text, "w0 w1 w2 w3 w4 w5 w6 w7");
    }

    #[test]
    fn test_single_large_gap_always_splits() {
        let segmenter = Segmenter::new(SegmenterConfig {
            max_duration: 1000.0,
            max_gap: 0.25,
        });
        let words = vec![
            word(0.0, 0.2, "one"),
            word(0.3, 0.5, "two"),
            word(0.76, 0.9, "three"),
            word(1.0, 1.2, "four"),
        ];

        let segments = segmenter.segment(&words);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "one two");
        assert_eq!(segments[0].end, 0.5);
        assert_eq!(segments[1].text, "three four");
        assert_eq!(segments[1].start, 0.76);
    }

    #[test]
    fn test_gap_equal_to_threshold_does_not_split() {
        let words = vec![word(0.0, 1.0, "a"), word(2.0, 2.5, "b")];
        let segments = Segmenter::with_defaults().segment(&words);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "a b");
    }

    #[test]
    fn test_max_duration_splits_continuous_speech() {
        let words: Vec<WordSpan> = (0..12)
            .map(|i| {
                let start = i as f64;
                word(start, start + 0.9, "la")
            })
            .collect();

        let segments = Segmenter::with_defaults().segment(&words);

        assert_eq!(segments.len(), 3);
        for segment in &segments {
            assert!(segment.duration() <= 5.0);
        }
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, words[4].end);
        assert_eq!(segments[1].start, 5.0);
        assert_eq!(segments[2].start, 10.0);
        assert_eq!(segments[2].end, words[11].end);
    }

    #[test]
    fn test_segments_are_ordered_and_non_overlapping() {
        let words = vec![
            word(0.0, 0.3, "a"),
            word(2.0, 2.3, "b"),
            word(2.4, 2.6, "c"),
            word(9.0, 9.1, "d"),
        ];
        let segments = Segmenter::with_defaults().segment(&words);
        for pair in segments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_trailing_empty_segment_is_dropped() {
        let segments = Segmenter::with_defaults().segment(&[word(0.0, 0.1, "")]);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_segment_stats() {
        let segments = vec![
            SubtitleSegment::new(0.0, 2.0, "a"),
            SubtitleSegment::new(3.0, 7.0, "b"),
        ];
        let stats = SegmentStats::compute(&segments);
        assert_eq!(stats.total_segments, 2);
        assert_eq!(stats.total_duration_secs, 6.0);
        assert_eq!(stats.avg_segment_duration_secs, 3.0);
        assert_eq!(stats.max_segment_duration_secs, 4.0);
        assert_eq!(SegmentStats::compute(&[]), SegmentStats::default());
    }
}
