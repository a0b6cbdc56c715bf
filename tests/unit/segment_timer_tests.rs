/*!
 * Tests for caption window and segment construction
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use storyforge::errors::PipelineError;
use storyforge::timeline::{CaptionWindow, SegmentTimer, Transcript, Word, WindowLimit};
use crate::common;

const WORDS: [&str; 8] = ["night", "fell", "over", "the", "harbor", "gulls", "circled", "home."];

/// A transcript of `count` words with random gaps and lengths
fn random_transcript(rng: &mut StdRng, count: usize) -> (Transcript, u64) {
    let mut cursor = rng.random_range(0..400);
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        let length = rng.random_range(120..700);
        let text = WORDS[rng.random_range(0..WORDS.len())];
        words.push(Word::new(format!("{}{}", text, i), cursor, cursor + length));
        cursor += length + rng.random_range(0..500);
    }
    let narration_ms = cursor + rng.random_range(0..1_500);
    (Transcript::from_words(words).unwrap(), narration_ms)
}

fn assert_partition(windows: &[CaptionWindow], transcript: &Transcript, narration_ms: u64) {
    assert_eq!(windows[0].start_ms, 0);
    assert_eq!(windows.last().unwrap().end_ms, narration_ms);
    for pair in windows.windows(2) {
        assert_eq!(pair[0].end_ms, pair[1].start_ms, "windows must be contiguous");
        assert!(pair[0].start_ms < pair[0].end_ms);
    }
    let flattened: Vec<&Word> = windows.iter().flat_map(|w| w.words.iter()).collect();
    let original: Vec<&Word> = transcript.words().iter().collect();
    assert_eq!(flattened, original, "every word appears once, in order");
}

#[test]
fn test_buildWindows_withRandomTranscripts_shouldPartitionNarration() {
    let mut rng = StdRng::seed_from_u64(17);
    let timer = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 3_000, max_words: 6 });

    for _ in 0..50 {
        let count = rng.random_range(1..60);
        let (transcript, narration_ms) = random_transcript(&mut rng, count);

        let windows = timer.build_windows(&transcript, narration_ms).unwrap();

        assert_partition(&windows, &transcript, narration_ms);
        assert!(windows.iter().all(|w| w.words.len() <= 6));
    }
}

#[test]
fn test_buildSegments_withTargetCount_shouldNeverExceedCount() {
    let mut rng = StdRng::seed_from_u64(42);

    for target in 1..8 {
        let (transcript, narration_ms) = random_transcript(&mut rng, 40);
        let timer = SegmentTimer::new(WindowLimit::TargetCount(target));

        let windows = timer.build_windows(&transcript, narration_ms).unwrap();
        let segments = timer.build_segments(&transcript, narration_ms).unwrap();

        assert_partition(&windows, &transcript, narration_ms);
        assert!(segments.len() <= target);
        for (index, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, index);
            assert_eq!(segment.start_ms, windows[index].start_ms);
            assert_eq!(segment.end_ms, windows[index].end_ms);
        }
    }
}

#[test]
fn test_buildWindows_withSentences_shouldCloseAtSentenceEnd() {
    let transcript = common::transcript(&[
        ("Rain", 0, 300),
        ("fell.", 350, 700),
        ("The", 800, 950),
        ("town", 1_000, 1_300),
        ("slept.", 1_350, 1_800),
    ]);
    let timer = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 10_000, max_words: 15 });

    let windows = timer.build_windows(&transcript, 2_000).unwrap();

    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].text(), "Rain fell.");
    assert_eq!((windows[0].start_ms, windows[0].end_ms), (0, 800));
    assert_eq!(windows[1].text(), "The town slept.");
    assert_eq!((windows[1].start_ms, windows[1].end_ms), (800, 2_000));
}

#[test]
fn test_buildWindows_withSingleWord_shouldSpanWholeNarration() {
    let transcript = common::transcript(&[("Hello", 200, 600)]);
    let timer = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 6_000, max_words: 15 });

    let windows = timer.build_windows(&transcript, 1_000).unwrap();

    assert_eq!(windows.len(), 1);
    assert_eq!((windows[0].start_ms, windows[0].end_ms), (0, 1_000));
}

#[test]
fn test_buildSegments_withEmptyTranscript_shouldFail() {
    let timer = SegmentTimer::new(WindowLimit::TargetCount(3));

    let result = timer.build_segments(&Transcript::default(), 5_000);

    assert_eq!(result.unwrap_err(), PipelineError::EmptyTranscript);
}
