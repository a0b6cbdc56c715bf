/*!
 * Tests for render plan assembly
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use storyforge::app_config::Config;
use storyforge::errors::PipelineError;
use storyforge::timeline::{
    ComposerSettings, FootageCandidate, RenderPlan, ResolvedClip, Segment, SegmentTimer, TimelineComposer, Word,
    WindowLimit, Transcript,
};
use crate::common;

fn assert_valid_plan(plan: &RenderPlan, word_count: usize, tolerance_ms: u64) {
    let mut cursor = 0;
    for entry in &plan.entries {
        assert_eq!(entry.offset_ms, cursor);
        assert!(entry.clip.target_duration_ms.abs_diff(entry.clip.rendered_duration_ms()) < tolerance_ms);
        let mut caption_cursor = entry.offset_ms;
        for caption in &entry.captions {
            assert_eq!(caption.start_ms, caption_cursor);
            assert!(caption.end_ms > caption.start_ms);
            caption_cursor = caption.end_ms;
        }
        assert_eq!(caption_cursor, entry.end_ms());
        cursor = entry.end_ms();
    }
    assert_eq!(cursor, plan.narration.duration_ms);
    let encoded: u64 = plan.clips().map(|c| c.rendered_duration_ms()).sum();
    assert!(encoded.abs_diff(plan.narration.duration_ms) < tolerance_ms);
    assert_eq!(plan.captions().map(|c| c.words.len()).sum::<usize>(), word_count);
}

fn random_words(rng: &mut StdRng, count: usize) -> (Vec<Word>, u64) {
    let mut cursor = rng.random_range(0..300);
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        let length = rng.random_range(150..600);
        let text = if rng.random_range(0..6) == 0 {
            format!("end{}.", i)
        } else {
            format!("word{}", i)
        };
        words.push(Word::new(text, cursor, cursor + length));
        cursor += length + rng.random_range(0..400);
    }
    (words, cursor + rng.random_range(0..800))
}

fn fitted_clips(rng: &mut StdRng, segments: &[Segment]) -> Vec<ResolvedClip> {
    segments
        .iter()
        .map(|s| {
            let required = s.duration_ms();
            let natural = rng.random_range(required.div_ceil(2)..=required * 3);
            ResolvedClip::fit(
                format!("phrase {}", s.index),
                FootageCandidate::new(format!("clip{}.mp4", s.index), natural),
                required,
                34,
            )
        })
        .collect()
}

#[test]
fn test_compose_withRandomTimelines_shouldProduceValidPlans() {
    let mut rng = StdRng::seed_from_u64(11);
    let composer = TimelineComposer::default();

    for round in 0..40 {
        let count = rng.random_range(1..80);
        let (words, narration_ms) = random_words(&mut rng, count);
        let transcript = Transcript::from_words(words).unwrap();
        let captions = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 2_500, max_words: 7 })
            .build_windows(&transcript, narration_ms)
            .unwrap();
        let segment_limit = if round % 2 == 0 {
            WindowLimit::TargetCount(rng.random_range(1..10))
        } else {
            WindowLimit::MaxDuration { max_ms: 6_000, max_words: usize::MAX }
        };
        let segments = SegmentTimer::new(segment_limit)
            .build_segments(&transcript, narration_ms)
            .unwrap();
        let clips = fitted_clips(&mut rng, &segments);

        let plan = composer
            .compose(&segments, &captions, &clips, &common::narration(narration_ms))
            .unwrap();

        assert_eq!(plan.entries.len(), segments.len());
        assert_valid_plan(&plan, transcript.len(), 50);
    }
}

#[test]
fn test_compose_calledTwice_shouldBeIdentical() {
    let mut rng = StdRng::seed_from_u64(5);
    let (words, narration_ms) = random_words(&mut rng, 30);
    let transcript = Transcript::from_words(words).unwrap();
    let captions = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 3_000, max_words: 8 })
        .build_windows(&transcript, narration_ms)
        .unwrap();
    let segments = SegmentTimer::new(WindowLimit::TargetCount(4))
        .build_segments(&transcript, narration_ms)
        .unwrap();
    let clips = fitted_clips(&mut rng, &segments);
    let composer = TimelineComposer::default();

    let first = composer
        .compose(&segments, &captions, &clips, &common::narration(narration_ms))
        .unwrap();
    let second = composer
        .compose(&segments, &captions, &clips, &common::narration(narration_ms))
        .unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_compose_withNarrationFarLongerThanSegments_shouldFail() {
    let transcript = common::transcript(&[("Dusk.", 0, 900)]);
    let captions = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 6_000, max_words: 15 })
        .build_windows(&transcript, 4_000)
        .unwrap();
    let segments = vec![Segment::new(0, "Dusk.", 0, 4_000)];
    let clips = vec![ResolvedClip::fit("dusk", FootageCandidate::new("dusk.mp4", 5_000), 4_000, 34)];
    let composer = TimelineComposer::new(ComposerSettings {
        max_residual_ms: 500,
        ..ComposerSettings::default()
    });

    let result = composer.compose(&segments, &captions, &clips, &common::narration(6_000));

    assert!(matches!(result, Err(PipelineError::PlanAssembly(_))));
}

#[test]
fn test_compose_withClipTooShortForLoopTolerance_shouldRefitAndPass() {
    let transcript = common::transcript(&[("Fog", 0, 400), ("rolled", 500, 900), ("in.", 1_000, 1_300)]);
    let captions = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 6_000, max_words: 15 })
        .build_windows(&transcript, 3_000)
        .unwrap();
    // Segment ends 40ms short of the narration; the clip was fitted to the shorter span
    let segments = vec![Segment::new(0, "Fog rolled in.", 0, 2_960)];
    let clips = vec![ResolvedClip::fit("fog", FootageCandidate::new("fog.mp4", 1_000), 2_960, 34)];

    let plan = TimelineComposer::default()
        .compose(&segments, &captions, &clips, &common::narration(3_000))
        .unwrap();

    let clip = &plan.entries[0].clip;
    assert_eq!(clip.target_duration_ms, 3_000);
    assert_eq!(clip.rendered_duration_ms(), 3_000);
    assert_valid_plan(&plan, 3, 50);
}

#[test]
fn test_compose_withToleranceBelowOneFrame_shouldAcceptSubFrameLoopTail() {
    let mut config = Config::default();
    config.timing.tolerance_ms = 20;
    assert!(config.validate_limits().is_ok());
    let composer = TimelineComposer::new(ComposerSettings::from_config(&config));
    let transcript = common::transcript(&[("Gulls", 0, 500), ("circled.", 600, 1_200)]);
    let captions = SegmentTimer::new(WindowLimit::MaxDuration { max_ms: 6_000, max_words: 15 })
        .build_windows(&transcript, 4_000)
        .unwrap();
    let segments = vec![Segment::new(0, "Gulls circled.", 0, 4_000)];
    let clips = vec![ResolvedClip::fit("gulls", FootageCandidate::new("gulls.mp4", 3_975), 4_000, 34)];

    let plan = composer
        .compose(&segments, &captions, &clips, &common::narration(4_000))
        .unwrap();

    assert_eq!(plan.entries[0].clip.hold_ms(), 25);
    assert_valid_plan(&plan, 2, 20);
}
