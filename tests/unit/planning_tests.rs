/*!
 * Tests for search phrase planning and footage resolution
 */

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use storyforge::errors::PipelineError;
use storyforge::providers::mock::{MockBehavior, MockFootageSearch, MockQueryGenerator};
use storyforge::retry::RetryPolicy;
use storyforge::timeline::{FitMode, FootageResolver, QueryPlanner, SearchQuery, Segment};

fn segments(texts: &[&str], duration_ms: u64) -> Vec<Segment> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Segment::new(i, *t, i as u64 * duration_ms, (i as u64 + 1) * duration_ms))
        .collect()
}

#[tokio::test]
async fn test_plan_withOverlappingSuggestions_shouldKeepPhrasesUniqueAcrossPlan() {
    let generator = MockQueryGenerator::working()
        .with_response("one", &["Foggy Harbor", "boats", "gulls"])
        .with_response("two", &["foggy  harbor", "BOATS", "fishermen"])
        .with_response("three", &["gulls", "fog horn"]);
    let planner = QueryPlanner::new(Arc::new(generator), RetryPolicy::none(), 3);

    let queries = planner.plan(&segments(&["one", "two", "three"], 3_000)).await.unwrap();

    assert_eq!(queries[0].phrases, vec!["Foggy Harbor", "boats", "gulls"]);
    assert_eq!(queries[1].phrases, vec!["fishermen"]);
    assert_eq!(queries[2].phrases, vec!["fog horn"]);
    let mut seen = HashSet::new();
    for phrase in queries.iter().flat_map(|q| q.phrases.iter()) {
        assert!(seen.insert(phrase.to_lowercase()), "duplicate phrase {}", phrase);
    }
}

#[tokio::test]
async fn test_plan_withEmptyFirstSegment_shouldBorrowFromFollowing() {
    let generator = MockQueryGenerator::working()
        .with_response("silence", &[])
        .with_response("waves", &["crashing waves"]);
    let planner = QueryPlanner::new(Arc::new(generator), RetryPolicy::none(), 2);

    let queries = planner.plan(&segments(&["silence", "waves"], 2_000)).await.unwrap();

    assert_eq!(queries[0].phrases, vec!["crashing waves"]);
    assert_eq!(queries[1].phrases, vec!["crashing waves"]);
}

#[tokio::test]
async fn test_plan_withNoSuggestionsAnywhere_shouldUseFallback() {
    let generator = MockQueryGenerator::working()
        .with_response("a", &[" "])
        .with_response("b", &[]);
    let planner = QueryPlanner::new(Arc::new(generator), RetryPolicy::none(), 2)
        .with_fallback_query(Some("  city   lights ".to_string()));

    let queries = planner.plan(&segments(&["a", "b"], 2_000)).await.unwrap();

    assert!(queries.iter().all(|q| q.phrases == vec!["city lights"]));
}

#[tokio::test]
async fn test_plan_withFailingGenerator_shouldReturnPlanningError() {
    let generator = MockQueryGenerator::failing();
    let planner = QueryPlanner::new(Arc::new(generator.clone()), RetryPolicy::new(1, 1), 3);

    let error = planner.plan(&segments(&["storm"], 2_000)).await.unwrap_err();

    assert!(matches!(error, PipelineError::Planning(_)));
    assert_eq!(generator.request_count(), 2);
}

#[tokio::test]
async fn test_plan_withSlowGenerator_shouldKeepSegmentOrder() {
    let texts: Vec<String> = (0..12).map(|i| format!("scene{} rain", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
    let generator = MockQueryGenerator::new(MockBehavior::Slow { delay_ms: 5 });
    let planner = QueryPlanner::new(Arc::new(generator), RetryPolicy::none(), 1).with_max_concurrent_requests(4);

    let queries = planner.plan(&segments(&text_refs, 1_000)).await.unwrap();

    for (i, query) in queries.iter().enumerate() {
        assert_eq!(query.segment_index, i);
        assert_eq!(query.top_phrase(), Some(format!("scene{}", i).as_str()));
    }
}

#[tokio::test]
async fn test_resolveAll_withRandomDurations_shouldFitEverySegmentExactly() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut search = MockFootageSearch::empty();
    let mut queries = Vec::new();
    let mut segs = Vec::new();
    let mut cursor = 0;

    for i in 0..30 {
        let required = rng.random_range(1_000..12_000);
        let phrase = format!("shot {}", i);
        let durations: Vec<u64> = (0..3).map(|_| rng.random_range(600..25_000)).collect();
        search = search.with_clips(phrase.clone(), &durations);
        queries.push(SearchQuery::new(i, vec![phrase]));
        segs.push(Segment::new(i, format!("text {}", i), cursor, cursor + required));
        cursor += required;
    }
    // Every segment can always fall back to a clip of exactly its length
    let mut fallback_search = search;
    for seg in &segs {
        fallback_search = fallback_search.with_clips(format!("fallback {}", seg.index), &[seg.duration_ms()]);
    }
    let queries: Vec<SearchQuery> = queries
        .into_iter()
        .map(|q| {
            let mut phrases = q.phrases.clone();
            phrases.push(format!("fallback {}", q.segment_index));
            SearchQuery::new(q.segment_index, phrases)
        })
        .collect();
    let resolver = FootageResolver::new(Arc::new(fallback_search), RetryPolicy::none()).with_max_concurrent_requests(8);

    let clips = resolver.resolve_all(&queries, &segs).await.unwrap();

    assert_eq!(clips.len(), segs.len());
    for (clip, seg) in clips.iter().zip(segs.iter()) {
        assert_eq!(clip.target_duration_ms, seg.duration_ms());
        assert!(clip.natural_duration_ms * 2 >= seg.duration_ms());
        let rendered = clip.rendered_duration_ms();
        assert!(seg.duration_ms() - rendered < 34, "segment {} drifts", seg.index);
        if let FitMode::Trim { offset_ms } = clip.fit {
            assert!(offset_ms + seg.duration_ms() <= clip.natural_duration_ms);
        }
    }
}

#[tokio::test]
async fn test_resolve_withShortClipsOnly_shouldPreferLongestUsable() {
    let search = MockFootageSearch::empty().with_clips("alley", &[3_000, 5_000, 4_000]);
    let resolver = FootageResolver::new(Arc::new(search), RetryPolicy::none());

    let clip = resolver
        .resolve(&SearchQuery::new(0, vec!["alley".to_string()]), 9_000)
        .await
        .unwrap();

    assert_eq!(clip.natural_duration_ms, 5_000);
    assert_eq!(clip.fit, FitMode::Loop { full_loops: 1, tail_ms: 4_000 });
}

#[tokio::test]
async fn test_resolve_withUnusableResults_shouldTryFallbackLast() {
    let search = MockFootageSearch::empty()
        .with_clips("desert", &[1_000])
        .with_clips("cinematic landscape", &[30_000]);
    let resolver = FootageResolver::new(Arc::new(search.clone()), RetryPolicy::none())
        .with_fallback_query(Some("cinematic landscape".to_string()));

    let clip = resolver
        .resolve(&SearchQuery::new(2, vec!["desert".to_string(), "dunes".to_string()]), 6_000)
        .await
        .unwrap();

    assert_eq!(clip.source_query, "cinematic landscape");
    assert_eq!(search.searched_phrases(), vec!["desert", "dunes", "cinematic landscape"]);
}
