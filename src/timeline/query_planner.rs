/*!
 * Query planner: ranked visual search phrases for every segment.
 *
 * Phrase suggestion fans out over the segments with bounded concurrency,
 * each call under the shared retry policy. Results are ranked per segment,
 * deduplicated across the whole plan and padded so every segment has at
 * least one phrase.
 */

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::errors::{PipelineError, ProviderError};
use crate::providers::QueryGenerator;
use crate::retry::RetryPolicy;

use super::model::{SearchQuery, Segment};

/// Builds one [`SearchQuery`] per segment
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    generator: Arc<dyn QueryGenerator>,
    retry: RetryPolicy,
    phrases_per_segment: usize,
    max_concurrent_requests: usize,
    fallback_query: Option<String>,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn QueryGenerator>, retry: RetryPolicy, phrases_per_segment: usize) -> Self {
        Self {
            generator,
            retry,
            phrases_per_segment: phrases_per_segment.max(1),
            max_concurrent_requests: 4,
            fallback_query: None,
        }
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests.max(1);
        self
    }

    /// Phrase used when no segment received any suggestion
    pub fn with_fallback_query(mut self, fallback_query: Option<String>) -> Self {
        self.fallback_query = fallback_query
            .map(|q| normalize_phrase(&q))
            .filter(|q| !q.is_empty());
        self
    }

    /// Plan search phrases for `segments`, one query per segment in segment order
    pub async fn plan(&self, segments: &[Segment]) -> Result<Vec<SearchQuery>, PipelineError> {
        info!("Planning search phrases for {} segments", segments.len());
        let k = self.phrases_per_segment;

        let mut suggestions: Vec<(usize, Result<Vec<String>, ProviderError>)> = stream::iter(segments.iter())
            .map(|segment| {
                let generator = self.generator.clone();
                let retry = self.retry.clone();
                async move {
                    let operation = format!("Phrase suggestion for segment {}", segment.index);
                    let result = retry
                        .run(&operation, || generator.suggest_queries(&segment.text, k))
                        .await;
                    (segment.index, result)
                }
            })
            .buffered(self.max_concurrent_requests)
            .collect::<Vec<_>>()
            .await;
        suggestions.sort_by_key(|(index, _)| *index);

        let mut raw: Vec<(usize, Vec<String>)> = Vec::with_capacity(suggestions.len());
        for (index, result) in suggestions {
            raw.push((index, result.map_err(PipelineError::Planning)?));
        }

        let ranked = rank_phrases(raw, k);
        let queries = self.pad_empty(ranked)?;

        for query in &queries {
            debug!("Segment {} phrases: {:?}", query.segment_index, query.phrases);
        }
        Ok(queries)
    }

    fn pad_empty(&self, ranked: Vec<SearchQuery>) -> Result<Vec<SearchQuery>, PipelineError> {
        let tops: Vec<Option<String>> = ranked
            .iter()
            .map(|q| q.top_phrase().map(str::to_string))
            .collect();

        let mut padded = Vec::with_capacity(ranked.len());
        for (position, query) in ranked.into_iter().enumerate() {
            if !query.phrases.is_empty() {
                padded.push(query);
                continue;
            }

            let previous = tops[..position].iter().rev().flatten().next();
            let following = tops[position + 1..].iter().flatten().next();
            let phrase = previous
                .or(following)
                .cloned()
                .or_else(|| self.fallback_query.clone())
                .ok_or_else(|| {
                    PipelineError::Planning(ProviderError::ParseError(
                        "no search phrases suggested for any segment".to_string(),
                    ))
                })?;

            warn!(
                "Segment {} received no usable phrases, reusing '{}'",
                query.segment_index, phrase
            );
            padded.push(SearchQuery::new(query.segment_index, vec![phrase]));
        }
        Ok(padded)
    }
}

/// Trim and collapse internal whitespace
fn normalize_phrase(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize, drop empties, dedupe case-insensitively across segments (earlier wins), keep `k`
fn rank_phrases(raw: Vec<(usize, Vec<String>)>, k: usize) -> Vec<SearchQuery> {
    let mut seen: HashSet<String> = HashSet::new();

    raw.into_iter()
        .map(|(index, phrases)| {
            let mut kept = Vec::with_capacity(k);
            for phrase in phrases {
                if kept.len() == k {
                    break;
                }
                let phrase = normalize_phrase(&phrase);
                if phrase.is_empty() {
                    continue;
                }
                if seen.insert(phrase.to_lowercase()) {
                    kept.push(phrase);
                }
            }
            SearchQuery::new(index, kept)
        })
        .collect()
}
