/*!
 * Footage resolver: one duration-fitted clip per segment.
 *
 * Phrases are tried in rank order. For each search the candidates that are
 * long enough to be usable are scored and the best one is fitted to the
 * segment's required duration, either trimmed or looped. Across a run, clips
 * already used by an earlier segment are avoided while alternatives exist.
 */

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::errors::{PipelineError, ProviderError};
use crate::providers::FootageSearch;
use crate::retry::RetryPolicy;

use super::model::{FootageCandidate, ResolvedClip, SearchQuery, Segment};

/// Finds and fits stock clips for search queries
#[derive(Debug, Clone)]
pub struct FootageResolver {
    search: Arc<dyn FootageSearch>,
    retry: RetryPolicy,
    min_usable_fraction: f64,
    fallback_query: Option<String>,
    frame_ms: u64,
    max_concurrent_requests: usize,
}

impl FootageResolver {
    pub fn new(search: Arc<dyn FootageSearch>, retry: RetryPolicy) -> Self {
        Self {
            search,
            retry,
            min_usable_fraction: 0.5,
            fallback_query: None,
            frame_ms: 34,
            max_concurrent_requests: 4,
        }
    }

    pub fn with_min_usable_fraction(mut self, fraction: f64) -> Self {
        self.min_usable_fraction = fraction;
        self
    }

    pub fn with_fallback_query(mut self, fallback_query: Option<String>) -> Self {
        self.fallback_query = fallback_query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_frame_ms(mut self, frame_ms: u64) -> Self {
        self.frame_ms = frame_ms;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests.max(1);
        self
    }

    /// Resolve a clip for `query` lasting exactly `required_ms`
    pub async fn resolve(&self, query: &SearchQuery, required_ms: u64) -> Result<ResolvedClip, PipelineError> {
        let shortlist = self
            .shortlist_from(query, required_ms, 0)
            .await?
            .ok_or_else(|| self.no_usable_clip(query, required_ms))?;
        let candidate = shortlist.best().clone();
        Ok(self.fit_clip(query, &shortlist.phrase, candidate, required_ms))
    }

    /// Resolve every segment; results follow segment order.
    ///
    /// Searches run concurrently. Clips are then settled in segment order so
    /// that a clip already used by an earlier segment is only picked again
    /// when nothing unused turns up for the later one.
    pub async fn resolve_all(
        &self,
        queries: &[SearchQuery],
        segments: &[Segment],
    ) -> Result<Vec<ResolvedClip>, PipelineError> {
        if queries.len() != segments.len() {
            return Err(PipelineError::Resolution(format!(
                "{} queries for {} segments",
                queries.len(),
                segments.len()
            )));
        }
        info!("Resolving footage for {} segments", segments.len());

        let mut results: Vec<(usize, Result<Option<Shortlist>, PipelineError>)> =
            stream::iter(queries.iter().zip(segments.iter()).enumerate())
                .map(|(position, (query, segment))| async move {
                    (position, self.shortlist_from(query, segment.duration_ms(), 0).await)
                })
                .buffer_unordered(self.max_concurrent_requests)
                .collect::<Vec<_>>()
                .await;
        results.sort_by_key(|(position, _)| *position);

        let mut used: HashSet<String> = HashSet::new();
        let mut clips = Vec::with_capacity(segments.len());
        for ((_, result), (query, segment)) in results.into_iter().zip(queries.iter().zip(segments.iter())) {
            let required_ms = segment.duration_ms();
            let shortlist = result?.ok_or_else(|| self.no_usable_clip(query, required_ms))?;
            let (phrase, candidate) = self.settle(query, required_ms, shortlist, &used).await;
            used.insert(candidate.file_reference.clone());
            clips.push(self.fit_clip(query, &phrase, candidate, required_ms));
        }
        Ok(clips)
    }

    /// Pick an unused candidate, searching later phrases when the shortlist is used up
    async fn settle(
        &self,
        query: &SearchQuery,
        required_ms: u64,
        shortlist: Shortlist,
        used: &HashSet<String>,
    ) -> (String, FootageCandidate) {
        if let Some(candidate) = shortlist.unused(used) {
            return (shortlist.phrase, candidate);
        }

        let mut from = shortlist.position + 1;
        loop {
            match self.shortlist_from(query, required_ms, from).await {
                Ok(Some(next)) => {
                    if let Some(candidate) = next.unused(used) {
                        debug!(
                            "Segment {}: '{}' clips already used, took '{}' instead",
                            query.segment_index, shortlist.phrase, next.phrase
                        );
                        return (next.phrase, candidate);
                    }
                    from = next.position + 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Segment {}: stopped looking for an unused clip: {}", query.segment_index, e);
                    break;
                }
            }
        }

        let candidate = shortlist.best().clone();
        info!(
            "Segment {}: no unused clip found, repeating {}",
            query.segment_index, candidate.file_reference
        );
        (shortlist.phrase, candidate)
    }

    /// Phrases in search order: ranked phrases, then the fallback query
    fn search_order<'a>(&'a self, query: &'a SearchQuery) -> Vec<&'a str> {
        let fallback = self
            .fallback_query
            .iter()
            .filter(|f| !query.phrases.iter().any(|p| p.eq_ignore_ascii_case(f)));
        query.phrases.iter().chain(fallback).map(|p| p.as_str()).collect()
    }

    /// First phrase at or after position `from` with a usable candidate.
    ///
    /// A search still failing transiently once its retries are spent moves on
    /// to the next phrase, and is reported only if no later phrase yields a
    /// clip. Terminal failures end the segment immediately.
    async fn shortlist_from(
        &self,
        query: &SearchQuery,
        required_ms: u64,
        from: usize,
    ) -> Result<Option<Shortlist>, PipelineError> {
        let mut deferred: Option<PipelineError> = None;

        for (position, phrase) in self.search_order(query).into_iter().enumerate().skip(from) {
            if position == query.phrases.len() {
                warn!(
                    "Segment {}: all phrases exhausted, trying fallback '{}'",
                    query.segment_index, phrase
                );
            }

            let operation = format!("Footage search '{}'", phrase);
            let candidates = match self.retry.run(&operation, || self.search.search(phrase)).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_transient() => {
                    warn!("Segment {}: giving up on '{}': {}", query.segment_index, phrase, e);
                    deferred = Some(search_failed(query, phrase, e));
                    continue;
                }
                Err(e) => return Err(search_failed(query, phrase, e)),
            };

            let ranked = self.rank_candidates(candidates, required_ms);
            if ranked.is_empty() {
                debug!("Segment {}: no usable clip for '{}'", query.segment_index, phrase);
                continue;
            }
            return Ok(Some(Shortlist {
                position,
                phrase: phrase.to_string(),
                candidates: ranked,
            }));
        }

        match deferred {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    fn fit_clip(&self, query: &SearchQuery, phrase: &str, candidate: FootageCandidate, required_ms: u64) -> ResolvedClip {
        let clip = ResolvedClip::fit(phrase, candidate, required_ms, self.frame_ms);
        debug!(
            "Segment {}: '{}' -> {} ({}ms natural, {} to {}ms)",
            query.segment_index,
            phrase,
            clip.file_reference,
            clip.natural_duration_ms,
            clip.fit.name(),
            required_ms
        );
        clip
    }

    fn no_usable_clip(&self, query: &SearchQuery, required_ms: u64) -> PipelineError {
        PipelineError::Resolution(format!(
            "no usable clip of at least {}ms for segment {} (phrases: {:?})",
            self.min_usable_ms(required_ms),
            query.segment_index,
            query.phrases
        ))
    }

    fn min_usable_ms(&self, required_ms: u64) -> u64 {
        (required_ms as f64 * self.min_usable_fraction).ceil() as u64
    }

    /// Usable candidates, best first: long enough clips before short ones, then the closest length
    fn rank_candidates(&self, candidates: Vec<FootageCandidate>, required_ms: u64) -> Vec<FootageCandidate> {
        let min_usable = self.min_usable_ms(required_ms);
        let mut usable: Vec<FootageCandidate> = candidates
            .into_iter()
            .filter(|c| c.natural_duration_ms > 0 && c.natural_duration_ms >= min_usable)
            .collect();
        usable.sort_by_key(|c| score(c, required_ms));
        usable
    }
}

/// Ranked usable candidates from one phrase; never empty
#[derive(Debug, Clone)]
struct Shortlist {
    position: usize,
    phrase: String,
    candidates: Vec<FootageCandidate>,
}

impl Shortlist {
    fn best(&self) -> &FootageCandidate {
        &self.candidates[0]
    }

    fn unused(&self, used: &HashSet<String>) -> Option<FootageCandidate> {
        self.candidates
            .iter()
            .find(|c| !used.contains(&c.file_reference))
            .cloned()
    }
}

fn score(candidate: &FootageCandidate, required_ms: u64) -> (bool, u64) {
    (
        candidate.natural_duration_ms < required_ms,
        candidate.natural_duration_ms.abs_diff(required_ms),
    )
}

fn search_failed(query: &SearchQuery, phrase: &str, error: ProviderError) -> PipelineError {
    PipelineError::Resolution(format!(
        "footage search for segment {} ('{}') failed: {}",
        query.segment_index, phrase, error
    ))
}
