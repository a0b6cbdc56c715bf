/*!
 * Mock collaborator implementations for testing.
 *
 * Every mock shares a [`MockBehavior`] that decides whether a call succeeds:
 * - `MockBehavior::Working` - always succeeds with scripted data
 * - `MockBehavior::Intermittent` - fails every Nth call with a transient error
 * - `MockBehavior::Failing` - always fails with a server error (transient)
 * - `MockBehavior::Unauthorized` - always fails with an authentication error
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::ProviderError;
use crate::providers::{FootageSearch, Narrator, QueryGenerator, Renderer, ScriptWriter, Transcriber};
use crate::timeline::{FootageCandidate, NarrationAudio, RenderPlan, Transcript, Word};

/// Behavior mode shared by all mock collaborators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request) with HTTP 503
    Intermittent { fail_every: usize },
    /// Always fails with HTTP 500
    Failing,
    /// Always fails with HTTP 401
    Unauthorized,
    /// Succeeds after a delay
    Slow { delay_ms: u64 },
}

/// Call counter plus behavior, cloned mocks share the counter
#[derive(Debug, Clone)]
struct MockState {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
}

impl MockState {
    fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn call(&self) -> Result<(), ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            MockBehavior::Working => Ok(()),
            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(())
                }
            }
            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),
            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError(
                "Simulated invalid API key".to_string(),
            )),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(())
            }
        }
    }

    fn count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

/// Spread the words of `text` evenly over `duration_ms`, each word taking 80% of its slot
pub fn evenly_spaced_words(text: &str, duration_ms: u64) -> Vec<Word> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let slot = duration_ms / tokens.len() as u64;
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let start = i as u64 * slot;
            Word::new(*token, start, start + slot * 4 / 5)
        })
        .collect()
}

/// Mock script writer returning a fixed script
#[derive(Debug, Clone)]
pub struct MockScriptWriter {
    state: MockState,
    script: String,
}

impl MockScriptWriter {
    pub fn new(behavior: MockBehavior, script: impl Into<String>) -> Self {
        Self {
            state: MockState::new(behavior),
            script: script.into(),
        }
    }

    pub fn working(script: impl Into<String>) -> Self {
        Self::new(MockBehavior::Working, script)
    }

    pub fn request_count(&self) -> usize {
        self.state.count()
    }
}

#[async_trait]
impl ScriptWriter for MockScriptWriter {
    async fn generate_script(&self, _topic: &str, _target_duration_secs: u32) -> Result<String, ProviderError> {
        self.state.call().await?;
        Ok(self.script.clone())
    }
}

/// Mock narrator reporting a fixed audio duration without writing audio
#[derive(Debug, Clone)]
pub struct MockNarrator {
    state: MockState,
    duration_ms: u64,
}

impl MockNarrator {
    pub fn new(behavior: MockBehavior, duration_ms: u64) -> Self {
        Self {
            state: MockState::new(behavior),
            duration_ms,
        }
    }

    pub fn working(duration_ms: u64) -> Self {
        Self::new(MockBehavior::Working, duration_ms)
    }

    pub fn request_count(&self) -> usize {
        self.state.count()
    }
}

#[async_trait]
impl Narrator for MockNarrator {
    async fn synthesize(&self, _text: &str, _voice: &str, output_path: &Path) -> Result<NarrationAudio, ProviderError> {
        self.state.call().await?;
        Ok(NarrationAudio::new(output_path, self.duration_ms))
    }
}

/// Mock transcriber returning scripted words
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    state: MockState,
    words: Vec<Word>,
}

impl MockTranscriber {
    pub fn new(behavior: MockBehavior, words: Vec<Word>) -> Self {
        Self {
            state: MockState::new(behavior),
            words,
        }
    }

    pub fn working(words: Vec<Word>) -> Self {
        Self::new(MockBehavior::Working, words)
    }

    /// Transcript of `text` spoken evenly over `duration_ms`
    pub fn evenly_spaced(text: &str, duration_ms: u64) -> Self {
        Self::working(evenly_spaced_words(text, duration_ms))
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript, ProviderError> {
        self.state.call().await?;
        Transcript::from_words(self.words.clone())
    }
}

/// Mock query generator.
///
/// Scripted responses are keyed by segment text; unscripted segments get
/// their first `k` words, lowercased and stripped of punctuation.
#[derive(Debug, Clone)]
pub struct MockQueryGenerator {
    state: MockState,
    responses: HashMap<String, Vec<String>>,
}

impl MockQueryGenerator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: MockState::new(behavior),
            responses: HashMap::new(),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Script the phrases returned for a segment text
    pub fn with_response(mut self, segment_text: impl Into<String>, phrases: &[&str]) -> Self {
        self.responses.insert(
            segment_text.into(),
            phrases.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn request_count(&self) -> usize {
        self.state.count()
    }
}

#[async_trait]
impl QueryGenerator for MockQueryGenerator {
    async fn suggest_queries(&self, segment_text: &str, k: usize) -> Result<Vec<String>, ProviderError> {
        self.state.call().await?;
        if let Some(phrases) = self.responses.get(segment_text) {
            return Ok(phrases.clone());
        }
        Ok(segment_text
            .split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .take(k)
            .collect())
    }
}

/// Mock footage search backed by an in-memory catalogue
#[derive(Debug, Clone)]
pub struct MockFootageSearch {
    state: MockState,
    catalogue: HashMap<String, Vec<FootageCandidate>>,
    default_duration_ms: Option<u64>,
    phrase_failures: HashMap<String, ProviderError>,
    searched: Arc<Mutex<Vec<String>>>,
}

impl MockFootageSearch {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: MockState::new(behavior),
            catalogue: HashMap::new(),
            default_duration_ms: None,
            phrase_failures: HashMap::new(),
            searched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Empty catalogue: every search returns no candidates
    pub fn empty() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Every phrase not in the catalogue returns one clip of `duration_ms`
    pub fn with_default_duration(duration_ms: u64) -> Self {
        let mut search = Self::empty();
        search.default_duration_ms = Some(duration_ms);
        search
    }

    /// Register candidates for a phrase
    pub fn with_clips(mut self, phrase: impl Into<String>, durations_ms: &[u64]) -> Self {
        let phrase = phrase.into();
        let candidates = durations_ms
            .iter()
            .enumerate()
            .map(|(i, d)| FootageCandidate::new(format!("{}-{}.mp4", phrase.replace(' ', "_"), i), *d))
            .collect();
        self.catalogue.insert(phrase, candidates);
        self
    }

    /// Register explicit candidates for a phrase, e.g. clips shared between phrases
    pub fn with_candidates(mut self, phrase: impl Into<String>, candidates: Vec<FootageCandidate>) -> Self {
        self.catalogue.insert(phrase.into(), candidates);
        self
    }

    /// Make searches for one phrase fail with `error`
    pub fn with_failure(mut self, phrase: impl Into<String>, error: ProviderError) -> Self {
        self.phrase_failures.insert(phrase.into(), error);
        self
    }

    /// Phrases searched so far, in call order
    pub fn searched_phrases(&self) -> Vec<String> {
        self.searched.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.state.count()
    }
}

#[async_trait]
impl FootageSearch for MockFootageSearch {
    async fn search(&self, phrase: &str) -> Result<Vec<FootageCandidate>, ProviderError> {
        if let Ok(mut searched) = self.searched.lock() {
            searched.push(phrase.to_string());
        }
        self.state.call().await?;

        if let Some(error) = self.phrase_failures.get(phrase) {
            return Err(error.clone());
        }
        if let Some(candidates) = self.catalogue.get(phrase) {
            return Ok(candidates.clone());
        }
        Ok(self
            .default_duration_ms
            .map(|d| vec![FootageCandidate::new(format!("{}.mp4", phrase.replace(' ', "_")), d)])
            .unwrap_or_default())
    }
}

/// Mock renderer remembering the last plan it was given
#[derive(Debug, Clone)]
pub struct MockRenderer {
    state: MockState,
    rendered: Arc<Mutex<Option<RenderPlan>>>,
}

impl MockRenderer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: MockState::new(behavior),
            rendered: Arc::new(Mutex::new(None)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn last_plan(&self) -> Option<RenderPlan> {
        self.rendered.lock().ok().and_then(|plan| plan.clone())
    }

    pub fn request_count(&self) -> usize {
        self.state.count()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, plan: &RenderPlan, _output_path: &Path) -> Result<(), ProviderError> {
        self.state.call().await?;
        if let Ok(mut rendered) = self.rendered.lock() {
            *rendered = Some(plan.clone());
        }
        Ok(())
    }
}
