/*!
 * Common test utilities for the storyforge test suite
 */

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use storyforge::app_config::Config;
use storyforge::pipeline::Collaborators;
use storyforge::providers::mock::{
    MockFootageSearch, MockNarrator, MockQueryGenerator, MockRenderer, MockScriptWriter, MockTranscriber,
};
use storyforge::timeline::{NarrationAudio, Transcript, Word};

/// Four sentences, nineteen words
pub const SAMPLE_SCRIPT: &str = "The lighthouse keeper woke at dawn. Waves crashed below. \
                                 He climbed the stairs slowly. The lamp was still warm.";

/// Narration length used with [`SAMPLE_SCRIPT`]
pub const SAMPLE_NARRATION_MS: u64 = 16_000;

/// Initialize logging once for tests that want log output
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// A configuration that passes validation without environment variables
pub fn test_config() -> Config {
    let mut config = Config::default();
    for provider in config.llm.available_providers.iter_mut() {
        provider.api_key = "test-llm-key".to_string();
    }
    config.narration.api_key = "test-speech-key".to_string();
    config.transcription.api_key = "test-transcription-key".to_string();
    config.footage.api_key = "test-pexels-key".to_string();
    config
}

/// Build words from `(text, start_ms, end_ms)` triples
pub fn words(timings: &[(&str, u64, u64)]) -> Vec<Word> {
    timings.iter()
        .map(|(text, start, end)| Word::new(*text, *start, *end))
        .collect()
}

pub fn transcript(timings: &[(&str, u64, u64)]) -> Transcript {
    Transcript::from_words(words(timings)).expect("valid test transcript")
}

pub fn narration(duration_ms: u64) -> NarrationAudio {
    NarrationAudio::new("story_audio.mp3", duration_ms)
}

/// Working mock collaborators narrating [`SAMPLE_SCRIPT`]
pub fn mock_collaborators(search: MockFootageSearch, renderer: MockRenderer) -> Collaborators {
    Collaborators {
        script_writer: Arc::new(MockScriptWriter::working(SAMPLE_SCRIPT)),
        narrator: Arc::new(MockNarrator::working(SAMPLE_NARRATION_MS)),
        transcriber: Arc::new(MockTranscriber::evenly_spaced(SAMPLE_SCRIPT, SAMPLE_NARRATION_MS)),
        query_generator: Arc::new(MockQueryGenerator::working()),
        footage_search: Arc::new(search),
        renderer: Arc::new(renderer),
    }
}
