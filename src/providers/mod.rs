/*!
 * Collaborator interfaces and their implementations.
 *
 * Every external capability the pipeline depends on is described by one
 * async trait, so stages can be driven by real services or by scripted mocks:
 * - `openai`: OpenAI-compatible chat, speech and transcription endpoints
 *   (Groq, OpenAI, LM Studio)
 * - `pexels`: stock video search
 * - `ffmpeg`: final encoding of a render plan
 * - `mock`: scripted collaborators for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

use crate::errors::ProviderError;
use crate::timeline::{FootageCandidate, NarrationAudio, RenderPlan, Transcript};

/// Writes the narration script for a topic
#[async_trait]
pub trait ScriptWriter: Send + Sync + Debug {
    /// Generate a story script sized for roughly `target_duration_secs` of narration
    async fn generate_script(
        &self,
        topic: &str,
        target_duration_secs: u32,
    ) -> Result<String, ProviderError>;
}

/// Turns text into narration audio
#[async_trait]
pub trait Narrator: Send + Sync + Debug {
    /// Synthesize `text` with `voice`, writing the audio to `output_path`
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output_path: &Path,
    ) -> Result<NarrationAudio, ProviderError>;
}

/// Produces word-level timestamps for narration audio
#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, ProviderError>;
}

/// Suggests visual search phrases for a piece of story text
#[async_trait]
pub trait QueryGenerator: Send + Sync + Debug {
    /// Return up to `k` phrases, best first
    async fn suggest_queries(&self, segment_text: &str, k: usize)
        -> Result<Vec<String>, ProviderError>;
}

/// Stock footage search
#[async_trait]
pub trait FootageSearch: Send + Sync + Debug {
    async fn search(&self, phrase: &str) -> Result<Vec<FootageCandidate>, ProviderError>;
}

/// Encodes a validated render plan into the output video
#[async_trait]
pub trait Renderer: Send + Sync + Debug {
    async fn render(&self, plan: &RenderPlan, output_path: &Path) -> Result<(), ProviderError>;
}

pub mod ffmpeg;
pub mod mock;
pub mod openai;
pub mod pexels;
