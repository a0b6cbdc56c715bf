/*!
 * # StoryForge - narrated story videos from a topic
 *
 * A Rust library that turns a single topic into a short narrated video with
 * stock footage and burned-in captions.
 *
 * ## Features
 *
 * - Story scripts from OpenAI-compatible chat models (Groq, OpenAI, LM Studio)
 * - Narration through a speech endpoint, word timestamps through a transcription endpoint
 * - Caption windows and footage segments derived from word timings
 * - Ranked stock footage search phrases per segment
 * - Clips trimmed or looped to exact segment durations
 * - A validated, gap-free render plan encoded with ffmpeg
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `timeline`: Timing model and the pure timeline stages:
 *   - `timeline::segment_timer`: Caption windows and segments
 *   - `timeline::query_planner`: Search phrases per segment
 *   - `timeline::footage_resolver`: Duration-fitted clips
 *   - `timeline::composer`: Render plan assembly and validation
 * - `pipeline`: Stage orchestration
 * - `retry`: Retry with exponential backoff
 * - `app_controller`: Main application controller
 * - `providers`: Collaborator traits and their implementations:
 *   - `providers::openai`: OpenAI-compatible chat, speech and transcription
 *   - `providers::pexels`: Pexels video search
 *   - `providers::ffmpeg`: ffmpeg rendering
 *   - `providers::mock`: Scripted collaborators for tests
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod timeline;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{PipelineError, ProviderError, Stage, StageFailure};
pub use pipeline::{Collaborators, Pipeline, PipelineSettings, RunArtifacts, RunSummary};
pub use retry::RetryPolicy;
pub use timeline::{RenderPlan, Segment, TimelineComposer};
