/*!
 * Error types for the storyforge application.
 *
 * This module contains custom error types for the collaborators and for the
 * pipeline stages, using the thiserror crate for ergonomic error definitions.
 * Every pipeline error is attributable to exactly one [`Stage`].
 */

use std::fmt;

use thiserror::Error;

/// Errors that can occur when working with collaborator APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// A local tool (ffmpeg, ffprobe) or file operation failed
    #[error("Process error: {0}")]
    ProcessFailed(String),
}

impl ProviderError {
    /// Classify an unsuccessful HTTP status into the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Network failures, rate limiting and server-side errors are transient;
    /// authentication problems, malformed responses and other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) | Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::ParseError(_) | Self::AuthenticationError(_) | Self::ProcessFailed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::ParseError(error.to_string())
        } else if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// The named stages of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ScriptGeneration,
    Narration,
    Transcription,
    SegmentTimer,
    QueryPlanner,
    FootageResolver,
    TimelineComposer,
    Render,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 8] = [
        Stage::ScriptGeneration,
        Stage::Narration,
        Stage::Transcription,
        Stage::SegmentTimer,
        Stage::QueryPlanner,
        Stage::FootageResolver,
        Stage::TimelineComposer,
        Stage::Render,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ScriptGeneration => "Script Generation",
            Self::Narration => "Narration",
            Self::Transcription => "Transcription",
            Self::SegmentTimer => "Segment Timer",
            Self::QueryPlanner => "Query Planner",
            Self::FootageResolver => "Footage Resolver",
            Self::TimelineComposer => "Timeline Composer",
            Self::Render => "Render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Errors raised by the pipeline stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The transcript has no words to build captions from
    #[error("transcript contains no words")]
    EmptyTranscript,

    /// Search phrase generation failed after its retry budget
    #[error("query planning failed: {0}")]
    Planning(#[source] ProviderError),

    /// No usable clip could be found, or footage search failed terminally
    #[error("footage resolution failed: {0}")]
    Resolution(String),

    /// The assembled timeline violates a timing invariant
    #[error("render plan assembly failed: {0}")]
    PlanAssembly(String),

    /// A generation collaborator (script, narration, transcription) failed
    #[error("{stage} failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    /// The render collaborator failed
    #[error("render failed: {0}")]
    Render(#[source] ProviderError),
}

impl PipelineError {
    /// The stage this error originates from
    pub fn stage(&self) -> Stage {
        match self {
            Self::EmptyTranscript => Stage::SegmentTimer,
            Self::Planning(_) => Stage::QueryPlanner,
            Self::Resolution(_) => Stage::FootageResolver,
            Self::PlanAssembly(_) => Stage::TimelineComposer,
            Self::Generation { stage, .. } => *stage,
            Self::Render(_) => Stage::Render,
        }
    }

    /// Stable name of the error kind, as reported to the user
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyTranscript => "EmptyTranscriptError",
            Self::Planning(_) => "PlanningError",
            Self::Resolution(_) => "ResolutionError",
            Self::PlanAssembly(_) => "PlanAssemblyError",
            Self::Generation { .. } => "GenerationError",
            Self::Render(_) => "RenderError",
        }
    }
}

/// A failed pipeline run: exactly one failing stage and its error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("stage '{stage}' failed with {}: {error}", .error.kind())]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

impl From<PipelineError> for StageFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            stage: error.stage(),
            error,
        }
    }
}
