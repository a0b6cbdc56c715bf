/*!
 * Pipeline orchestrator.
 *
 * Runs the stages of a story video in a fixed order: script, narration,
 * transcription, segment timing, query planning, footage resolution,
 * composition and render. The first failing stage stops the run and is
 * reported together with its error kind.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::app_config::Config;
use crate::errors::{PipelineError, ProviderError, Stage, StageFailure};
use crate::providers::{FootageSearch, Narrator, QueryGenerator, Renderer, ScriptWriter, Transcriber};
use crate::retry::RetryPolicy;
use crate::timeline::{
    CaptionWindow, ComposerSettings, FitMode, FootageResolver, NarrationAudio, QueryPlanner, RenderPlan,
    ResolvedClip, SearchQuery, Segment, SegmentTimer, TimelineComposer, Transcript, WindowLimit,
};

/// The external capabilities a run depends on
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub script_writer: Arc<dyn ScriptWriter>,
    pub narrator: Arc<dyn Narrator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub query_generator: Arc<dyn QueryGenerator>,
    pub footage_search: Arc<dyn FootageSearch>,
    pub renderer: Arc<dyn Renderer>,
}

/// Run parameters derived from the configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_duration_secs: u32,
    pub voice: String,
    pub audio_path: PathBuf,
    pub caption_limit: WindowLimit,
    pub segment_limit: WindowLimit,
    pub phrases_per_segment: usize,
    pub max_concurrent_requests: usize,
    pub min_usable_fraction: f64,
    pub fallback_query: Option<String>,
    pub composer: ComposerSettings,
    pub retry: RetryPolicy,
    /// Write the validated plan as JSON here before rendering
    pub dump_plan: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_duration_secs: config.llm.common.target_duration_secs,
            voice: config.narration.voice.clone(),
            audio_path: PathBuf::from(&config.narration.audio_file),
            caption_limit: config.timing.caption_limit(),
            segment_limit: config.timing.segment_limit(),
            phrases_per_segment: config.llm.common.phrases_per_segment,
            max_concurrent_requests: config.footage.max_concurrent_requests,
            min_usable_fraction: config.footage.min_usable_fraction,
            fallback_query: config.footage.fallback_query.clone(),
            composer: ComposerSettings::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
            dump_plan: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub topic: String,
    pub script: String,
    pub narration: NarrationAudio,
    pub transcript: Transcript,
    pub captions: Vec<CaptionWindow>,
    pub segments: Vec<Segment>,
    pub queries: Vec<SearchQuery>,
    pub clips: Vec<ResolvedClip>,
    pub plan: RenderPlan,
    pub output_path: PathBuf,
}

/// Aggregate numbers logged at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub segments: usize,
    pub captions: usize,
    pub trimmed: usize,
    pub looped: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_plan(plan: &RenderPlan) -> Self {
        let looped = plan
            .clips()
            .filter(|c| matches!(c.fit, FitMode::Loop { .. }))
            .count();
        Self {
            segments: plan.entries.len(),
            captions: plan.captions().filter(|c| !c.words.is_empty()).count(),
            trimmed: plan.entries.len() - looped,
            looped,
            duration_ms: plan.duration_ms(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segments, {} captions, {} clips trimmed, {} looped, {:.1}s total",
            self.segments,
            self.captions,
            self.trimmed,
            self.looped,
            self.duration_ms as f64 / 1000.0
        )
    }
}

type StageObserver = Arc<dyn Fn(Stage) + Send + Sync>;

/// Story video pipeline
#[derive(Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
    on_stage: Option<StageObserver>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("collaborators", &self.collaborators)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
            on_stage: None,
        }
    }

    /// Be notified whenever a stage starts
    pub fn with_stage_observer(mut self, observer: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        self.on_stage = Some(Arc::new(observer));
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn enter(&self, stage: Stage) {
        debug!("Entering stage: {}", stage);
        if let Some(observer) = &self.on_stage {
            observer(stage);
        }
    }

    async fn generate<T, F, Fut>(&self, stage: Stage, call: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        self.settings
            .retry
            .run(stage.display_name(), call)
            .await
            .map_err(|source| PipelineError::Generation { stage, source })
    }

    /// Produce a story video about `topic` at `output_path`
    pub async fn run(&self, topic: &str, output_path: &Path) -> Result<RunArtifacts, StageFailure> {
        let started = Instant::now();
        let c = &self.collaborators;
        let s = &self.settings;

        self.enter(Stage::ScriptGeneration);
        let script = self
            .generate(Stage::ScriptGeneration, || {
                c.script_writer.generate_script(topic, s.target_duration_secs)
            })
            .await?;
        let script = script.trim().to_string();
        if script.is_empty() {
            return Err(generation_failed(Stage::ScriptGeneration, "script is empty").into());
        }
        info!("Script ready ({} words)", script.split_whitespace().count());

        self.enter(Stage::Narration);
        let narration = self
            .generate(Stage::Narration, || {
                c.narrator.synthesize(&script, &s.voice, &s.audio_path)
            })
            .await?;
        if narration.duration_ms == 0 {
            return Err(generation_failed(Stage::Narration, "narration audio has no duration").into());
        }
        info!(
            "Narration ready: {} ({:.1}s)",
            narration.path.display(),
            narration.duration_ms as f64 / 1000.0
        );

        self.enter(Stage::Transcription);
        let transcript = self
            .generate(Stage::Transcription, || c.transcriber.transcribe(&narration.path))
            .await?;
        info!("Transcript ready ({} words)", transcript.len());

        self.enter(Stage::SegmentTimer);
        let captions = SegmentTimer::new(s.caption_limit).build_windows(&transcript, narration.duration_ms)?;
        let segments = SegmentTimer::new(s.segment_limit).build_segments(&transcript, narration.duration_ms)?;
        info!("{} caption windows, {} segments", captions.len(), segments.len());

        self.enter(Stage::QueryPlanner);
        let queries = QueryPlanner::new(c.query_generator.clone(), s.retry.clone(), s.phrases_per_segment)
            .with_max_concurrent_requests(s.max_concurrent_requests)
            .with_fallback_query(s.fallback_query.clone())
            .plan(&segments)
            .await?;

        self.enter(Stage::FootageResolver);
        let clips = FootageResolver::new(c.footage_search.clone(), s.retry.clone())
            .with_min_usable_fraction(s.min_usable_fraction)
            .with_fallback_query(s.fallback_query.clone())
            .with_frame_ms(s.composer.frame_ms)
            .with_max_concurrent_requests(s.max_concurrent_requests)
            .resolve_all(&queries, &segments)
            .await?;

        self.enter(Stage::TimelineComposer);
        let plan = TimelineComposer::new(s.composer).compose(&segments, &captions, &clips, &narration)?;
        if let Some(path) = &s.dump_plan {
            dump_plan(&plan, path).await;
        }

        self.enter(Stage::Render);
        s.retry
            .run("Render", || c.renderer.render(&plan, output_path))
            .await
            .map_err(PipelineError::Render)?;

        let summary = RunSummary::from_plan(&plan);
        info!(
            "Rendered {} in {:.1}s: {}",
            output_path.display(),
            started.elapsed().as_secs_f64(),
            summary
        );

        Ok(RunArtifacts {
            topic: topic.to_string(),
            script,
            narration,
            transcript,
            captions,
            segments,
            queries,
            clips,
            plan,
            output_path: output_path.to_path_buf(),
        })
    }
}

fn generation_failed(stage: Stage, message: &str) -> PipelineError {
    PipelineError::Generation {
        stage,
        source: ProviderError::ParseError(message.to_string()),
    }
}

async fn dump_plan(plan: &RenderPlan, path: &Path) {
    let json = match serde_json::to_string_pretty(plan) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize render plan: {}", e);
            return;
        }
    };
    match tokio::fs::write(path, json).await {
        Ok(()) => info!("Render plan written to {}", path.display()),
        Err(e) => warn!("Failed to write render plan to {}: {}", path.display(), e),
    }
}
