use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::errors::{Stage, StageFailure};
use crate::pipeline::{Collaborators, Pipeline, PipelineSettings, RunArtifacts};
use crate::providers::ffmpeg::FfmpegRenderer;
use crate::providers::openai::{
    ChatQueryGenerator, ChatScriptWriter, ChatSettings, OpenAICompatible, SpeechNarrator, WhisperTranscriber,
};
use crate::providers::pexels::PexelsSearch;

// @module: Application controller wiring configuration to the pipeline

/// Main application controller for story video generation
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the real collaborators described by the configuration
    pub fn build_collaborators(&self) -> Collaborators {
        let llm = &self.config.llm;
        let chat_client = OpenAICompatible::new(llm.get_api_key(), llm.get_endpoint(), llm.get_timeout_secs());

        let script_settings = ChatSettings {
            model: llm.get_model(),
            temperature: llm.common.script_temperature,
            max_tokens: llm.common.script_max_tokens,
        };
        let query_settings = ChatSettings {
            model: llm.get_model(),
            temperature: llm.common.query_temperature,
            max_tokens: llm.common.query_max_tokens,
        };

        let narration = &self.config.narration;
        let speech_client = OpenAICompatible::new(
            narration.resolved_api_key(),
            narration.endpoint.clone(),
            narration.timeout_secs,
        );

        let transcription = &self.config.transcription;
        let transcription_client = OpenAICompatible::new(
            transcription.resolved_api_key(),
            transcription.endpoint.clone(),
            transcription.timeout_secs,
        );

        Collaborators {
            script_writer: Arc::new(ChatScriptWriter::new(chat_client.clone(), script_settings)),
            narrator: Arc::new(SpeechNarrator::new(
                speech_client,
                narration.model.clone(),
                narration.ffprobe_path.clone(),
            )),
            transcriber: Arc::new(WhisperTranscriber::new(transcription_client, transcription.model.clone())),
            query_generator: Arc::new(ChatQueryGenerator::new(chat_client, query_settings)),
            footage_search: Arc::new(PexelsSearch::new(&self.config.footage, self.config.render.orientation)),
            renderer: Arc::new(FfmpegRenderer::new(&self.config.render)),
        }
    }

    /// Pipeline settings for a run writing to `output_path`
    pub fn pipeline_settings(&self, output_path: &Path, dump_plan: Option<PathBuf>) -> PipelineSettings {
        let mut settings = PipelineSettings::from_config(&self.config);
        settings.audio_path = audio_path_for(output_path, &self.config.narration.audio_file);
        settings.dump_plan = dump_plan;
        settings
    }

    /// Run the pipeline with the given collaborators, showing stage progress
    pub async fn run_with(
        &self,
        collaborators: Collaborators,
        topic: &str,
        output_path: &Path,
        dump_plan: Option<PathBuf>,
    ) -> Result<RunArtifacts, StageFailure> {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(120));

        let progress = spinner.clone();
        let pipeline = Pipeline::new(collaborators, self.pipeline_settings(output_path, dump_plan))
            .with_stage_observer(move |stage| progress.set_message(stage_message(stage)));

        info!("Creating a story about '{}'", topic);
        let started = Instant::now();
        let result = pipeline.run(topic, output_path).await;
        spinner.finish_and_clear();

        match &result {
            Ok(artifacts) => info!(
                "Success: {} ({})",
                artifacts.output_path.display(),
                Self::format_duration(started.elapsed())
            ),
            Err(failure) => error!("{}", failure),
        }
        result
    }

    /// Run the pipeline against the configured services
    pub async fn run(
        &self,
        topic: &str,
        output_path: &Path,
        dump_plan: Option<PathBuf>,
    ) -> Result<RunArtifacts, StageFailure> {
        self.run_with(self.build_collaborators(), topic, output_path, dump_plan)
            .await
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}

fn stage_message(stage: Stage) -> String {
    let position = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0) + 1;
    format!("{} ({}/{})", stage, position, Stage::ALL.len())
}

/// The narration file lives next to the output video
fn audio_path_for(output_path: &Path, audio_file: &str) -> PathBuf {
    match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(audio_file),
        _ => PathBuf::from(audio_file),
    }
}
