/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::fs;

use storyforge::app_config::{Config, LlmProvider, LogLevel, Orientation};
use storyforge::timeline::WindowLimit;
use crate::common;

/// Test default configuration values
#[test]
fn test_defaultConfig_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.llm.provider, LlmProvider::Groq);
    assert_eq!(config.llm.get_model(), "llama3-70b-8192");
    assert_eq!(config.llm.get_endpoint(), "https://api.groq.com/openai/v1");
    assert_eq!(config.llm.common.target_duration_secs, 60);
    assert_eq!(config.llm.common.phrases_per_segment, 3);
    assert_eq!(config.narration.voice, "onyx");
    assert_eq!(config.transcription.model, "whisper-large-v3");
    assert_eq!(config.footage.fallback_query.as_deref(), Some("cinematic landscape"));
    assert_eq!(config.render.orientation, Orientation::Portrait);
    assert_eq!(config.render.output_file, "rendered_video.mp4");
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_timingLimits_withDefaults_shouldUseDurationWindows() {
    let config = Config::default();

    assert_eq!(
        config.timing.caption_limit(),
        WindowLimit::MaxDuration { max_ms: 6_000, max_words: 15 }
    );
    assert!(matches!(
        config.timing.segment_limit(),
        WindowLimit::MaxDuration { max_ms: 8_000, .. }
    ));
}

#[test]
fn test_renderConfig_withLandscape_shouldSwapDimensionsAndFont() {
    let mut config = Config::default();
    config.render.orientation = Orientation::Landscape;

    assert_eq!(config.render.orientation.dimensions(), (1920, 1080));
    assert_eq!(config.render.font_size(), 80);

    config.render.font_size = Some(42);
    assert_eq!(config.render.font_size(), 42);
}

#[test]
fn test_frameMs_shouldRoundUp() {
    let config = Config::default();
    assert_eq!(config.render.frame_ms(), 34);
}

/// Test configuration validation
#[test]
fn test_validate_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = common::test_config();
    assert!(config.validate().is_ok());

    config.footage.min_usable_fraction = 0.0;
    assert!(config.validate().is_err());
    config.footage.min_usable_fraction = 0.5;

    config.llm.common.phrases_per_segment = 0;
    assert!(config.validate().is_err());
    config.llm.common.phrases_per_segment = 3;

    config.timing.segment_target_count = Some(0);
    assert!(config.validate().is_err());
    config.timing.segment_target_count = Some(6);
    assert!(config.validate().is_ok());
    assert_eq!(config.timing.segment_limit(), WindowLimit::TargetCount(6));
}

#[test]
fn test_validate_withLmStudio_shouldNotRequireLlmKey() {
    let mut config = common::test_config();
    config.llm.provider = LlmProvider::LMStudio;
    for provider in config.llm.available_providers.iter_mut() {
        provider.api_key.clear();
    }

    assert!(config.validate().is_ok());
    assert_eq!(config.llm.get_endpoint(), "http://localhost:1234/v1");
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefault() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");
    let path_str = path.to_string_lossy().to_string();

    let config = Config::load_or_create(&path_str)?;

    assert!(path.exists());
    assert_eq!(config.timing.tolerance_ms, 50);
    let written: Config = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(written.render.fps, config.render.fps);
    Ok(())
}

#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");
    fs::write(
        &path,
        r#"{"llm": {"provider": "openai"}, "render": {"orientation": "landscape", "fps": 25}}"#,
    )?;

    let config = Config::load_or_create(&path.to_string_lossy())?;

    assert_eq!(config.llm.provider, LlmProvider::OpenAI);
    assert_eq!(config.render.orientation, Orientation::Landscape);
    assert_eq!(config.render.fps, 25);
    assert_eq!(config.render.frame_ms(), 40);
    assert_eq!(config.timing.max_residual_ms, 1_500);
    Ok(())
}

#[test]
fn test_loadOrCreate_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");
    fs::write(&path, "{ not json")?;

    assert!(Config::load_or_create(&path.to_string_lossy()).is_err());
    Ok(())
}
