/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use std::path::PathBuf;

use storyforge::app_controller::Controller;
use storyforge::errors::Stage;
use storyforge::providers::mock::{MockFootageSearch, MockRenderer};
use crate::common;

/// Test the controller with custom configuration
#[test]
fn test_pipelineSettings_withCustomConfig_shouldFollowConfig() {
    let mut config = common::test_config();
    config.timing.segment_target_count = Some(5);
    config.render.fps = 25;
    config.footage.fallback_query = None;
    let controller = Controller::with_config(config);

    let settings = controller.pipeline_settings(&PathBuf::from("/tmp/videos/out.mp4"), None);

    assert_eq!(settings.audio_path, PathBuf::from("/tmp/videos/story_audio.mp3"));
    assert_eq!(settings.composer.frame_ms, 40);
    assert_eq!(settings.fallback_query, None);
    assert!(settings.dump_plan.is_none());
}

#[test]
fn test_buildCollaborators_withDefaultConfig_shouldNotPanic() {
    let controller = Controller::with_config(common::test_config());

    let collaborators = controller.build_collaborators();

    assert!(format!("{:?}", collaborators).contains("PexelsSearch"));
}

#[tokio::test]
async fn test_runWith_mockCollaborators_shouldReturnArtifacts() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output = temp_dir.path().join("story.mp4");
    let dump = temp_dir.path().join("plan.json");
    let mut config = common::test_config();
    config.retry.retry_count = 0;
    let controller = Controller::with_config(config);
    let renderer = MockRenderer::working();

    let artifacts = controller
        .run_with(
            common::mock_collaborators(MockFootageSearch::with_default_duration(6_000), renderer.clone()),
            "a lighthouse keeper",
            &output,
            Some(dump.clone()),
        )
        .await
        .unwrap();

    assert_eq!(artifacts.output_path, output);
    assert_eq!(artifacts.narration.path, temp_dir.path().join("story_audio.mp3"));
    assert_eq!(renderer.request_count(), 1);
    assert!(dump.exists());
    Ok(())
}

#[test]
fn test_runWith_noFootage_shouldReportResolverStage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = common::test_config();
    config.retry.retry_count = 0;
    config.footage.fallback_query = None;
    let controller = Controller::with_config(config);

    let result = tokio_test::block_on(async {
        controller
            .run_with(
                common::mock_collaborators(MockFootageSearch::empty(), MockRenderer::working()),
                "a lighthouse keeper",
                &temp_dir.path().join("story.mp4"),
                None,
            )
            .await
    });

    let failure = result.unwrap_err();
    assert_eq!(failure.stage, Stage::FootageResolver);
    assert_eq!(failure.error.kind(), "ResolutionError");
    Ok(())
}
