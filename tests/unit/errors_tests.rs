/*!
 * Tests for error classification and the retry policy
 */

use storyforge::errors::{PipelineError, ProviderError, Stage, StageFailure};
use storyforge::providers::mock::{MockBehavior, MockScriptWriter};
use storyforge::providers::ScriptWriter;
use storyforge::retry::RetryPolicy;

#[test]
fn test_stageFailure_fromEveryError_shouldReportOwnStage() {
    let cases = vec![
        (PipelineError::EmptyTranscript, Stage::SegmentTimer),
        (
            PipelineError::Planning(ProviderError::ParseError("no phrases".into())),
            Stage::QueryPlanner,
        ),
        (PipelineError::Resolution("nothing usable".into()), Stage::FootageResolver),
        (PipelineError::PlanAssembly("gap".into()), Stage::TimelineComposer),
        (
            PipelineError::Render(ProviderError::ProcessFailed("ffmpeg exited 1".into())),
            Stage::Render,
        ),
    ];

    for (error, stage) in cases {
        let failure = StageFailure::from(error);
        assert_eq!(failure.stage, stage);
    }
}

#[test]
fn test_backoffFor_shouldDoubleUpToCap() {
    let mut policy = RetryPolicy::new(5, 100);
    policy.max_backoff_ms = 350;

    assert_eq!(policy.backoff_for(1).as_millis(), 100);
    assert_eq!(policy.backoff_for(2).as_millis(), 200);
    assert_eq!(policy.backoff_for(3).as_millis(), 350);
}

#[tokio::test]
async fn test_run_withIntermittentFailures_shouldRetryUntilSuccess() {
    let writer = MockScriptWriter::new(MockBehavior::Intermittent { fail_every: 1 }, "never");
    let mut policy = RetryPolicy::new(2, 1);
    policy.jitter = false;

    let result = policy
        .run("Script Generation", || writer.generate_script("rain", 30))
        .await;

    // fail_every 1 fails every call: one attempt plus two retries
    assert!(matches!(result, Err(ProviderError::ApiError { status_code: 503, .. })));
    assert_eq!(writer.request_count(), 3);
}

#[tokio::test]
async fn test_run_withAuthenticationError_shouldNotRetry() {
    let writer = MockScriptWriter::new(MockBehavior::Unauthorized, "never");
    let mut policy = RetryPolicy::new(3, 1);
    policy.jitter = false;

    let result = policy
        .run("Script Generation", || writer.generate_script("rain", 30))
        .await;

    assert!(matches!(result, Err(ProviderError::AuthenticationError(_))));
    assert_eq!(writer.request_count(), 1);
}

#[tokio::test]
async fn test_run_withEveryOtherCallFailing_shouldSucceedOnRetry() {
    let writer = MockScriptWriter::new(MockBehavior::Intermittent { fail_every: 2 }, "A quiet tale.");
    let mut policy = RetryPolicy::new(1, 1);
    policy.jitter = false;

    let first = policy.run("Script Generation", || writer.generate_script("rain", 30)).await;
    let second = policy.run("Script Generation", || writer.generate_script("rain", 30)).await;

    assert_eq!(first.unwrap(), "A quiet tale.");
    // The second run's first call is the failing one, its retry succeeds
    assert_eq!(second.unwrap(), "A quiet tale.");
    assert_eq!(writer.request_count(), 3);
}
