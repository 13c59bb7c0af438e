//! Integration tests for supervised engine runs

mod common;

use std::time::Duration;

use tokio_stream::StreamExt;

use common::{progress_lines, supervisor, supervisor_with_grace, video, within, FakeEngine, FakeFs, Script};
use vidpress_cli::domain::errors::ErrorKind;
use vidpress_cli::domain::model::{CompressionConfig, Outcome};
use vidpress_cli::ports::EngineSignal;

fn failure_kind(outcome: &Outcome) -> Option<ErrorKind> {
    match outcome {
        Outcome::Failed { error } => Some(error.kind()),
        _ => None,
    }
}

#[tokio::test]
async fn test_successful_run_reports_progress_and_size() {
    let engine = FakeEngine::new(Script::success().with_lines(progress_lines(10, 4)));
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let file = video("a.mp4");

    let handle = supervisor.start(&file, &CompressionConfig::default()).await.unwrap();
    let values: Vec<f64> = within(supervisor.progress(&handle).collect()).await;
    let outcome = within(supervisor.await_termination(&handle)).await;

    assert_eq!(outcome, Outcome::Completed { compressed_size: 400 });
    assert!(values.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", values);
    assert_eq!(values.last().copied(), Some(1.0));
    assert!(handle.has_exited());
    assert_eq!(handle.file_id(), file.id());
}

#[tokio::test]
async fn test_invocation_targets_source_and_output() {
    let engine = FakeEngine::new(Script::success());
    let supervisor = supervisor(engine.clone(), FakeFs::default());

    let handle = supervisor.start(&video("clip.mov"), &CompressionConfig::default()).await.unwrap();
    within(handle.await_termination()).await;

    let invocations = engine.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(common::input_of(&invocations[0]), "/videos/clip.mov");
    let args = invocations[0].display_args();
    assert!(args.contains("-progress pipe:1"));
    assert!(args.ends_with("clip_compressed.mp4"));
    assert!(handle.output_path().ends_with("clip_compressed.mp4"));
}

#[tokio::test]
async fn test_exit_codes_map_to_error_kinds() {
    let cases = [
        (1, ErrorKind::CompressionFailed),
        (69, ErrorKind::CompressionFailed),
        (123, ErrorKind::CompressionFailed),
        (126, ErrorKind::PermissionDenied),
        (127, ErrorKind::EngineNotFound),
        (42, ErrorKind::Unknown),
        (255, ErrorKind::Unknown),
    ];

    for (code, kind) in cases {
        let engine = FakeEngine::new(Script::exit(code));
        let supervisor = supervisor(engine, FakeFs::default());
        let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

        let outcome = within(handle.await_termination()).await;
        assert_eq!(failure_kind(&outcome), Some(kind), "exit code {}", code);
        if let Outcome::Failed { error } = outcome {
            assert_eq!(error.exit_code(), Some(code));
        }
    }
}

#[tokio::test]
async fn test_diagnostics_refine_generic_failures() {
    let engine = FakeEngine::new(
        Script::exit(1).with_diagnostics("frame=  120 fps=30\nav_interleaved_write_frame(): No space left on device\n\n"),
    );
    let supervisor = supervisor(engine, FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    match within(handle.await_termination()).await {
        Outcome::Failed { error } => {
            assert_eq!(error.kind(), ErrorKind::InsufficientSpace);
            assert!(error.detail().unwrap().contains("No space left on device"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_or_missing_output_is_a_failure() {
    let fs = FakeFs {
        output_size: Some(0),
        ..FakeFs::default()
    };
    let supervisor = supervisor(FakeEngine::new(Script::success()), fs);
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();
    assert_eq!(failure_kind(&within(handle.await_termination()).await), Some(ErrorKind::CorruptedFile));

    let fs = FakeFs {
        output_size: None,
        ..FakeFs::default()
    };
    let supervisor = common::supervisor(FakeEngine::new(Script::success()), fs);
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();
    assert_eq!(failure_kind(&within(handle.await_termination()).await), Some(ErrorKind::FileNotFound));
}

#[tokio::test]
async fn test_cancel_wins_over_failing_exit_code() {
    // The engine reacts to the stop request with a plain error exit
    let engine = FakeEngine::new(Script::hanging(Some(1)));
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    assert!(supervisor.cancel(&handle));
    assert!(handle.is_cancel_requested());
    assert_eq!(within(handle.await_termination()).await, Outcome::Cancelled);
    assert_eq!(engine.signals(), vec![EngineSignal::Terminate]);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let engine = FakeEngine::new(Script::hanging(Some(255)));
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert!(!handle.clone().cancel());

    assert_eq!(within(handle.await_termination()).await, Outcome::Cancelled);
    assert_eq!(engine.signals(), vec![EngineSignal::Terminate]);
}

#[tokio::test]
async fn test_cancel_after_outcome_changes_nothing() {
    let engine = FakeEngine::new(Script::success());
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    let outcome = within(handle.await_termination()).await;
    assert_eq!(outcome, Outcome::Completed { compressed_size: 400 });

    assert!(!handle.cancel());
    assert!(!handle.is_cancel_requested());
    assert_eq!(handle.outcome(), Some(outcome.clone()));
    assert_eq!(within(handle.await_termination()).await, outcome);
    assert!(engine.signals().is_empty());
}

#[tokio::test]
async fn test_engine_ignoring_stop_is_killed_after_grace_period() {
    let engine = FakeEngine::new(Script::hanging(None));
    let supervisor = supervisor_with_grace(engine.clone(), FakeFs::default(), Duration::from_millis(50));
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    assert!(handle.cancel());
    assert_eq!(within(handle.await_termination()).await, Outcome::Cancelled);
    assert_eq!(engine.signals(), vec![EngineSignal::Terminate, EngineSignal::Kill]);
}

#[test]
fn test_cancel_outside_runtime_kills_without_grace_period() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let engine = FakeEngine::new(Script::hanging(None));
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let handle = runtime
        .block_on(supervisor.start(&video("a.mp4"), &CompressionConfig::default()))
        .unwrap();

    assert!(handle.cancel());
    assert_eq!(runtime.block_on(within(handle.await_termination())), Outcome::Cancelled);
    assert_eq!(engine.signals(), vec![EngineSignal::Terminate, EngineSignal::Kill]);
}

#[tokio::test]
async fn test_concurrent_waiters_share_one_outcome() {
    let engine = FakeEngine::new(
        Script::exit(1)
            .with_lines(progress_lines(10, 2))
            .with_line_delay(Duration::from_millis(10)),
    );
    let supervisor = supervisor(engine, FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    let other = handle.clone();
    let (first, second) = within(async { tokio::join!(handle.await_termination(), other.await_termination()) }).await;
    assert_eq!(first, second);
    assert_eq!(failure_kind(&first), Some(ErrorKind::CompressionFailed));
}

#[tokio::test]
async fn test_progress_stream_ends_before_outcome() {
    let engine = FakeEngine::new(
        Script::success()
            .with_lines(progress_lines(10, 5))
            .with_line_delay(Duration::from_millis(5)),
    );
    let supervisor = supervisor(engine, FakeFs::default());
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();

    let mut progress = handle.progress();
    while within(progress.next()).await.is_some() {}
    assert!(handle.has_exited());
    assert!(matches!(
        within(handle.await_termination()).await,
        Outcome::Completed { .. }
    ));
}

#[tokio::test]
async fn test_preflight_rejects_missing_source() {
    let engine = FakeEngine::new(Script::success());
    let fs = FakeFs {
        source_exists: false,
        ..FakeFs::default()
    };
    let supervisor = supervisor(engine.clone(), fs);

    let err = supervisor.start(&video("gone.mp4"), &CompressionConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert_eq!(engine.spawn_count(), 0);
}

#[tokio::test]
async fn test_preflight_checks_output_location() {
    let fs = FakeFs {
        free_space: Some(10),
        ..FakeFs::default()
    };
    let err = supervisor(FakeEngine::new(Script::success()), fs)
        .start(&video("a.mp4"), &CompressionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientSpace);

    let fs = FakeFs {
        mkdir_fails: true,
        ..FakeFs::default()
    };
    let err = supervisor(FakeEngine::new(Script::success()), fs)
        .start(&video("a.mp4"), &CompressionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputPathError);

    let fs = FakeFs {
        readable: false,
        ..FakeFs::default()
    };
    let err = supervisor(FakeEngine::new(Script::success()), fs)
        .start(&video("a.mp4"), &CompressionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_failed_space_query_does_not_block_start() {
    let fs = FakeFs {
        free_space: None,
        ..FakeFs::default()
    };
    let supervisor = supervisor(FakeEngine::new(Script::success()), fs);
    let handle = supervisor.start(&video("a.mp4"), &CompressionConfig::default()).await.unwrap();
    assert!(matches!(within(handle.await_termination()).await, Outcome::Completed { .. }));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_launch() {
    let engine = FakeEngine::new(Script::success());
    let supervisor = supervisor(engine.clone(), FakeFs::default());
    let config = CompressionConfig {
        quality: Some(50),
        ..CompressionConfig::default()
    };

    let err = supervisor.start(&video("a.mp4"), &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(engine.spawn_count(), 0);
}

#[tokio::test]
async fn test_output_in_source_directory_must_not_overwrite_source() {
    let config = CompressionConfig {
        output_suffix: String::new(),
        ..CompressionConfig::default()
    };
    let err = supervisor(FakeEngine::new(Script::success()), FakeFs::default())
        .start(&video("a.mp4"), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputPathError);
}
