mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use qcrbox_core::error::{RemoteError, WorkflowError};
use qcrbox_core::catalog::ParameterSpec;
use qcrbox_core::host::{Checkpoint, FileChoice, NotifyKind};
use qcrbox_core::status::JobStatus;
use qcrbox_core::tsc::TscbFile;
use qcrbox_core::types::JobId;
use qcrbox_workflow::{
    run, RunOptions, WorkflowController, WorkflowEvent, WorkflowOutcome, WorkflowState,
};

use common::*;

fn options(config: &qcrbox_workflow::WorkflowConfig) -> RunOptions {
    RunOptions::from_config(config)
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unattended_refinement_runs_to_done() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(&dir.path().join("results"));

    let remote = Arc::new(
        FakeRemote::new()
            .with_statuses(vec![
                Ok(JobStatus::Queued),
                Ok(JobStatus::Running),
                Ok(JobStatus::Succeeded),
            ])
            .with_result("structure.cif", ASPHERIC_CIF.as_bytes()),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let host = Arc::new(FakeHost::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .host(host.clone())
            .parameter("cif", input.display().to_string())
            .build();

    run(&mut controller, options(&config)).await.unwrap();

    assert_eq!(controller.state(), WorkflowState::Done);
    assert_eq!(remote.count("upload:"), 1);
    assert_eq!(remote.count("submit:"), 1);
    assert_eq!(remote.count("status:"), 3);

    let args = &remote.submitted_arguments()[0];
    assert_eq!(args["cif"], json!({ "data_file_id": "file-1" }));
    assert_eq!(args["iterations"], json!(10));

    let job = controller.job().unwrap();
    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(job.manifest().unwrap().len(), 1);

    let Some(WorkflowOutcome::Completed(results)) = controller.outcome() else {
        panic!("expected completed outcome, got {:?}", controller.outcome());
    };
    assert_eq!(results.files.len(), 1);
    assert_eq!(results.companions.len(), 1);
    assert!(results.companion_failures.is_empty());

    let saved = std::fs::read_to_string(&results.files[0]).unwrap();
    assert!(saved.contains("_aspheric_ffs_source"));
    assert!(!saved.contains("_aspheric_ffs.source"));

    let companion = &results.companions[0];
    assert_eq!(companion.file_name().unwrap(), "structure.tscb");
    let tsc = TscbFile::from_bytes(&std::fs::read(companion).unwrap()).unwrap();
    assert_eq!(tsc.scatterers, vec!["C1", "O1"]);
    assert_eq!(tsc.reflections.len(), 2);

    assert_eq!(host.opened(), vec![results.files[0].clone()]);
    assert_eq!(notifier.kinds(), vec![NotifyKind::Info, NotifyKind::Info]);

    let job_transitions: Vec<(JobStatus, JobStatus)> = controller
        .history()
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::JobStatusChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        job_transitions,
        vec![
            (JobStatus::Queued, JobStatus::Running),
            (JobStatus::Running, JobStatus::Succeeded),
        ]
    );
}

#[tokio::test]
async fn declined_upload_makes_no_remote_calls() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let user = Arc::new(ScriptedUser {
        accept_upload: false,
        ..ScriptedUser::accepting()
    });

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .interactive(user.clone())
            .parameter("cif", input.display().to_string())
            .build();

    assert_matches!(controller.advance().await, Err(WorkflowError::UserCancelled));
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert!(remote.calls().is_empty());
    assert_matches!(
        user.checkpoints().as_slice(),
        [Checkpoint::BeforeUpload { files, .. }] if files == &vec![input.clone()]
    );
    assert_eq!(notifier.kinds(), vec![NotifyKind::Warning]);
    assert_matches!(
        controller.outcome(),
        Some(WorkflowOutcome::Aborted { kind: "user_cancelled", .. })
    );
}

#[tokio::test]
async fn rejected_submission_aborts_without_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(dir.path());
    let remote = Arc::new(FakeRemote::new().with_submissions(vec![Err(RemoteError::Rejected {
        code: 422,
        message: "unknown argument 'iterations'".into(),
    })]));
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();

    let err = run(&mut controller, options(&config)).await.unwrap_err();
    assert_matches!(
        err,
        WorkflowError::Submission { transient: false, ref payload, .. } if payload.contains("unknown argument")
    );
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert!(controller.job().is_none());
    assert_eq!(remote.count("upload:"), 1);
    assert_eq!(remote.count("submit:"), 1);
    assert_eq!(remote.count("status:"), 0);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, NotifyKind::Error);
    assert!(messages[0].0.contains("refine(olex2)"));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_required_parameter_aborts_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .build();

    assert_matches!(
        controller.advance().await,
        Err(WorkflowError::MissingParameter { name }) if name == "cif"
    );
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert!(remote.calls().is_empty());
    assert_eq!(notifier.kinds(), vec![NotifyKind::Error]);
}

#[tokio::test]
async fn invalid_value_in_interactive_mode_returns_to_configuring() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let user = Arc::new(ScriptedUser::accepting());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .interactive(user.clone())
            .parameter("cif", input.display().to_string())
            .parameter("iterations", "ten")
            .build();

    assert_matches!(
        controller.advance().await,
        Err(WorkflowError::InvalidParameter { name, .. }) if name == "iterations"
    );
    assert_eq!(controller.state(), WorkflowState::Configuring);
    assert_eq!(notifier.kinds(), vec![NotifyKind::Warning]);

    // The rejected value is dropped and the default applies.
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Uploading);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn current_structure_fills_the_cif_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let structure = write_input(dir.path(), "loaded.cif");
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(FakeRemote::new().with_result("loaded.cif", b"data_out\n"));
    let notifier = Arc::new(RecordingNotifier::default());
    let host = Arc::new(FakeHost::with_structure(structure));

    let mut controller = WorkflowController::builder(refine_command(), remote.clone(), notifier)
        .config(config.clone())
        .host(host)
        .build();

    run(&mut controller, options(&config)).await.unwrap();
    assert_eq!(remote.calls()[0], "upload:loaded.cif");
}

// ---------------------------------------------------------------------------
// Submission and tracking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_submission_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = qcrbox_workflow::WorkflowConfig {
        submit_attempts: 3,
        ..test_config(&dir.path().join("results"))
    };
    let remote = Arc::new(
        FakeRemote::new()
            .with_submissions(vec![
                Err(RemoteError::Network("connection reset".into())),
                Ok(JobId::new("calc-7")),
            ])
            .with_result("out.cif", b"data_out\n"),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller = WorkflowController::builder(refine_command(), remote.clone(), notifier)
        .config(config.clone())
        .parameter("cif", input.display().to_string())
        .build();

    run(&mut controller, options(&config)).await.unwrap();
    assert_eq!(remote.count("upload:"), 1);
    assert_eq!(remote.count("submit:"), 2);
    assert_eq!(controller.job().unwrap().id().as_str(), "calc-7");
}

#[tokio::test]
async fn status_query_failure_keeps_job_state() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let remote = Arc::new(FakeRemote::new().with_statuses(vec![
        Err(RemoteError::Timeout(5)),
        Ok(JobStatus::Running),
    ]));
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .parameter("cif", input.display().to_string())
            .build();

    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Uploading);
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Submitted);

    assert_matches!(
        controller.advance().await,
        Err(WorkflowError::StatusQuery { .. })
    );
    assert_eq!(controller.state(), WorkflowState::Submitted);
    assert_eq!(controller.job().unwrap().status(), JobStatus::Queued);
    assert_eq!(notifier.kinds(), vec![NotifyKind::Info, NotifyKind::Warning]);

    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Tracking);
    assert_eq!(controller.job().unwrap().status(), JobStatus::Running);
}

#[tokio::test]
async fn declined_status_check_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let user = Arc::new(ScriptedUser {
        accept_status_check: false,
        ..ScriptedUser::accepting()
    });

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .interactive(user.clone())
            .parameter("cif", input.display().to_string())
            .build();

    controller.advance().await.unwrap();
    controller.advance().await.unwrap();
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Submitted);
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Submitted);

    assert_eq!(remote.count("status:"), 0);
    assert_matches!(
        user.checkpoints().last(),
        Some(Checkpoint::BeforeStatusCheck { last_status: JobStatus::Queued, .. })
    );
    assert_eq!(notifier.kinds(), vec![NotifyKind::Info]);
}

#[tokio::test]
async fn failed_job_aborts_and_is_not_queried_again() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(dir.path());
    let remote = Arc::new(
        FakeRemote::new().with_statuses(vec![Ok(JobStatus::Running), Ok(JobStatus::Failed)]),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();

    let err = run(&mut controller, options(&config)).await.unwrap_err();
    assert_matches!(
        err,
        WorkflowError::JobUnsuccessful { status: JobStatus::Failed, .. }
    );
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert_eq!(controller.job().unwrap().status(), JobStatus::Failed);

    let calls = remote.calls().len();
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Aborted);
    assert_eq!(remote.calls().len(), calls);
    assert_eq!(remote.count("results:"), 0);
    assert_eq!(notifier.kinds(), vec![NotifyKind::Info, NotifyKind::Error]);
}

#[tokio::test]
async fn tracking_gives_up_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = qcrbox_workflow::WorkflowConfig {
        tracking_timeout: Duration::from_millis(40),
        ..test_config(dir.path())
    };
    let remote = Arc::new(FakeRemote::new().with_statuses(vec![Ok(JobStatus::Running)]));
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();

    let err = run(&mut controller, options(&config)).await.unwrap_err();
    assert_matches!(
        err,
        WorkflowError::TrackingTimeout { status: JobStatus::Running, .. }
    );
    assert_eq!(controller.state(), WorkflowState::Aborted);
    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].0.contains("left running"));
}

#[tokio::test]
async fn cancel_stops_local_tracking() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let remote = Arc::new(FakeRemote::new().with_statuses(vec![Ok(JobStatus::Running)]));
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(test_config(dir.path()))
            .parameter("cif", input.display().to_string())
            .build();

    controller.advance().await.unwrap();
    controller.advance().await.unwrap();
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Tracking);

    assert!(controller.cancel());
    assert!(!controller.cancel());
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert!(controller.cancel_token().is_cancelled());

    let calls = remote.calls().len();
    assert_eq!(controller.advance().await.unwrap(), WorkflowState::Aborted);
    assert_eq!(remote.calls().len(), calls);
    assert_eq!(notifier.kinds(), vec![NotifyKind::Info, NotifyKind::Warning]);
}

#[tokio::test]
async fn stale_current_structure_is_replaced_by_a_chosen_file() {
    let dir = tempfile::tempdir().unwrap();
    let chosen = write_input(dir.path(), "chosen.cif");
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let host = Arc::new(FakeHost::with_structure(dir.path().join("closed.cif")));
    let user = Arc::new(ScriptedUser::accepting());
    user.files
        .lock()
        .unwrap()
        .push_back(FileChoice::Selected(chosen.clone()));

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .host(host)
            .interactive(user.clone())
            .build();

    tokio::time::timeout(Duration::from_secs(5), run(&mut controller, options(&config)))
        .await
        .expect("run finishes")
        .unwrap();

    assert_eq!(controller.state(), WorkflowState::Done);
    assert_eq!(remote.count("upload:chosen.cif"), 1);
    assert_matches!(
        user.checkpoints().first(),
        Some(Checkpoint::BeforeUpload { files, .. }) if files == &vec![chosen.clone()]
    );
    assert_eq!(notifier.kinds()[0], NotifyKind::Warning);
}

#[tokio::test]
async fn stale_current_structure_without_a_choice_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(FakeRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let host = Arc::new(FakeHost::with_structure(dir.path().join("closed.cif")));
    let user = Arc::new(ScriptedUser::accepting());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .host(host)
            .interactive(user)
            .build();

    let result =
        tokio::time::timeout(Duration::from_secs(5), run(&mut controller, options(&config)))
            .await
            .expect("run finishes");
    assert_matches!(result, Err(WorkflowError::UserCancelled));
    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert!(remote.calls().is_empty());
    assert_eq!(notifier.kinds(), vec![NotifyKind::Warning, NotifyKind::Warning]);
}

#[tokio::test]
async fn failed_upload_reuploads_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let cif = write_input(dir.path(), "input.cif");
    let hkl = write_input(dir.path(), "input.hkl");
    let config = test_config(&dir.path().join("results"));
    let command = refine_command().with_parameter(ParameterSpec::file("hkl").required());
    let remote = Arc::new(FakeRemote::new().with_failing_upload("input.hkl"));
    let notifier = Arc::new(RecordingNotifier::default());
    let user = Arc::new(ScriptedUser::accepting());
    user.files
        .lock()
        .unwrap()
        .push_back(FileChoice::Selected(hkl.clone()));

    let mut controller = WorkflowController::builder(command, remote.clone(), notifier.clone())
        .config(config.clone())
        .interactive(user.clone())
        .parameter("cif", cif.display().to_string())
        .parameter("hkl", hkl.display().to_string())
        .build();

    tokio::time::timeout(Duration::from_secs(5), run(&mut controller, options(&config)))
        .await
        .expect("run finishes")
        .unwrap();

    assert_eq!(remote.count("upload:input.cif"), 1);
    assert_eq!(remote.count("upload:input.hkl"), 2);
    assert_eq!(remote.count("submit:"), 1);
    let args = &remote.submitted_arguments()[0];
    assert_eq!(args["cif"], json!({ "data_file_id": "file-1" }));
    assert_eq!(args["hkl"], json!({ "data_file_id": "file-3" }));

    let uploads = user
        .checkpoints()
        .iter()
        .filter(|c| matches!(c, Checkpoint::BeforeUpload { .. }))
        .count();
    assert_eq!(uploads, 2);
    assert!(controller.history().iter().any(|e| matches!(
        e,
        WorkflowEvent::StepFailed { kind: "transfer_error", .. }
    )));
}

#[tokio::test]
async fn interactive_tracking_ignores_poll_limits() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = qcrbox_workflow::WorkflowConfig {
        poll_interval: Duration::from_secs(60),
        tracking_timeout: Duration::from_millis(1),
        ..test_config(&dir.path().join("results"))
    };
    let remote = Arc::new(FakeRemote::new().with_statuses(vec![
        Ok(JobStatus::Running),
        Ok(JobStatus::Running),
        Ok(JobStatus::Succeeded),
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let user = Arc::new(ScriptedUser::accepting());

    let mut controller = WorkflowController::builder(refine_command(), remote.clone(), notifier)
        .config(config.clone())
        .interactive(user.clone())
        .parameter("cif", input.display().to_string())
        .build();

    tokio::time::timeout(Duration::from_secs(5), run(&mut controller, options(&config)))
        .await
        .expect("run finishes")
        .unwrap();

    assert_eq!(controller.state(), WorkflowState::Done);
    assert_eq!(remote.count("status:"), 3);
    let checks = user
        .checkpoints()
        .iter()
        .filter(|c| matches!(c, Checkpoint::BeforeStatusCheck { .. }))
        .count();
    assert_eq!(checks, 3);
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_materialization_keeps_saved_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(
        FakeRemote::new()
            .with_result("a.cif", b"data_a\n")
            .with_failing_result("b.cif", RemoteError::Timeout(5)),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();

    let err = run(&mut controller, options(&config)).await.unwrap_err();
    let (failed_file, saved) = match err {
        WorkflowError::Materialization {
            failed_file, saved, ..
        } => (failed_file, saved),
        other => panic!("expected materialization error, got {other:?}"),
    };
    assert_eq!(failed_file, "b.cif");
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ends_with("a.cif"));
    assert!(saved[0].is_file());

    assert_eq!(controller.state(), WorkflowState::Aborted);
    assert_matches!(
        controller.outcome(),
        Some(WorkflowOutcome::Aborted { kind: "materialization_error", saved, .. }) if saved.len() == 1
    );
    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].1, NotifyKind::Error);
    assert!(messages[1].0.contains("a.cif"));
}

#[tokio::test]
async fn cancel_during_download_lists_files_already_saved() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(
        FakeRemote::new()
            .with_result("a.cif", b"data_a\n")
            .with_hanging_result("b.cif"),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();
    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let err = run(&mut controller, options(&config)).await.unwrap_err();
    assert_matches!(err, WorkflowError::UserCancelled);
    assert_eq!(remote.count("download:b.cif"), 1);

    let Some(WorkflowOutcome::Aborted { kind, saved, message }) = controller.outcome() else {
        panic!("expected an aborted outcome, got {:?}", controller.outcome());
    };
    assert_eq!(*kind, "user_cancelled");
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ends_with("a.cif"));
    assert!(saved[0].is_file());
    assert!(message.contains("saved:"));
    assert!(!message.contains("left running"));
}

#[tokio::test]
async fn companion_failure_does_not_fail_the_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(&dir.path().join("results"));
    // Three form factor values for two scatterers.
    let broken = ASPHERIC_CIF.replace("'[5.5 7.25]' '[0.0 0.5]'", "'[5.5]' '[0.0]'");
    let remote = Arc::new(FakeRemote::new().with_result("structure.cif", broken.as_bytes()));
    let notifier = Arc::new(RecordingNotifier::default());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .parameter("cif", input.display().to_string())
            .build();

    run(&mut controller, options(&config)).await.unwrap();

    let Some(WorkflowOutcome::Completed(results)) = controller.outcome() else {
        panic!("expected completed outcome");
    };
    assert_eq!(results.files.len(), 1);
    assert!(results.companions.is_empty());
    assert_eq!(results.companion_failures.len(), 1);
    assert_eq!(results.companion_failures[0].source_file, "structure.cif");
    assert!(controller
        .history()
        .iter()
        .any(|e| matches!(e, WorkflowEvent::CompanionFailed { .. })));

    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].1, NotifyKind::Warning);
    assert!(messages[1].0.contains("companion"));
}

#[tokio::test]
async fn host_open_failure_is_reported_with_done() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cif");
    let config = test_config(&dir.path().join("results"));
    let remote = Arc::new(FakeRemote::new().with_result("out.cif", b"data_out\n"));
    let notifier = Arc::new(RecordingNotifier::default());
    let host = Arc::new(FakeHost::failing_open());

    let mut controller =
        WorkflowController::builder(refine_command(), remote.clone(), notifier.clone())
            .config(config.clone())
            .host(host)
            .parameter("cif", input.display().to_string())
            .build();

    run(&mut controller, options(&config)).await.unwrap();
    assert_eq!(controller.state(), WorkflowState::Done);
    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].1, NotifyKind::Warning);
    assert!(messages[1].0.contains("viewer busy"));
}
