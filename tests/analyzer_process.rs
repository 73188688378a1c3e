#![cfg(unix)]

use a11y_relay::analyzer::{Analyzer, ProcessAnalyzer};
use a11y_relay::error::AnalyzerError;
use a11y_relay::report::{AnalyzeJob, Report, ReportStatus};
use a11y_relay::store::{MemoryStore, ReportStore};
use a11y_relay::worker::Worker;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ProcessAnalyzer {
    ProcessAnalyzer::command("sh", &["-c", script])
}

#[tokio::test]
async fn payload_goes_to_stdin() {
    let out = sh("cat").run(br#"{"url":"https://example.com"}"#).await.unwrap();
    assert_eq!(out.stdout, br#"{"url":"https://example.com"}"#);
    assert!(out.stderr.is_empty());
}

#[tokio::test]
async fn stderr_on_success_is_kept_apart() {
    let out = sh("cat; echo 'deprecated rule' >&2").run(b"{}").await.unwrap();
    assert_eq!(out.stdout, b"{}");
    assert_eq!(out.stderr, "deprecated rule");
}

#[tokio::test]
async fn non_zero_exit_is_an_error_with_diagnostics() {
    let err = sh("echo 'Invalid JSON input' >&2; exit 3")
        .run(b"{}")
        .await
        .unwrap_err();
    match &err {
        AnalyzerError::Exit { code, stderr } => {
            assert_eq!(*code, Some(3));
            assert_eq!(stderr, "Invalid JSON input");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.diagnostics(), Some("Invalid JSON input"));
    assert!(err.to_string().contains("exit status 3"));
}

#[tokio::test]
async fn slow_process_times_out() {
    let started = Instant::now();
    let err = sh("sleep 5")
        .with_timeout(Some(Duration::from_millis(200)))
        .run(b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::TimedOut(_)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let err = ProcessAnalyzer::command("/nonexistent/axe-runner", &[])
        .run(b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Spawn { .. }), "{err:?}");
}

#[tokio::test]
async fn doctor_reports_missing_runtime() {
    let diag = ProcessAnalyzer::command("/nonexistent/docker", &[])
        .doctor()
        .await;
    assert!(!diag.ok);
    assert!(diag.error.is_some());
    assert_eq!(diag.program, "/nonexistent/docker");
}

#[tokio::test]
async fn worker_drives_a_real_process() {
    let store = Arc::new(MemoryStore::new());
    let ok = store
        .create_report(Report::pending("alice", "https://example.com", ""))
        .await
        .unwrap();
    let bad = store
        .create_report(Report::pending("alice", "https://broken.example", ""))
        .await
        .unwrap();

    let analyzer = Arc::new(sh(
        r#"input=$(cat); case "$input" in *broken*) echo 'navigation failed' >&2; exit 1;; esac; echo '{"violations":[]}'"#,
    ));
    let worker = Worker::new(store.clone(), analyzer);
    worker.process_job(AnalyzeJob::for_report(&ok)).await;
    worker.process_job(AnalyzeJob::for_report(&bad)).await;

    let ok = store.load_report(ok.id).await.unwrap();
    assert_eq!(ok.status, ReportStatus::Complete);
    assert_eq!(ok.analysis_results, Some(json!({"violations": []})));

    let bad = store.load_report(bad.id).await.unwrap();
    assert_eq!(bad.status, ReportStatus::Failed);
    assert!(bad.error_message().unwrap().contains("navigation failed"));
}
