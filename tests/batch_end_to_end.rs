mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use auto_metadata::models::{BatchSummary, EmbedStatus};
use auto_metadata::orchestrator::ProgressCallback;
use auto_metadata::{BatchProcessor, StopSignal};
use common::{collaborators, ProviderMode, StubEmbedder, StubProvider, Workspace};

fn counts(processed: usize, failed: usize, skipped: usize, stopped: usize, total: usize) -> BatchSummary {
    BatchSummary {
        processed_count: processed,
        failed_count: failed,
        skipped_count: skipped,
        stopped_count: stopped,
        total_files: total,
        error: None,
    }
}

#[tokio::test]
async fn test_five_jpegs_all_processed() {
    let ws = Workspace::new();
    let inputs = ws.add_files(5);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);

    let summary = BatchProcessor::new(ws.config(2), collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(5, 0, 0, 0, 5));
    assert_eq!(ws.csv_rows(), 5);
    assert_eq!(provider.total_calls(), 5);
    for input in &inputs {
        assert!(!input.exists(), "输入文件应被删除: {}", input.display());
        assert!(ws.output.join(input.file_name().unwrap()).exists());
    }
    assert!(!ws.output.join("temp_compressed").exists());
}

#[tokio::test]
async fn test_quota_errors_without_retry() {
    let ws = Workspace::new();
    let inputs = ws.add_files(4);
    let provider = StubProvider::new(ProviderMode::AlwaysError("quota".to_string()));

    let summary = BatchProcessor::new(ws.config(2), collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(0, 4, 0, 0, 4));
    assert_eq!(provider.total_calls(), 4);
    assert_eq!(ws.csv_rows(), 0);
    for input in &inputs {
        assert!(input.exists());
    }
}

#[tokio::test]
async fn test_retry_promotes_recovered_files() {
    let ws = Workspace::new();
    ws.add_files(3);
    let provider = StubProvider::new(ProviderMode::FailTimes(1));

    let mut config = ws.config(2);
    config.auto_retry_enabled = true;
    let summary = BatchProcessor::new(config, collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(3, 0, 0, 0, 3));
    assert_eq!(provider.calls_for("photo_00.jpg"), 2);
    assert_eq!(provider.total_calls(), 6);
    assert_eq!(ws.csv_rows(), 3);
}

#[tokio::test]
async fn test_api_failures_retried_until_attempt_limit() {
    let ws = Workspace::new();
    ws.add_files(2);
    let provider = StubProvider::new(ProviderMode::AlwaysError("quota".to_string()));

    let mut config = ws.config(2);
    config.auto_retry_enabled = true;
    let summary = BatchProcessor::new(config, collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(0, 2, 0, 0, 2));
    assert_eq!(provider.calls_for("photo_00.jpg"), 5);
    assert_eq!(provider.calls_for("photo_01.jpg"), 5);
}

#[tokio::test]
async fn test_empty_file_never_retried() {
    let ws = Workspace::new();
    std::fs::write(ws.input.join("tiny.jpg"), b"too small").unwrap();
    let provider = StubProvider::new(ProviderMode::AlwaysOk);

    let mut config = ws.config(2);
    config.auto_retry_enabled = true;
    let summary = BatchProcessor::new(config, collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(0, 1, 0, 0, 1));
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn test_existing_output_is_skipped_untouched() {
    let ws = Workspace::new();
    ws.add_file("exists.jpg");
    ws.add_file("fresh.jpg");
    std::fs::create_dir_all(&ws.output).unwrap();
    let existing = ws.output.join("exists.jpg");
    std::fs::write(&existing, b"already delivered").unwrap();

    let provider = StubProvider::new(ProviderMode::AlwaysOk);
    let summary = BatchProcessor::new(ws.config(2), collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(1, 0, 1, 0, 2));
    assert_eq!(provider.calls_for("exists.jpg"), 0);
    assert_eq!(std::fs::read(&existing).unwrap(), b"already delivered");
    assert!(ws.input.join("exists.jpg").exists());
}

#[tokio::test]
async fn test_stop_before_start_counts_everything_stopped() {
    let ws = Workspace::new();
    ws.add_files(3);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);
    let stop = StopSignal::new();
    stop.request_stop();

    let summary = BatchProcessor::new(ws.config(2), collaborators(provider.clone()), stop)
        .run()
        .await;

    assert_eq!(summary, counts(0, 0, 0, 3, 3));
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_mid_batch_accounts_every_file() {
    let ws = Workspace::new();
    ws.add_files(6);
    let provider = StubProvider::new(ProviderMode::WaitForStop);
    let stop = StopSignal::new();

    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.request_stop();
    });

    let summary = BatchProcessor::new(ws.config(2), collaborators(provider.clone()), stop)
        .run()
        .await;

    assert_eq!(summary.total_files, 6);
    assert_eq!(summary.accounted(), 6);
    assert_eq!(summary.stopped_count, 6);
    assert_eq!(summary.processed_count, 0);
    assert_eq!(provider.total_calls(), 2);
}

#[tokio::test]
async fn test_missing_credentials_is_fatal() {
    let ws = Workspace::new();
    ws.add_files(2);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);

    let mut config = ws.config(2);
    config.api_keys.clear();
    let summary = BatchProcessor::new(config, collaborators(provider.clone()), StopSignal::new())
        .run()
        .await;

    assert!(summary.error.is_some());
    assert_eq!(summary.accounted(), 0);
    assert_eq!(summary.total_files, 0);
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn test_progress_reaches_total() {
    let ws = Workspace::new();
    ws.add_files(4);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);

    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(AtomicUsize::new(0));
    let (seen_calls, seen_last) = (calls.clone(), last.clone());
    let callback: ProgressCallback = Arc::new(move |done, total| {
        assert_eq!(total, 4);
        seen_calls.fetch_add(1, Ordering::SeqCst);
        seen_last.store(done, Ordering::SeqCst);
    });

    let summary = BatchProcessor::new(ws.config(2), collaborators(provider), StopSignal::new())
        .with_progress(callback)
        .run()
        .await;

    assert_eq!(summary.processed_count, 4);
    // 开始时一次 (0, 4)，之后每个文件一次
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(last.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_rename_and_subfolders() {
    let ws = Workspace::new();
    ws.add_file("a.jpg");
    let provider = StubProvider::new(ProviderMode::AlwaysOk);

    let mut config = ws.config(1);
    config.rename_enabled = true;
    config.auto_subfolder_enabled = true;
    let summary = BatchProcessor::new(config, collaborators(provider), StopSignal::new())
        .run()
        .await;

    assert_eq!(summary.processed_count, 1);
    let images = ws.output.join("Images");
    assert!(images.join("T.jpg").exists());
    assert!(!images.join("a.jpg").exists());
    let csv = std::fs::read_to_string(images.join("metadata_csv").join("metadata.csv")).unwrap();
    assert!(csv.contains("T.jpg"));
}

#[tokio::test]
async fn test_slow_embedding_is_not_cut_off() {
    let ws = Workspace::new();
    let inputs = ws.add_files(1);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);
    let embedder = StubEmbedder::slow_first(Duration::from_millis(1500));
    let mut collab = collaborators(provider.clone());
    collab.embedder = embedder.clone();

    let mut config = ws.config(1);
    config.job_timeout_secs = 1;
    config.auto_retry_enabled = true;
    let summary = BatchProcessor::new(config, collab, StopSignal::new())
        .run()
        .await;

    // 写入比超时慢，但复制之后不再计时，文件照常交付
    assert_eq!(summary, counts(1, 0, 0, 0, 1));
    assert!(!inputs[0].exists());
    assert!(ws.output.join("photo_00.jpg").exists());
    assert_eq!(ws.csv_rows(), 1);
    assert_eq!(provider.total_calls(), 1);
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn test_embed_abort_is_failed_and_not_retried() {
    let ws = Workspace::new();
    let inputs = ws.add_files(1);
    let provider = StubProvider::new(ProviderMode::AlwaysOk);
    let mut collab = collaborators(provider.clone());
    collab.embedder = StubEmbedder::returning(false, EmbedStatus::CopyFailed);

    let mut config = ws.config(1);
    config.auto_retry_enabled = true;
    let summary = BatchProcessor::new(config, collab, StopSignal::new())
        .run()
        .await;

    assert_eq!(summary, counts(0, 1, 0, 0, 1));
    assert_eq!(provider.total_calls(), 1);
    assert!(inputs[0].exists());
    assert!(ws.output.join("photo_00.jpg").exists());
    assert_eq!(ws.csv_rows(), 0);
}
