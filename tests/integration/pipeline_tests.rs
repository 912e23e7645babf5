//! Full pipeline runs over a mock server into a SQLite store

use crate::common::{mount_page, mount_status, og_page, orchestrator, source};
use harvester::builtin::default_registry;
use harvester::config::{PipelineConfig, SourceEntry};
use harvester::output::format_markdown_report;
use harvester::pipeline::{Phase, RunStatus, SOURCE_ROLLUP_KEY, TOP_RECENT_KEY};
use harvester::storage::SqliteStore;
use std::io::Write;
use std::sync::Arc;
use wiremock::MockServer;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        score_threshold: 70.0,
        high_score_cutoff: 80.0,
        top_n: 10,
        ..PipelineConfig::default()
    }
}

async fn serve_reels(server: &MockServer) {
    mount_page(server, "/reel/a", og_page("Strong", "10K views, 900 likes, 100 comments #dance")).await;
    mount_page(server, "/reel/b", og_page("Weak", "10K views, 100 likes")).await;
    mount_page(server, "/reel/c", og_page("Also strong", "2K views, 150 likes, 50 comments")).await;
}

#[tokio::test]
async fn test_run_isolates_failing_source() {
    let server = MockServer::start().await;
    serve_reels(&server).await;
    mount_status(&server, "/@someone/video/1", 404).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("harvest.db")).unwrap());

    let mut config = pipeline_config();
    config.sources = vec![
        source(
            "instagram-trending",
            &[
                "https://instagram.com/reel/a",
                "https://instagram.com/reel/b",
                "https://www.instagram.com/reel/c/",
            ],
        ),
        source("tiktok-daily", &["https://tiktok.com/@someone/video/1", "not a url"]),
    ];

    let orchestrator = orchestrator(&server, store.clone(), config, default_registry());
    let run = orchestrator.run_full_pipeline().await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.phase, Phase::CacheRefresh);
    assert_eq!(run.counts.fetched, 3);
    assert_eq!(run.counts.analyzed, 3);
    assert_eq!(run.counts.filtered_in, 2);
    assert_eq!(run.counts.filtered_out, 1);
    assert_eq!(run.counts.persisted, 2);
    assert_eq!(run.cache_views_written, 2);

    let instagram = &run.sources[0];
    assert_eq!(instagram.fetched, 3);
    assert_eq!(instagram.failed(), 0);

    let tiktok = &run.sources[1];
    assert_eq!(tiktok.submitted, 2);
    assert_eq!(tiktok.accepted, 1);
    assert_eq!(tiktok.rejections.len(), 1);
    assert_eq!(tiktok.failed(), 1);

    let fetch_failures: Vec<_> = run.failures_in(Phase::Fetching).collect();
    assert_eq!(fetch_failures.len(), 1);
    assert_eq!(fetch_failures[0].target, "tiktok-daily");

    assert_eq!(store.count_items().unwrap(), 2);
    let top = store.cached_view(TOP_RECENT_KEY).unwrap().unwrap();
    assert_eq!(top.as_array().unwrap().len(), 2);
    assert!(store.cached_view(SOURCE_ROLLUP_KEY).unwrap().is_some());

    let report = format_markdown_report(&run, "hash");
    assert!(report.contains("| tiktok-daily | 2 | 1 | 1 | 0 | 1 | 0 |"));
}

#[tokio::test]
async fn test_run_recorded_and_rerun_upserts() {
    let server = MockServer::start().await;
    serve_reels(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("harvest.db")).unwrap());

    let mut config = pipeline_config();
    config.sources = vec![source(
        "instagram-trending",
        &["https://instagram.com/reel/a", "https://instagram.com/reel/c"],
    )];

    let orchestrator = orchestrator(&server, store.clone(), config, default_registry());

    let first = orchestrator.run_full_pipeline().await.unwrap();
    store.record_run(&first, "hash-1").unwrap();
    let second = orchestrator.run_full_pipeline().await.unwrap();
    store.record_run(&second, "hash-1").unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.counts.persisted, 2);
    assert_eq!(store.count_items().unwrap(), 2);

    let latest = store.latest_run().unwrap().unwrap();
    assert_eq!(latest.id, second.id.to_string());
    assert_eq!(latest.status, RunStatus::Completed);
    assert_eq!(latest.config_hash, "hash-1");

    let stats = store.stored_stats(5).unwrap();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.total_items, 2);
    assert_eq!(stats.items_by_source.get("instagram"), Some(&2));

    let status = orchestrator.status();
    assert!(!status.active);
    assert_eq!(status.last_run.map(|run| run.id), Some(second.id));
}

#[tokio::test]
async fn test_run_reads_target_file() {
    let server = MockServer::start().await;
    serve_reels(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let links_path = dir.path().join("links.json");
    let mut file = std::fs::File::create(&links_path).unwrap();
    file.write_all(br#"{"links": ["https://instagram.com/reel/a", "ftp://ignored", "https://instagram.com/reel/b"]}"#)
        .unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sources = vec![SourceEntry {
        name: "from-file".to_string(),
        targets: vec!["https://instagram.com/reel/c".to_string()],
        target_file: Some(links_path.to_string_lossy().into_owned()),
    }];

    let orchestrator = orchestrator(&server, store.clone(), pipeline_config(), default_registry());
    let run = orchestrator.run_sources(&sources).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.sources[0].submitted, 3);
    assert_eq!(run.counts.fetched, 3);
    assert_eq!(run.counts.persisted, 2);
}

#[tokio::test]
async fn test_run_fatal_when_no_source_readable() {
    let server = MockServer::start().await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let sources = vec![SourceEntry {
        name: "missing".to_string(),
        targets: Vec::new(),
        target_file: Some("/nonexistent/links.txt".to_string()),
    }];

    let orchestrator = orchestrator(&server, store.clone(), pipeline_config(), default_registry());
    let run = orchestrator.run_sources(&sources).await.unwrap();

    assert_eq!(run.status, RunStatus::Fatal);
    assert_eq!(run.phase, Phase::Fetching);
    assert!(run.fatal_reason.is_some());
    assert_eq!(run.counts.persisted, 0);
    assert_eq!(store.count_items().unwrap(), 0);

    let failures: Vec<_> = run.failures_in(Phase::Fetching).collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].reason.contains("unreadable"));
}
