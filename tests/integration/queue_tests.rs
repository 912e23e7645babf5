//! Crawl queue scenarios over a mock server

use crate::common::{direct_controller, fast_queue_config, mock_factory, mount_page, mount_status, og_page};
use futures::StreamExt;
use harvester::builtin::OpenGraphAdapter;
use harvester::fetch::ErrorKind;
use harvester::queue::{AdapterRegistry, CrawlQueue, RejectionKind, RejectionReason, TargetResult};
use harvester::url::SourceKind;
use std::sync::Arc;
use wiremock::MockServer;

fn queue(server: &MockServer) -> CrawlQueue {
    let adapter = Arc::new(OpenGraphAdapter::new());
    let mut registry = AdapterRegistry::new();
    registry
        .register(SourceKind::Instagram, adapter.clone())
        .register(SourceKind::TikTok, adapter);

    let (_, controller) = direct_controller(2);
    CrawlQueue::new(Arc::new(registry), controller, mock_factory(server), &fast_queue_config())
}

#[tokio::test]
async fn test_submit_validates_and_drain_fetches() {
    let server = MockServer::start().await;
    mount_page(&server, "/reel/abc", og_page("Reel", "12 likes")).await;
    mount_status(&server, "/@someone/video/9", 404).await;

    let queue = queue(&server);
    let report = queue.submit([
        "https://instagram.com/reel/abc",
        "http://m.instagram.com/reel/abc/",
        "https://tiktok.com/@someone/video/9",
        "https://linkedin.com/posts/someone",
        "https://example.com/page",
        "not a url",
    ]);

    assert_eq!(report.accepted_count(), 2);
    assert_eq!(report.rejected_count(), 4);
    assert_eq!(report.rejected_for(RejectionKind::Duplicate), 1);
    assert_eq!(report.rejected_for(RejectionKind::UnsupportedSource), 2);
    assert_eq!(report.rejected_for(RejectionKind::Malformed), 1);
    assert!(matches!(report.rejected[0].reason, RejectionReason::Duplicate));
    assert_eq!(queue.pending(), 2);

    let results: Vec<TargetResult> = queue.drain(queue.default_options()).collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(queue.pending(), 0);

    let reel = results
        .iter()
        .find(|r| r.target.source_kind == SourceKind::Instagram)
        .unwrap();
    assert!(reel.success);
    let item = reel.content_item.as_ref().unwrap();
    assert_eq!(item.metrics.likes, Some(12));
    let provenance = item.provenance.as_ref().unwrap();
    assert_eq!(provenance.original_url, "https://instagram.com/reel/abc");
    assert_eq!(provenance.source_kind, SourceKind::Instagram);

    let video = results
        .iter()
        .find(|r| r.target.source_kind == SourceKind::TikTok)
        .unwrap();
    assert!(!video.success);
    assert_eq!(video.error_kind, Some(ErrorKind::ElementNotFound));

    let stats = queue.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.by_source[&SourceKind::Instagram].succeeded, 1);
    assert_eq!(stats.by_source[&SourceKind::TikTok].failed, 1);
}

#[tokio::test]
async fn test_background_worker_buffers_results() {
    let server = MockServer::start().await;
    for id in ["a", "b", "c"] {
        mount_page(&server, &format!("/reel/{}", id), og_page(id, "1 like")).await;
    }

    let queue = queue(&server);
    let report = queue.enqueue_async([
        "https://instagram.com/reel/a",
        "https://instagram.com/reel/b",
        "https://instagram.com/reel/c",
    ]);
    assert_eq!(report.accepted_count(), 3);

    queue.wait_idle().await;

    let completed = queue.take_completed();
    assert_eq!(completed.len(), 3);
    assert!(completed.iter().all(|r| r.success));
    assert!(queue.take_completed().is_empty());
    assert!(!queue.stats().worker_running);

    // Finished targets no longer count as duplicates
    let again = queue.submit(["https://instagram.com/reel/a"]);
    assert_eq!(again.accepted_count(), 1);
}
