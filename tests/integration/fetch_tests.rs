//! Fetch controller and HTTP surface against a mock server

use crate::common::{direct_controller, mock_factory, mount_page, mount_status, og_page};
use harvester::builtin::OpenGraphAdapter;
use harvester::fetch::{BrowserSurface, ErrorKind, Extraction, FetchSession, HttpSurface, SurfaceFactory};
use harvester::identity::Identity;
use harvester::queue::{AdapterError, CrawlTarget, SourceAdapter};
use harvester::url::{ContentKind, PriorityWeights, SourceKind};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target(raw: &str) -> CrawlTarget {
    CrawlTarget::prepare(raw, &PriorityWeights::default(), 0).unwrap()
}

#[tokio::test]
async fn test_http_surface_navigate_and_evaluate() {
    let server = MockServer::start().await;
    let body = r#"<html><head>
        <title>Hello</title>
        <meta property="og:title" content="Hello there">
        <meta name="description" content="A page">
    </head><body>
        <a href="/next">next</a>
        <a href="https://other.example.com/x">other</a>
    </body></html>"#;
    mount_page(&server, "/page", body.to_string()).await;

    let mut surface = HttpSurface::new();
    surface.configure(&Identity::direct("TestAgent/1.0")).await.unwrap();

    let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
    let result = surface.navigate(&url, Duration::from_secs(5)).await.unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.title.as_deref(), Some("Hello"));

    let og_title = surface
        .evaluate(&Extraction::MetaProperty("og:title".to_string()))
        .await
        .unwrap();
    assert_eq!(og_title, serde_json::json!("Hello there"));

    let description = surface
        .evaluate(&Extraction::MetaProperty("description".to_string()))
        .await
        .unwrap();
    assert_eq!(description, serde_json::json!("A page"));

    let links = surface
        .evaluate(&Extraction::Selector {
            css: "a".to_string(),
            attribute: Some("href".to_string()),
        })
        .await
        .unwrap();
    let links: Vec<String> = serde_json::from_value(links).unwrap();
    assert_eq!(links.len(), 2);
    assert!(links[0].ends_with("/next"));
    assert_eq!(links[1], "https://other.example.com/x");

    let missing = surface
        .evaluate(&Extraction::MetaProperty("og:video".to_string()))
        .await
        .unwrap();
    assert!(missing.is_null());
}

#[tokio::test]
async fn test_http_surface_classifies_statuses() {
    let server = MockServer::start().await;
    mount_status(&server, "/forbidden", 403).await;
    mount_status(&server, "/gone", 404).await;
    mount_page(
        &server,
        "/challenge",
        "<html><head><title>Just a moment...</title></head></html>".to_string(),
    )
    .await;

    let mut surface = HttpSurface::new();
    surface.configure(&Identity::direct("TestAgent/1.0")).await.unwrap();

    let cases = [
        ("/forbidden", ErrorKind::BlockedOrChallenged),
        ("/gone", ErrorKind::ElementNotFound),
        ("/challenge", ErrorKind::BlockedOrChallenged),
    ];
    for (page, expected) in cases {
        let url = Url::parse(&format!("{}{}", server.uri(), page)).unwrap();
        let err = surface.navigate(&url, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind(), expected, "{}", page);
    }
}

#[tokio::test]
async fn test_http_surface_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut surface = HttpSurface::new();
    surface.configure(&Identity::direct("TestAgent/1.0")).await.unwrap();

    let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
    let err = surface.navigate(&url, Duration::from_millis(50)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_session_retries_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reel/abc"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, "/reel/abc", og_page("Recovered", "5 likes")).await;

    let (_, controller) = direct_controller(3);
    let mut session = FetchSession::new(controller.clone(), mock_factory(&server).create());

    let url = Url::parse("https://instagram.com/reel/abc").unwrap();
    let trace = session.visit_traced(&url).await;

    assert_eq!(trace.outcomes.len(), 2);
    assert!(!trace.outcomes[0].succeeded);
    assert_eq!(trace.outcomes[0].error_kind, Some(ErrorKind::NetworkError));
    assert!(trace.outcomes[1].succeeded);
    assert_eq!(trace.outcomes[1].attempt, 2);

    let stats = controller.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.retries, 1);
}

#[tokio::test]
async fn test_session_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    mount_status(&server, "/@someone/video/1", 429).await;

    let (_, controller) = direct_controller(2);
    let mut session = FetchSession::new(controller.clone(), mock_factory(&server).create());

    let url = Url::parse("https://tiktok.com/@someone/video/1").unwrap();
    let outcome = session.visit(&url).await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.attempt, 2);
    assert_eq!(outcome.error_kind, Some(ErrorKind::BlockedOrChallenged));
    assert_eq!(controller.stats().failed_requests, 1);
}

#[tokio::test]
async fn test_opengraph_adapter_extracts_item() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/reel/abc",
        og_page("Morning run", "1,200 likes, 34 comments - runner: Miles today #Running #fitness"),
    )
    .await;

    let (_, controller) = direct_controller(1);
    let mut session = FetchSession::new(controller, mock_factory(&server).create());

    let target = target("https://www.instagram.com/reel/abc/?igshid=xyz");
    assert_eq!(target.content_kind, ContentKind::Reel);

    let item = OpenGraphAdapter::new().fetch(&target, &mut session).await.unwrap();

    assert_eq!(item.source_kind, SourceKind::Instagram);
    assert_eq!(item.url, "https://instagram.com/reel/abc");
    assert_eq!(item.title.as_deref(), Some("Morning run"));
    assert_eq!(item.hashtags, vec!["running", "fitness"]);
    assert_eq!(item.metrics.likes, Some(1200));
    assert_eq!(item.metrics.comments, Some(34));
    assert_eq!(item.media_urls.len(), 1);
    assert_eq!(item.extra["content-kind"], "reel");
}

#[tokio::test]
async fn test_opengraph_adapter_reports_fetch_failure() {
    let server = MockServer::start().await;
    mount_status(&server, "/reel/gone", 404).await;

    let (_, controller) = direct_controller(2);
    let mut session = FetchSession::new(controller, mock_factory(&server).create());

    let err = OpenGraphAdapter::new()
        .fetch(&target("https://instagram.com/reel/gone"), &mut session)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Fetch { attempts: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::ElementNotFound);
}

#[tokio::test]
async fn test_opengraph_adapter_rejects_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/reel/empty", "<html><body></body></html>".to_string()).await;

    let (_, controller) = direct_controller(1);
    let mut session = FetchSession::new(controller, mock_factory(&server).create());

    let err = OpenGraphAdapter::new()
        .fetch(&target("https://instagram.com/reel/empty"), &mut session)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Extraction(_)));
}
