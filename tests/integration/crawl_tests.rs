//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end: traversal, downloads and the manifest.

use std::path::Path;
use std::time::Duration;
use sumi_gather::config::Config;
use sumi_gather::crawler::Coordinator;
use sumi_gather::output::{DownloadStatus, FailureCause, Manifest};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted at `root` with rendering disabled
fn create_test_config(server: &MockServer, root: &Path) -> Config {
    let mut config = Config::from_seed(format!("{}/", server.uri()));
    config.crawler.politeness_delay = 0;
    config.crawler.max_workers = 2;
    config.fetch.render = false;
    config.download.root = root.to_path_buf();
    config.download.retry_backoff = 10;
    config
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><head><title>Test</title></head><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.resize(2048, b'x');
    body
}

fn pdf_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(pdf_body())
        .insert_header("content-type", "application/pdf")
}

async fn run_crawl(config: Config) -> Manifest {
    Coordinator::from_config(config)
        .expect("Failed to create coordinator")
        .run(CancellationToken::new())
        .await
        .expect("Crawl failed")
}

#[tokio::test]
async fn test_seed_links_split_into_page_artifact_and_discarded() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/notice/a">Notice A</a>
               <a href="/files/report.pdf">Annual Report</a>
               <a href="javascript:void(0)">Print</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notice/a"))
        .respond_with(html_page("<p>No links here</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/report.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_attempted, 1);
    assert_eq!(manifest.artifacts_succeeded, 1);
    assert_eq!(manifest.pages_enqueued, 1);
    assert_eq!(manifest.discarded_references, 1);
    assert_eq!(manifest.pages_visited, 2);
    assert!(!manifest.cancelled);

    let record = &manifest.downloads[0];
    assert_eq!(record.status, DownloadStatus::Success);
    assert_eq!(record.category, "direct");
    assert_eq!(record.byte_size, 2048);
    assert_eq!(
        record.local_path,
        root.path().join("direct").join("Annual Report.pdf")
    );
    assert!(record.local_path.exists());
    assert!(record.sha256.is_some());

    // The manifest on disk matches the returned one
    let written = Manifest::load(&root.path().join("manifest.json")).unwrap();
    assert_eq!(written.downloads, manifest.downloads);
}

#[tokio::test]
async fn test_html_error_page_is_invalid_and_removed() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/files/missing.pdf">Missing Paper</a>"#))
        .mount(&mock_server)
        .await;

    // 60 bytes of HTML where a PDF was expected
    let error_page = "<html><body>Error 404: file not found on site</body></html>\n";
    assert_eq!(error_page.len(), 60);
    Mock::given(method("GET"))
        .and(path("/files/missing.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(error_page)
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_attempted, 1);
    assert_eq!(manifest.artifacts_succeeded, 0);
    assert_eq!(manifest.artifacts_invalid, 1);

    let record = &manifest.downloads[0];
    assert_eq!(record.status, DownloadStatus::Invalid);
    assert!(matches!(
        record.cause,
        Some(FailureCause::InvalidArtifact(_))
    ));
    assert!(!record.local_path.exists());
    assert!(!root
        .path()
        .join("direct")
        .join("Missing Paper.pdf.part")
        .exists());
}

#[tokio::test]
async fn test_rerun_reuses_existing_artifacts() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/files/exam.pdf">Exam Paper</a>"#))
        .mount(&mock_server)
        .await;

    // Downloaded by the first run only
    Mock::given(method("GET"))
        .and(path("/files/exam.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let first = run_crawl(create_test_config(&mock_server, root.path())).await;
    let second = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(first.artifacts_reused, 0);
    assert_eq!(second.artifacts_reused, 1);
    assert_eq!(first.downloads, second.downloads);
    assert_eq!(second.downloads[0].status, DownloadStatus::Success);
}

#[tokio::test]
async fn test_rerun_in_other_order_keeps_files_with_their_urls() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    // The first run sees the links in one order, the second in the other
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/a/form.pdf">Download</a>
               <a href="/b/form.pdf">Download</a>"#,
        ))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/b/form.pdf">Download</a>
               <a href="/a/form.pdf">Download</a>"#,
        ))
        .mount(&mock_server)
        .await;

    let mut other_body = pdf_body();
    other_body[100] = b'y';
    Mock::given(method("GET"))
        .and(path("/a/form.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/form.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(other_body)
                .insert_header("content-type", "application/pdf"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server, root.path());
    config.crawler.max_workers = 1;
    let first = run_crawl(config.clone()).await;
    let second = run_crawl(config).await;

    let record_for = |manifest: &Manifest, suffix: &str| {
        manifest
            .downloads
            .iter()
            .find(|r| r.source_url.ends_with(suffix))
            .cloned()
            .unwrap()
    };

    let first_a = record_for(&first, "/a/form.pdf");
    let first_b = record_for(&first, "/b/form.pdf");
    assert_ne!(first_a.local_path, first_b.local_path);
    assert_ne!(first_a.sha256, first_b.sha256);

    assert_eq!(record_for(&second, "/a/form.pdf"), first_a);
    assert_eq!(record_for(&second, "/b/form.pdf"), first_b);
    assert_eq!(second.artifacts_reused, 2);
}

#[tokio::test]
async fn test_cancel_lets_download_in_progress_finish() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/files/slow.pdf">Slow Report</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/slow.pdf"))
        .respond_with(pdf_response().set_delay(Duration::from_millis(800)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let coordinator = Coordinator::from_config(create_test_config(&mock_server, root.path()))
        .expect("Failed to create coordinator");

    // Cancel while the artifact response is still pending
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let manifest = coordinator.run(cancel).await.expect("Crawl failed");

    assert!(manifest.cancelled);
    assert_eq!(manifest.artifacts_attempted, 1);
    assert_eq!(manifest.artifacts_succeeded, 1);

    let record = &manifest.downloads[0];
    assert_eq!(record.status, DownloadStatus::Success);
    assert!(record.local_path.exists());
    assert!(!root
        .path()
        .join("direct")
        .join("Slow Report.pdf.part")
        .exists());
}

#[tokio::test]
async fn test_fragment_kept_in_record_but_not_requested() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/files/guide.pdf#page=4">Guide</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/guide.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_succeeded, 1);
    assert!(manifest.downloads[0]
        .source_url
        .ends_with("/files/guide.pdf#page=4"));
}

#[tokio::test]
async fn test_depth_limit_is_respected() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/level1">Level One</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/level1"))
        .respond_with(html_page(r#"<a href="/level2">Level Two</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Depth 2 equals the limit, so it is never fetched
    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(html_page(r#"<a href="/level3">Level Three</a>"#))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server, root.path());
    config.crawler.max_depth = 2;
    let manifest = run_crawl(config).await;

    assert_eq!(manifest.pages_visited, 2);
    assert_eq!(manifest.pages_enqueued, 2);
    assert_eq!(manifest.pages_at_depth_limit, 1);
}

#[tokio::test]
async fn test_duplicate_links_dispatched_once() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/files/timetable.pdf">Timetable</a>
               <a href="/files/timetable.pdf#page=2">Timetable again</a>
               <a href="/notices">Notices</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notices"))
        .respond_with(html_page(
            r#"<a href="/files/timetable.pdf">Timetable</a>
               <a href="/">Home</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/timetable.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_attempted, 1);
    assert_eq!(manifest.pages_visited, 2);
    assert_eq!(manifest.duplicates_skipped, 2);
}

#[tokio::test]
async fn test_category_follows_first_level_page() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/exams">Exam Notices</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/exams"))
        .respond_with(html_page(r#"<a href="/exams/sheet">Date Sheet</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/exams/sheet"))
        .respond_with(html_page(r#"<a href="/files/datesheet.pdf">Download</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/datesheet.pdf"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_succeeded, 1);
    let record = &manifest.downloads[0];
    assert_eq!(record.category, "Exam Notices");
    assert_eq!(
        record.local_path,
        root.path().join("Exam Notices").join("Download.pdf")
    );
}

#[tokio::test]
async fn test_transient_errors_retried_and_client_errors_not() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/files/flaky.pdf">Flaky</a>
               <a href="/files/gone.pdf">Gone</a>"#,
        ))
        .mount(&mock_server)
        .await;

    // First request fails with 503, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/files/flaky.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/flaky.pdf"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.artifacts_attempted, 2);
    assert_eq!(manifest.artifacts_succeeded, 1);
    assert_eq!(manifest.artifacts_failed, 1);

    let gone = manifest
        .downloads
        .iter()
        .find(|r| r.source_url.ends_with("/files/gone.pdf"))
        .unwrap();
    assert_eq!(gone.status, DownloadStatus::Failed);
    assert!(matches!(gone.cause, Some(FailureCause::DownloadFailed(_))));
}

#[tokio::test]
async fn test_unreachable_page_does_not_stop_crawl() {
    let mock_server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/broken">Broken Section</a>
               <a href="/files/ok.pdf">Circular</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/ok.pdf"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    let manifest = run_crawl(create_test_config(&mock_server, root.path())).await;

    assert_eq!(manifest.unreachable_pages.len(), 1);
    assert!(manifest.unreachable_pages[0].url.ends_with("/broken"));
    assert_eq!(manifest.unreachable_pages[0].depth, 1);
    assert_eq!(manifest.artifacts_succeeded, 1);
}
