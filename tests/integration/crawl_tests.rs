//! Integration tests for the crawl engine
//!
//! These tests use wiremock to serve EasyNomad-shaped listing pages and run
//! the full fetch, parse, paginate and save cycle end-to-end.

use nomad_harvest::config::parse_config;
use nomad_harvest::recorder::sinks::{CsvCodec, FileCodec};
use nomad_harvest::spider::{
    CrawlEngine, HttpTransport, Termination, Transport, TransportConfig, TransportError,
};
use nomad_harvest::{harvest, EasyNomadSpider, Entity, SaveOptions};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PATH: &str = "/api/posts/list";

fn start_url(server: &MockServer) -> String {
    format!(
        "{}{}?limit=100&page=1&jobCategory=&contractType=",
        server.uri(),
        LIST_PATH
    )
}

/// A listing page with one job per code
fn jobs_page(codes: &[&str]) -> serde_json::Value {
    let data: Vec<serde_json::Value> = codes
        .iter()
        .map(|code| {
            serde_json::json!({
                "jobCode": code,
                "jobTitle": format!("Engineer {}", code),
                "company": "Nomad Co",
                "descContent": "Remote work",
                "salary": "20k-30k",
                "jobType": "full-time",
                "url": format!("https://easynomad.cn/jobs/{}", code),
                "jobPublishTime": "2024-05-01"
            })
        })
        .collect();
    serde_json::json!({ "data": data })
}

async fn mount_page(server: &MockServer, page: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn config_toml(server: &MockServer, output: &Path, extra_spider: &str) -> String {
    format!(
        r#"
[spider]
name = "easynomad"
start-url = "{}"
delay-ms = 0
max-pages = 10
{}

[output]
output-file = '{}'
incremental = true
primary-key = "id"
"#,
        start_url(server),
        extra_spider,
        output.display()
    )
}

fn read_ids(path: &Path) -> Vec<String> {
    let table = CsvCodec.read(path).expect("Failed to read CSV output");
    table
        .rows
        .iter()
        .filter_map(|row| row.get("id").and_then(|v| v.as_key()))
        .collect()
}

fn engine(server: &MockServer) -> CrawlEngine<EasyNomadSpider> {
    let spider = EasyNomadSpider::with_start_url(start_url(server));
    let transport = HttpTransport::with_defaults(&spider).expect("Failed to build transport");
    CrawlEngine::new(spider, transport, Duration::ZERO)
}

#[tokio::test]
async fn test_harvest_pages_until_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, "1", jobs_page(&["EN-1", "EN-2"])).await;
    mount_page(&server, "2", jobs_page(&["EN-3"])).await;
    mount_page(&server, "3", serde_json::json!({ "data": [] })).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("jobs.csv");
    let config = parse_config(&config_toml(&server, &output, "")).unwrap();

    let outcome = harvest(&config, config.spider.max_pages).await.unwrap();

    assert_eq!(outcome.report.termination, Termination::Exhausted);
    assert_eq!(outcome.report.pages, 3);
    assert_eq!(outcome.report.entities.len(), 3);
    assert_eq!(outcome.saved.added, 3);
    assert_eq!(outcome.saved.written, 3);
    assert_eq!(read_ids(&output), vec!["EN-1", "EN-2", "EN-3"]);
}

#[tokio::test]
async fn test_second_harvest_skips_saved_jobs() {
    let server = MockServer::start().await;
    mount_page(&server, "1", jobs_page(&["EN-1", "EN-2"])).await;
    mount_page(&server, "2", serde_json::json!({ "data": null })).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("jobs.csv");
    let config = parse_config(&config_toml(&server, &output, "")).unwrap();

    let first = harvest(&config, Some(10)).await.unwrap();
    assert_eq!(first.saved.added, 2);

    let second = harvest(&config, Some(10)).await.unwrap();
    assert_eq!(second.saved.added, 0);
    assert_eq!(second.saved.skipped, 2);
    assert_eq!(read_ids(&output), vec!["EN-1", "EN-2"]);
}

#[tokio::test]
async fn test_page_cap_stops_crawl() {
    let server = MockServer::start().await;

    // Every page has data, so only the cap ends the crawl
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs_page(&["EN-1"])))
        .expect(3)
        .mount(&server)
        .await;

    let mut engine = engine(&server);
    let report = engine.crawl(Some(3)).await.unwrap();

    assert_eq!(report.termination, Termination::PageCap);
    assert_eq!(report.pages, 3);
    assert_eq!(report.entities.len(), 3);
}

#[tokio::test]
async fn test_failed_page_keeps_earlier_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "1", jobs_page(&["EN-1", "EN-2"])).await;
    mount_page(&server, "2", jobs_page(&["EN-3"])).await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("jobs.csv");
    let options = SaveOptions::new(&output).with_primary_key(Some("id".to_string()));

    let mut engine = engine(&server);
    let outcome = engine.crawl_and_save(Some(10), &options).await.unwrap();

    match &outcome.report.termination {
        Termination::PageFailure(failure) => {
            assert_eq!(failure.page, 3);
            assert!(failure.reason.contains("500"));
        }
        other => panic!("Expected page failure, got {:?}", other),
    }
    assert_eq!(outcome.report.pages, 2);
    assert_eq!(outcome.saved.written, 3);
    assert_eq!(read_ids(&output), vec!["EN-1", "EN-2", "EN-3"]);
}

#[tokio::test]
async fn test_malformed_page_is_page_failure() {
    let server = MockServer::start().await;
    mount_page(&server, "1", jobs_page(&["EN-1"])).await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let mut engine = engine(&server);
    let report = engine.crawl(Some(10)).await.unwrap();

    assert!(report.termination.is_failure());
    assert_eq!(report.entities.len(), 1);
    assert_eq!(report.entities[0].get_id().unwrap(), "EN-1");
}

#[tokio::test]
async fn test_non_success_status_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let spider = EasyNomadSpider::with_start_url(start_url(&server));
    let transport = HttpTransport::with_defaults(&spider).unwrap();

    let result = transport.fetch(&start_url(&server)).await;
    assert!(matches!(
        result,
        Err(TransportError::Status { status: 404, .. })
    ));

    transport.close();
    assert!(matches!(
        transport.fetch(&start_url(&server)).await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_site_headers_and_cookies_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("Referer", "https://easynomad.cn/"))
        .and(header("X-Trace", "harvest"))
        .and(header("Cookie", "session=abc123"))
        .and(header("User-Agent", "harvest-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let spider = EasyNomadSpider::with_start_url(start_url(&server));
    let config = TransportConfig {
        user_agent: Some("harvest-test/1.0".to_string()),
        headers: vec![("X-Trace".to_string(), "harvest".to_string())],
        cookies: vec![("session".to_string(), "abc123".to_string())],
        ..TransportConfig::default()
    };
    let transport = HttpTransport::new(&config, &spider).unwrap();

    let response = transport.fetch(&start_url(&server)).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_harvest_uses_configured_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("Cookie", "token=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs_page(&["EN-9"])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("jobs.csv");
    let extra = "\n[spider.cookies]\ntoken = \"xyz\"\n";
    let config = parse_config(&config_toml(&server, &output, extra)).unwrap();

    let outcome = harvest(&config, Some(1)).await.unwrap();

    assert_eq!(outcome.report.termination, Termination::PageCap);
    assert_eq!(read_ids(&output), vec!["EN-9"]);
}
