//! End-to-end crawl scenarios against a mock HTTP server.

use std::path::Path;

use tempfile::TempDir;
use trawl_db::CrawlStore;
use trawl_engine::CrawlConfig;
use trawl_types::WorkerState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(dir: &Path, seed: &str, workers: usize) -> CrawlConfig {
    CrawlConfig {
        seed: Some(seed.to_string()),
        workers,
        // Real runs wait 3-7s; one second keeps the loop semantics (a pending
        // sleep between polls) without slowing the suite down too much.
        wait_secs: 1..=1,
        crawl_db: dir.join("crawl.sqlite"),
        log_db: dir.join("log.sqlite"),
        accepted_dir: dir.join("files"),
        ..CrawlConfig::default()
    }
}

fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "text/html; charset=utf-8")
        .set_body_string(body.to_string())
}

async fn mount_robots_missing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn seed_only_run_fetches_one_page_and_finishes() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response("<html><body>no links here</body></html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri(), 2);
    let summary = trawl_engine::run(config.clone()).await.unwrap();

    assert_eq!(summary.statuses.len(), 2);
    assert!(
        summary
            .statuses
            .iter()
            .all(|s| s.state == WorkerState::Finished)
    );
    assert_eq!(summary.totals.parsed, 1);
    assert!(!summary.interrupted);

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.resource_count().unwrap(), 1);
    assert_eq!(store.pending_count().unwrap(), 0);
    assert_eq!(store.document_count().unwrap(), 0);

    let seed_url = format!("{}/", server.uri());
    let resource = store.find_resource_by_url(&seed_url).unwrap().unwrap();
    assert_eq!(resource.last_code, Some(200));
    assert!(resource.fetched.is_some());
}

#[tokio::test]
async fn two_level_crawl_follows_same_domain_links_only() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><head><title>Seed</title></head><body>
               <a href="./b">b</a>
               <a href="../c">c</a>
               <a href="http://other.invalid/x">elsewhere</a>
               </body></html>"#,
        ))
        .mount(&server)
        .await;
    for page in ["/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html_response("<html><body>leaf</body></html>"))
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri(), 2);
    let summary = trawl_engine::run(config.clone()).await.unwrap();

    assert_eq!(summary.totals.parsed, 3);
    assert_eq!(summary.totals.added, 2);

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.resource_count().unwrap(), 3);
    assert_eq!(store.link_count().unwrap(), 2);
    assert_eq!(store.pending_count().unwrap(), 0);

    let seed_url = format!("{}/", server.uri());
    let seed = store.find_resource_by_url(&seed_url).unwrap().unwrap();
    assert_eq!(seed.title.as_deref(), Some("Seed"));
    for page in ["b", "c"] {
        let url = format!("{}/{page}", server.uri());
        let resource = store.find_resource_by_url(&url).unwrap().unwrap();
        assert_eq!(resource.last_code, Some(200), "missing fetch of {url}");
    }
}

fn sample_pdf(subject: &str, page_text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal(page_text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Sample"),
        "Subject" => Object::string_literal(subject),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[tokio::test]
async fn relevant_pdf_is_downloaded_and_accepted() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<a href="/paper.pdf">the paper</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .set_body_bytes(sample_pdf("web crawling", "crawling notes")),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &server.uri(), 2);
    config.keywords = vec!["crawling".to_string()];
    let summary = trawl_engine::run(config.clone()).await.unwrap();

    assert_eq!(summary.totals.downloaded, 1);

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.document_count().unwrap(), 1);

    let pdf_url = format!("{}/paper.pdf", server.uri());
    let resource = store.find_resource_by_url(&pdf_url).unwrap().unwrap();
    let doc = store
        .get_document(resource.document_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(doc.accepted);
    assert!(doc.relevancy >= 1.0);
    assert_eq!(doc.filename, format!("{}_paper.pdf", resource.id));
    assert!(config.accepted_dir.join(&doc.filename).exists());
}

#[tokio::test]
async fn irrelevant_pdf_is_recorded_but_not_written() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(r#"<a href="/paper.pdf">paper</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .set_body_bytes(sample_pdf("nothing relevant", "unrelated text")),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &server.uri(), 1);
    config.keywords = vec!["quantum".to_string()];
    // No rejected folder: the document row is created but nothing is written.
    let summary = trawl_engine::run(config.clone()).await.unwrap();
    assert_eq!(summary.totals.downloaded, 1);

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    let pdf_url = format!("{}/paper.pdf", server.uri());
    let resource = store.find_resource_by_url(&pdf_url).unwrap().unwrap();
    let doc = store
        .get_document(resource.document_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(!doc.accepted);
    assert!(!config.accepted_dir.join(&doc.filename).exists());
}

#[tokio::test]
async fn failing_url_is_retried_then_dropped() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/flaky", server.uri());
    let config = test_config(dir.path(), &seed, 1);
    let summary = trawl_engine::run(config.clone()).await.unwrap();

    assert_eq!(summary.totals.parsed, 0);

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.pending_count().unwrap(), 0);
    let resource = store.find_resource_by_url(&seed).unwrap().unwrap();
    assert_eq!(resource.last_code, Some(503));
}

#[tokio::test]
async fn robots_disallowed_url_is_discarded_without_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/private/x", server.uri());
    let config = test_config(dir.path(), &seed, 1);
    trawl_engine::run(config.clone()).await.unwrap();

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.pending_count().unwrap(), 0);
    let resource = store.find_resource_by_url(&seed).unwrap().unwrap();
    // The fetch never happened, so no status was recorded.
    assert_eq!(resource.last_code, None);
    assert!(resource.fetched.is_none());
}

#[tokio::test]
async fn non_html_non_pdf_is_marked_done() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/data.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/csv")
                .set_body_string("a,b,c"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/data.csv", server.uri());
    let config = test_config(dir.path(), &seed, 1);
    let summary = trawl_engine::run(config.clone()).await.unwrap();

    // Fetched once, never retried, counted as processed.
    assert_eq!(summary.totals.parsed, 1);
    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    assert_eq!(store.pending_count().unwrap(), 0);
    assert_eq!(store.document_count().unwrap(), 0);
}

#[tokio::test]
async fn max_depth_stops_link_expansion() {
    let server = MockServer::start().await;
    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(r#"<a href="/deep">go deeper</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deep"))
        .respond_with(html_response(r#"<a href="/deeper">even deeper</a>"#))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &server.uri(), 1);
    config.max_depth = Some(1);
    trawl_engine::run(config.clone()).await.unwrap();

    let store = CrawlStore::open(&config.crawl_db, false).unwrap();
    // The depth-1 page was fetched but its links were not expanded.
    assert_eq!(store.resource_count().unwrap(), 2);
    assert_eq!(store.pending_count().unwrap(), 0);
    let deep = store
        .find_resource_by_url(&format!("{}/deep", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(deep.last_code, Some(200));
}
