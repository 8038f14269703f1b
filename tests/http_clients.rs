//! Remote clients against mock HTTP servers.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use labelscout::error::{ClientError, PublishError};
use labelscout::models::{
    ImageRef, ProductCandidate, PublishConfig, SearchConfig, SinkKind, VisionConfig,
};
use labelscout::services::{DriveSink, FactExtractor, OpenAiVision, StorageSink};
use labelscout::sources::{ProductSource, RainforestSource};

fn rainforest(server: &MockServer) -> RainforestSource {
    let config = SearchConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    RainforestSource::new(&config, "rf-test").unwrap()
}

fn vision(server: &MockServer) -> OpenAiVision {
    let config = VisionConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    OpenAiVision::new(&config, "sk-test").unwrap()
}

fn image() -> ImageRef {
    ImageRef {
        product_id: "B07XJ8C8F5".into(),
        url: "https://m.media-amazon.com/images/I/back.jpg".into(),
        variant: Some("PT01".into()),
        context: "Zarbee's Kids Multivitamin".into(),
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn test_rainforest_search_pages_and_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("api_key", "rf-test"))
        .and(query_param("type", "search"))
        .and(query_param("search_term", "kids vitamins"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true, "credits_used_this_request": 1},
            "search_results": [
                {"asin": "B07XJ8C8F5", "title": "Kids Gummies", "price": {"raw": "$12.99"}},
                {"asin": "not-an-asin", "title": "Sponsored"},
                {"asin": "B000000002", "title": "Chewables"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true, "credits_used_this_request": 1},
            "search_results": [
                {"asin": "B07XJ8C8F5", "title": "Kids Gummies"},
                {"asin": "B000000003", "title": "Drops"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = rainforest(&server);
    let candidates = source.search_products("kids vitamins", 2).await.unwrap();

    let ids: Vec<_> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["B07XJ8C8F5", "B000000002", "B000000003"]);
    assert_eq!(candidates[0].price.as_deref(), Some("$12.99"));
    assert_eq!(candidates[2].page, 2);
    assert_eq!(candidates[2].position, 3);
    assert_eq!(source.credits_used(), 2);
}

#[tokio::test]
async fn test_rainforest_search_stops_on_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true},
            "search_results": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let candidates = rainforest(&server)
        .search_products("nothing here", 5)
        .await
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_rainforest_product_detail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "product"))
        .and(query_param("asin", "B07XJ8C8F5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true},
            "product": {
                "title": "Kids Multivitamin Gummies",
                "brand": "Zarbee's",
                "categories": [{"name": "Health"}, {"name": "Vitamins"}],
                "bestsellers_rank": [{"rank": 42, "category": "Children's Vitamins"}],
                "images": [
                    {"link": "https://img/main.jpg", "variant": "MAIN"},
                    {"link": "https://img/back.jpg", "variant": "PT01"}
                ],
                "buybox_winner": {"price": {"raw": "$11.49"}}
            }
        })))
        .mount(&server)
        .await;

    let candidate = ProductCandidate::new("B07XJ8C8F5", "Kids Gummies", "kids vitamins");
    let detail = rainforest(&server).fetch_detail(&candidate).await.unwrap();

    assert_eq!(detail.brand(), Some("Zarbee's"));
    assert_eq!(detail.category.as_deref(), Some("Health > Vitamins"));
    assert_eq!(
        detail.bestseller_rank.as_deref(),
        Some("#42 in Children's Vitamins")
    );
    assert_eq!(detail.price.as_deref(), Some("$11.49"));
    assert_eq!(detail.images.len(), 2);
    assert_eq!(detail.panel_images(4)[0].url, "https://img/back.jpg");
    assert_eq!(detail.images[0].context, "Zarbee's Kids Multivitamin Gummies");
}

#[tokio::test]
async fn test_rainforest_error_classification() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("asin", "B000000404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such product"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("asin", "B000000429"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("asin", "B000000500"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("asin", "B000000401"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api_key"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("asin", "B0000000FF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": false, "message": "product not found"}
        })))
        .mount(&server)
        .await;

    let source = rainforest(&server);
    let fetch = |id: &'static str| {
        let candidate = ProductCandidate::new(id, "x", "kw");
        let source = &source;
        async move { source.fetch_detail(&candidate).await.unwrap_err() }
    };

    assert!(matches!(fetch("B000000404").await, ClientError::NotFound(_)));
    match fetch("B000000429").await {
        ClientError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(fetch("B000000500").await, ClientError::Transient(_)));
    assert!(matches!(fetch("B000000401").await, ClientError::Unauthorized(_)));
    assert!(matches!(fetch("B0000000FF").await, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_rainforest_unsuccessful_search_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": false, "message": "invalid search_term"}
        })))
        .mount(&server)
        .await;

    let err = rainforest(&server)
        .search_products("???", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref m) if m.contains("invalid search_term")));
}

#[tokio::test]
async fn test_openai_parses_fenced_reply() {
    let server = MockServer::start().await;
    let reply = "```json\n{\"supplement_facts_visible\": true, \"serving_size\": \"2 gummies\", \
                 \"form\": \"gummy\", \"age_group\": \"kids\", \"facts\": [\
                 {\"nutrient\": \"Vitamin C\", \"amount\": 30, \"unit\": \"mg\", \"daily_value\": \"120%\"},\
                 {\"nutrient\": \"Zinc\", \"amount\": \"2.5\", \"unit\": \"mg\"}]}\n```";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("https://m.media-amazon.com/images/I/back.jpg"))
        .and(body_string_contains("\"model\":\"gpt-4o\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let facts = vision(&server).extract_facts(&image()).await.unwrap();

    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].nutrient, "Vitamin C");
    assert_eq!(facts[0].amount, "30");
    assert_eq!(facts[0].daily_value.as_deref(), Some("120%"));
    assert_eq!(facts[1].serving_size.as_deref(), Some("2 gummies"));
    assert_eq!(facts[1].product_id, "B07XJ8C8F5");
}

#[tokio::test]
async fn test_openai_no_panel_yields_no_facts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            r#"{"supplement_facts_visible": false, "facts": []}"#,
        )))
        .mount(&server)
        .await;

    let facts = vision(&server).extract_facts(&image()).await.unwrap();
    assert!(facts.is_empty());
}

#[tokio::test]
async fn test_openai_error_classification() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid image url"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let err = vision(&server).extract_facts(&image()).await.unwrap_err();
    assert!(matches!(err, ClientError::Extraction(_)));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let err = vision(&server).extract_facts(&image()).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("I cannot read this")))
        .mount(&server)
        .await;
    let err = vision(&server).extract_facts(&image()).await.unwrap_err();
    assert!(matches!(err, ClientError::Extraction(_)));
}

fn drive_config(server: &MockServer) -> PublishConfig {
    PublishConfig {
        sink: SinkKind::Drive,
        folder_id: Some("folder-1".into()),
        access_token: Some("ya29.test".into()),
        drive_api_base: server.uri(),
        drive_upload_base: server.uri(),
        ..Default::default()
    }
}

fn output_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("supplement_facts.csv");
    std::fs::write(&path, "product_id,keyword\nB07XJ8C8F5,kids\n").unwrap();
    path
}

#[tokio::test]
async fn test_drive_replaces_existing_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(query_param(
            "q",
            "name = 'supplement_facts.csv' and 'folder-1' in parents and trashed = false",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"id": "existing-id", "name": "supplement_facts.csv"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/existing-id"))
        .and(query_param("uploadType", "media"))
        .and(header("content-type", "text/csv"))
        .and(body_string_contains("B07XJ8C8F5,kids"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "existing-id"})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = DriveSink::new(&drive_config(&server)).unwrap();
    let destination = sink.publish(&output_file(&dir)).await.unwrap();

    assert_eq!(destination.id, "existing-id");
    assert_eq!(destination.name, "supplement_facts.csv");
    assert_eq!(
        destination.url.as_deref(),
        Some("https://drive.google.com/file/d/existing-id/view")
    );
}

#[tokio::test]
async fn test_drive_creates_new_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_string_contains("folder-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-id"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/new-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-id"})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = DriveSink::new(&drive_config(&server)).unwrap();
    let destination = sink.publish(&output_file(&dir)).await.unwrap();
    assert_eq!(destination.id, "new-id");
}

#[tokio::test]
async fn test_drive_error_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
        .mount(&server)
        .await;

    let sink = DriveSink::new(&drive_config(&server)).unwrap();
    let err = sink.publish(&output_file(&dir)).await.unwrap_err();
    assert!(matches!(err, PublishError::ServiceError(ref m) if m.contains("403")));

    let missing = sink.publish(&dir.path().join("missing.csv")).await.unwrap_err();
    assert!(matches!(missing, PublishError::MissingFile(_)));
}
