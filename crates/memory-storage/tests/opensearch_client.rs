//! OpenSearchStore against a mock HTTP server.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use memory_storage::{MemoryStore, OpenSearchConfig, OpenSearchStore, StorageError};

fn store_for(server: &MockServer) -> OpenSearchStore {
    let config = OpenSearchConfig::new(server.uri())
        .with_basic_auth("admin", "secret")
        .with_retries(3, Duration::from_millis(10));
    OpenSearchStore::new(config).unwrap()
}

#[tokio::test]
async fn index_document_puts_with_refresh_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/mem/_doc/memory_1"))
        .and(query_param("refresh", "true"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "title": "Ownership" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store
        .index_document("mem", "memory_1", &json!({ "title": "Ownership" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn get_document_found_and_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mem/_doc/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "a",
            "found": true,
            "_source": { "title": "A" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mem/_doc/b"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "_id": "b", "found": false })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let a = store.get_document("mem", "a").await.unwrap().unwrap();
    assert_eq!(a["title"], "A");
    assert!(store.get_document("mem", "b").await.unwrap().is_none());
}

#[tokio::test]
async fn exists_uses_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/mem/_doc/real-2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/mem/_doc/missing-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.exists("mem", "real-2").await.unwrap());
    assert!(!store.exists("mem", "missing-1").await.unwrap());
}

#[tokio::test]
async fn update_access_sends_one_bulk_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [
                { "update": { "_id": "a", "status": 200 } },
                { "update": { "_id": "b", "status": 200 } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let updated = store
        .update_access("mem", &["a".into(), "b".into()], Utc::now())
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert_eq!(body.lines().count(), 4);
    assert!(body.contains("ctx._source.access_count"));
}

#[tokio::test]
async fn update_access_is_not_resent_after_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "errors": false, "items": [] }))
                .set_delay(Duration::from_secs(1)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [ { "update": { "_id": "a", "status": 200 } } ]
        })))
        .mount(&server)
        .await;

    let mut config = OpenSearchConfig::new(server.uri()).with_retries(3, Duration::from_millis(10));
    config.timeout = Duration::from_millis(200);
    let store = OpenSearchStore::new(config).unwrap();

    let result = store.update_access("mem", &["a".into()], Utc::now()).await;
    assert!(result.is_err());

    let bulk_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/_bulk")
        .count();
    assert_eq!(bulk_requests, 1);
}

#[tokio::test]
async fn update_access_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store
        .update_access("mem", &["a".into()], Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn update_access_with_no_ids_sends_nothing() {
    let server = MockServer::start().await;
    let store = store_for(&server);
    assert_eq!(store.update_access("mem", &[], Utc::now()).await.unwrap(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn search_parses_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mem/_search"))
        .and(body_partial_json(json!({ "size": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {
                "total": { "value": 1, "relation": "eq" },
                "hits": [ { "_id": "a", "_score": 0.9, "_source": { "title": "A" } } ]
            }
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let resp = store
        .search("mem", &json!({ "size": 3, "query": { "match_all": {} } }))
        .await
        .unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.hits[0].id, "a");
    assert_eq!(resp.hits[0].score, Some(0.9));
}

#[tokio::test]
async fn search_missing_index_is_index_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gone/_search"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "index_not_found_exception", "reason": "no such index [gone]" },
            "status": 404
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.search("gone", &json!({})).await.unwrap_err();
    assert!(matches!(err, StorageError::IndexNotFound(ref i) if i == "gone"));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/mem"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/mem"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.index_exists("mem").await.unwrap());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/mem"))
        .respond_with(ResponseTemplate::new(400).set_body_string("resource_already_exists_exception"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.create_index("mem", &json!({})).await.unwrap_err();
    assert!(matches!(err, StorageError::Status { status: 400, .. }));
}

#[tokio::test]
async fn retries_give_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mem/_mapping"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.get_mapping("mem").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn first_retry_waits_the_configured_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mem/_mapping"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let started = Instant::now();
    assert!(store.get_mapping("mem").await.is_err());
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn get_mapping_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mem/_mapping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mem": { "mappings": { "properties": { "embedding": { "type": "knn_vector" } } } }
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let mapping = store.get_mapping("mem").await.unwrap();
    assert!(memory_search::has_vector_field(&mapping, "mem"));
}
