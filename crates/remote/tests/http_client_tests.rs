//! HTTP adapter behaviour against a mock collection service.

use std::sync::Arc;

use pipeline::{
    ConcurrencyLimits, ContinuationToken, FailureKind, FetchError, Item, ItemId, ItemMutator,
    MutationError, MutationFailure, PageFetcher, PagePipeline, PendingCountSource, Termination,
};
use remote::{HttpCollectionClient, MutateMethod, RemoteConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, configure: impl FnOnce(&mut RemoteConfig)) -> HttpCollectionClient {
    let mut config = RemoteConfig::new(server.uri()).with_bearer_token("secret");
    configure(&mut config);
    HttpCollectionClient::new(config).unwrap()
}

fn item(id: &str) -> Item {
    Item::new(ItemId::new(id).unwrap())
}

#[tokio::test]
async fn fetch_sends_page_size_token_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("pageSize", "2"))
        .and(query_param("pageToken", "abc"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "m1", "subject": "hi" }, { "id": "m2" }],
            "nextPageToken": "def"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, |c| c.page_size = Some(2));
    let token = ContinuationToken::new("abc").unwrap();
    let page = client.fetch(Some(&token)).await.unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.items[0].id.as_str(), "m1");
    assert_eq!(page.items[0].payload["subject"], "hi");
    assert_eq!(page.next.unwrap().as_str(), "def");
}

#[tokio::test]
async fn empty_next_token_and_snake_case_alias_mark_last_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "m1" }, { "id": "" }, { "other": 1 }],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;

    let page = client(&server, |_| {}).fetch(None).await.unwrap();

    assert_eq!(page.len(), 1);
    assert!(page.is_last());
}

#[tokio::test]
async fn fetch_classifies_failures() {
    let server = MockServer::start().await;
    Mock::given(path("/denied"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;
    Mock::given(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let denied = client(&server, |c| c.list_path = "/denied".into());
    assert_eq!(denied.fetch(None).await, Err(FetchError::Unauthorized));

    let broken = client(&server, |c| c.list_path = "/broken".into());
    assert_eq!(
        broken.fetch(None).await,
        Err(FetchError::Status {
            status: 503,
            message: "try later".into()
        })
    );

    let garbage = client(&server, |c| c.list_path = "/garbage".into());
    assert!(matches!(
        garbage.fetch(None).await,
        Err(FetchError::Decode { .. })
    ));
}

#[tokio::test]
async fn count_endpoint_is_optional() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 17 })))
        .mount(&server)
        .await;

    let with_count = client(&server, |c| c.count_path = Some("/items/count".into()));
    assert_eq!(with_count.estimated_pending_count().await, Ok(17));

    let without = client(&server, |_| {});
    assert!(matches!(
        without.estimated_pending_count().await,
        Err(FetchError::Unsupported { .. })
    ));
}

#[tokio::test]
async fn mutate_uses_configured_method_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/messages/m%201"))
        .and(body_json(json!({ "read": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, |c| {
        c.mutate_path = "/messages/{id}".into();
        c.mutate_method = MutateMethod::Patch;
        c.mutate_body = Some(json!({ "read": true }));
    });

    assert_eq!(client.mutate(&item("m 1")).await, Ok(()));
}

#[tokio::test]
async fn mutate_maps_statuses_to_failure_kinds() {
    let server = MockServer::start().await;
    for (id, status) in [("gone", 404u16), ("slow", 429), ("bad", 422), ("down", 500)] {
        Mock::given(method("POST"))
            .and(path(format!("/items/{id}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }
    let client = client(&server, |_| {});

    assert_eq!(client.mutate(&item("gone")).await, Err(MutationError::NotFound));
    assert_eq!(
        client.mutate(&item("slow")).await,
        Err(MutationError::RateLimited)
    );
    let bad = client.mutate(&item("bad")).await.unwrap_err();
    assert_eq!(bad.kind(), FailureKind::Rejected);
    let down = MutationFailure::from(client.mutate(&item("down")).await.unwrap_err());
    assert_eq!(down.kind, FailureKind::Transient);
}

#[tokio::test]
async fn full_run_against_mock_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 3 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "c" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "a" }, { "id": "b" }],
            "nextPageToken": "p2"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/items/b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = Arc::new(client(&server, |c| c.count_path = Some("/items/count".into())));
    let report = PagePipeline::new(client.clone(), client.clone(), ConcurrencyLimits::default())
        .with_estimator(client)
        .run()
        .await;

    assert_eq!(report.estimated_total.as_i64(), 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pages_processed, 2);
}

#[tokio::test]
async fn page_without_usable_ids_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "c" }]
        })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "name": "x" }],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client(&server, |_| {}));
    assert!(matches!(
        client.fetch(None).await,
        Err(FetchError::Decode { .. })
    ));

    let report = PagePipeline::new(client.clone(), client, ConcurrencyLimits::default())
        .run()
        .await;

    assert!(matches!(report.termination, Termination::FetchFailed { .. }));
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.pages_processed, 0);
}

#[tokio::test]
async fn listing_with_an_empty_items_array_is_the_end_of_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let page = client(&server, |_| {}).fetch(None).await.unwrap();
    assert!(page.is_empty());
}
