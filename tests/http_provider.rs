//! HTTP pull transport against a mock asset server

mod common;

use std::sync::Arc;
use std::time::Duration;

use asset_transfer::{
    AssetId, AssetManager, AssetOutcome, AssetProvider, AssetType, FailureReason,
    HttpProvider, HttpProviderConfig, RequestState,
};
use bytes::Bytes;
use common::{asset_bytes, expect_outcome, fast_config, fast_retry};
use tokio_test::assert_ok;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn http_manager(server: &MockServer, retries: u32) -> AssetManager {
    let base_url = Url::parse(&format!("{}/assets/", server.uri())).unwrap();
    let mut http = HttpProviderConfig::new(base_url);
    http.retry = fast_retry(retries);
    let provider = assert_ok!(HttpProvider::new(http));
    assert_ok!(AssetManager::new(
        fast_config(),
        vec![Arc::new(provider) as Arc<dyn AssetProvider>],
    ))
}

fn asset_path(asset_id: AssetId) -> String {
    format!("/assets/{asset_id}")
}

#[tokio::test]
async fn concurrent_requests_share_one_download() {
    let server = MockServer::start().await;
    let asset_id = AssetId::new_v4();
    let body = asset_bytes(4_096);

    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = http_manager(&server, 0);
    let (mut first_handle, first) = assert_ok!(manager.fetch(asset_id, AssetType::Texture).await);
    let (_, second) = assert_ok!(manager.fetch(asset_id, AssetType::Texture).await);

    assert_eq!(
        expect_outcome(first, TIMEOUT).await,
        AssetOutcome::Completed(body.clone())
    );
    assert_eq!(expect_outcome(second, TIMEOUT).await, AssetOutcome::Completed(body));
    assert_eq!(first_handle.finished().await, RequestState::Completed);
}

#[tokio::test]
async fn missing_asset_fails_without_retry() {
    let server = MockServer::start().await;
    let asset_id = AssetId::new_v4();

    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let manager = http_manager(&server, 3);
    let (_, rx) = assert_ok!(manager.fetch(asset_id, AssetType::Mesh).await);

    match expect_outcome(rx, TIMEOUT).await {
        AssetOutcome::Failed(FailureReason::Provider { provider, message }) => {
            assert_eq!(provider, "http");
            assert!(message.contains("not found"), "unexpected message: {message}");
        }
        other => panic!("expected provider failure, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    let asset_id = AssetId::new_v4();

    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"finally".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let manager = http_manager(&server, 3);
    let (_, rx) = assert_ok!(manager.fetch(asset_id, AssetType::Sound).await);

    assert_eq!(
        expect_outcome(rx, TIMEOUT).await,
        AssetOutcome::Completed(Bytes::from_static(b"finally"))
    );
}

#[tokio::test]
async fn persistent_server_error_fails_after_budget() {
    let server = MockServer::start().await;
    let asset_id = AssetId::new_v4();

    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let manager = http_manager(&server, 2);
    let (_, rx) = assert_ok!(manager.fetch(asset_id, AssetType::Sound).await);

    match expect_outcome(rx, TIMEOUT).await {
        AssetOutcome::Failed(FailureReason::Provider { provider, message }) => {
            assert_eq!(provider, "http");
            assert!(message.contains("503"), "unexpected message: {message}");
        }
        other => panic!("expected provider failure, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_body_is_a_failure() {
    let server = MockServer::start().await;
    let asset_id = AssetId::new_v4();

    Mock::given(method("GET"))
        .and(path(asset_path(asset_id)))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let manager = http_manager(&server, 0);
    let (_, rx) = assert_ok!(manager.fetch(asset_id, AssetType::Mesh).await);

    assert!(matches!(
        expect_outcome(rx, TIMEOUT).await,
        AssetOutcome::Failed(FailureReason::Provider { .. })
    ));
}
