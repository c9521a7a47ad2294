//! Integration tests for the local HTTP API.

use procwarden::api;
use tokio_util::sync::CancellationToken;

use super::test_helpers::write_entry_asset;

type Server = tokio::task::JoinHandle<procwarden::Result<()>>;

async fn start(asset: std::path::PathBuf) -> (String, CancellationToken, Server) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let ct = CancellationToken::new();
    let handle = tokio::spawn(api::serve(listener, asset, ct.clone()));
    (base, ct, handle)
}

#[tokio::test]
async fn health_answers_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (base, ct, handle) = start(write_entry_asset(dir.path())).await;

    let response = reqwest::get(format!("{base}/health")).await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), "ok");

    ct.cancel();
    handle.await.expect("join").expect("serve");
}

#[tokio::test]
async fn root_serves_the_entry_asset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (base, ct, handle) = start(write_entry_asset(dir.path())).await;

    let response = reqwest::get(format!("{base}/")).await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), "<html>procwarden</html>");

    ct.cancel();
    handle.await.expect("join").expect("serve");
}

#[tokio::test]
async fn root_is_not_found_when_the_asset_disappears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = write_entry_asset(dir.path());
    let (base, ct, handle) = start(asset.clone()).await;
    std::fs::remove_file(&asset).expect("remove asset");

    let response = reqwest::get(format!("{base}/")).await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    ct.cancel();
    handle.await.expect("join").expect("serve");
}
