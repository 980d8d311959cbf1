use std::time::Duration;

use carebridge_core::{avatar_key, FirebaseStorage, ObjectStorage, StorageError};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "care-app.appspot.com";

fn storage(server: &MockServer) -> FirebaseStorage {
    FirebaseStorage::with_endpoint(BUCKET, &format!("{}/v0", server.uri())).unwrap()
}

#[tokio::test]
async fn test_upload_avatar_returns_download_url() {
    let server = MockServer::start().await;
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let key = avatar_key("u1", "portrait.png", at);

    Mock::given(method("POST"))
        .and(path(format!("/v0/b/{}/o", BUCKET)))
        .and(query_param("name", key.as_str()))
        .and(header("content-type", "image/png"))
        .and(header("authorization", "Firebase id-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": key,
            "bucket": BUCKET,
            "contentType": "image/png",
            "downloadTokens": "dl-1,dl-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = storage(&server)
        .with_id_token("id-token")
        .upload(&key, vec![0x89, 0x50, 0x4e, 0x47], "image/png")
        .await
        .unwrap();

    assert_eq!(
        url,
        format!(
            "{}/v0/b/{}/o/user-profiles%2Fu1%2Favatar%2F1709294400000_portrait.png?alt=media&token=dl-1",
            server.uri(),
            BUCKET
        )
    );
}

#[tokio::test]
async fn test_download_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v0/b/{}/o/care-plans%2Fu1%2Fplan.pdf", BUCKET)))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .mount(&server)
        .await;

    let bytes = storage(&server).download("care-plans/u1/plan.pdf").await.unwrap();
    assert_eq!(bytes, b"%PDF-1.7");
}

#[tokio::test]
async fn test_storage_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;
    let storage = storage(&server);

    assert!(matches!(
        storage.download("missing/file.txt").await,
        Err(StorageError::NotFound(key)) if key == "missing/file.txt"
    ));
    match storage.upload("docs/a.txt", b"hi".to_vec(), "text/plain").await {
        Err(StorageError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(body, "Permission denied");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_storage_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let storage = storage(&server).with_timeout(Duration::from_millis(100)).unwrap();

    match storage.download("care-plans/u1/plan.pdf").await {
        Err(StorageError::NetworkError(e)) => assert!(e.is_timeout()),
        other => panic!("unexpected result: {other:?}"),
    }
}
