use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{validate_key, ObjectStorage, StorageError};
use crate::config::Config;

/// Public Firebase Storage REST endpoint.
const FIREBASE_STORAGE_ENDPOINT: &str = "https://firebasestorage.googleapis.com/v0";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
    /// Comma separated; the first token is used for the download URL.
    #[serde(rename = "downloadTokens")]
    download_tokens: Option<String>,
}

/// Firebase Storage over its REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct FirebaseStorage {
    client: Client,
    endpoint: Url,
    bucket: String,
    timeout: Duration,
    /// Firebase ID token, when the bucket rules require a signed-in user.
    id_token: Option<String>,
}

impl FirebaseStorage {
    pub fn new(bucket: impl Into<String>) -> Result<Self, StorageError> {
        Self::with_endpoint(bucket, FIREBASE_STORAGE_ENDPOINT)
    }

    /// Storage for the configured bucket, sharing the API request timeout.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let bucket = config
            .storage_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("no storage bucket set".to_string()))?;
        Self::new(bucket)?.with_timeout(config.request_timeout())
    }

    /// Point at another endpoint, e.g. the storage emulator.
    pub fn with_endpoint(bucket: impl Into<String>, endpoint: &str) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| StorageError::InvalidResponse(format!("Invalid storage endpoint {}: {}", endpoint, e)))?;
        let timeout = Config::default().request_timeout();
        Ok(Self {
            client: Self::build_client(timeout)?,
            endpoint,
            bucket: bucket.into(),
            timeout,
            id_token: None,
        })
    }

    /// Replace the per-request timeout. Transfers that exceed it fail with
    /// `StorageError::NetworkError`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, StorageError> {
        self.client = Self::build_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_client(timeout: Duration) -> Result<Client, StorageError> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    /// `{endpoint}/b/{bucket}/o` plus the object name as one escaped segment.
    fn object_url(&self, key: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidResponse(format!("Invalid storage endpoint {}", self.endpoint)))?;
            path.pop_if_empty().extend(["b", self.bucket.as_str(), "o"]);
            if let Some(key) = key {
                path.push(key);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.id_token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Firebase {}", token)),
            None => request,
        }
    }

    async fn check(response: reqwest::Response, key: &str) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(StorageError::NotFound(key.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Status { status, body })
        }
    }
}

#[async_trait]
impl ObjectStorage for FirebaseStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        let mut url = self.object_url(None)?;
        url.query_pairs_mut().append_pair("name", key);

        debug!(key = key, bytes = data.len(), "Uploading object");
        let request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(data);
        let response = Self::check(self.authorize(request).send().await?, key).await?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("Failed to parse upload response: {}", e)))?;

        let mut download = self.object_url(Some(&uploaded.name))?;
        {
            let mut query = download.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = uploaded
                .download_tokens
                .as_deref()
                .and_then(|t| t.split(',').next())
                .filter(|t| !t.is_empty())
            {
                query.append_pair("token", token);
            }
        }
        Ok(download.to_string())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let mut url = self.object_url(Some(key))?;
        url.query_pairs_mut().append_pair("alt", "media");

        debug!(key = key, "Downloading object");
        let response = Self::check(self.authorize(self.client.get(url)).send().await?, key).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_escapes_key() {
        let storage = FirebaseStorage::new("care-app.appspot.com").unwrap();
        let url = storage
            .object_url(Some("user-profiles/u1/avatar/1_me.png"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/care-app.appspot.com/o/user-profiles%2Fu1%2Favatar%2F1_me.png"
        );
    }

    #[test]
    fn test_timeout_follows_config() {
        let storage = FirebaseStorage::new("care-app.appspot.com").unwrap();
        assert_eq!(storage.timeout(), Duration::from_secs(30));

        let config = Config {
            storage_bucket: Some("care-app.appspot.com".to_string()),
            request_timeout_secs: 5,
            ..Config::default()
        };
        let storage = FirebaseStorage::from_config(&config).unwrap();
        assert_eq!(storage.timeout(), Duration::from_secs(5));
        assert_eq!(storage.bucket, "care-app.appspot.com");

        assert!(matches!(
            FirebaseStorage::from_config(&Config::default()),
            Err(StorageError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_parse_upload_response() {
        let json = r#"{"name":"user-profiles/u1/avatar/1_me.png","bucket":"care-app.appspot.com","contentType":"image/png","downloadTokens":"tok-a,tok-b"}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.name, "user-profiles/u1/avatar/1_me.png");
        assert_eq!(resp.download_tokens.as_deref(), Some("tok-a,tok-b"));
    }
}
