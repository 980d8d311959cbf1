//! API client for the CareBridge REST backend.
//!
//! `ApiClient` attaches the bearer credential to every request and routes
//! authentication failures through the shared `SessionGuard`. Resource calls
//! go through `ApiClient::service`, which binds the uniform operation set to
//! one resource path.

use std::sync::Arc;

use reqwest::{Client, Method, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::{SessionData, SessionStore};
use crate::config::Config;
use crate::guard::SessionGuard;
use crate::models::UserProfile;

use super::ApiError;

/// Resource that handles sign-in.
const AUTH_RESOURCE: &str = "auth";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "accessToken", alias = "access_token", alias = "token")]
    access_token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// API client for the CareBridge backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    session: SessionStore,
    /// Pinned credential. When `None` the session store is read per request.
    token: Option<String>,
    guard: Arc<SessionGuard>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("pinned_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client that reads its credential from `session` on every
    /// request. Build one per process and clone it; all clones share `guard`.
    pub fn new(config: &Config, session: SessionStore, guard: Arc<SessionGuard>) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.base_url())
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL {}: {}", config.base_url(), e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "Base URL cannot have paths appended: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            base_url,
            session,
            token: None,
            guard,
        })
    }

    /// Create a new ApiClient pinned to `token`, sharing the connection pool
    /// and the session guard. Changes to the session store do not affect it.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            session: self.session.clone(),
            token: Some(token.into()),
            guard: Arc::clone(&self.guard),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    /// Operations bound to `{base_url}/{name}`.
    pub fn service(&self, name: impl Into<String>) -> Service {
        Service {
            client: self.clone(),
            name: name.into(),
        }
    }

    /// Sign in and store the resulting session.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let auth: AuthResponse = self
            .service(AUTH_RESOURCE)
            .post("login", &LoginRequest { email, password })
            .await?;

        let data = SessionData::new(auth.access_token, auth.user);
        self.session.set_credential(data.clone());
        info!(user = ?data.user.as_ref().map(|u| u.id.as_str()), "Signed in");
        Ok(data)
    }

    /// Clear the shared session. Pinned clients keep their token.
    pub fn sign_out(&self) {
        self.session.clear_credential();
        info!("Signed out");
    }

    /// Credential for the next request.
    fn bearer(&self) -> Option<String> {
        match &self.token {
            Some(token) => Some(token.clone()),
            None => self.session.token(),
        }
    }

    /// Append `segments` to the base URL, one path segment each. Reserved
    /// characters inside a segment, `/` included, are percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidRequest(format!("Invalid base URL {}", self.base_url)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// Issue one request and decode the JSON body.
    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = self.bearer() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, url = %url, "Sending request");
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = ApiError::from_response(status, &text);
            if err.is_unauthorized() {
                let outcome = self.guard.intercept();
                debug!(url = %url, ?outcome, "Unauthorized response");
            } else {
                debug!(url = %url, status = %status, "Request failed");
            }
            return Err(err);
        }

        if text.trim().is_empty() {
            return serde_json::from_value(Value::Null)
                .map_err(|e| ApiError::InvalidResponse(format!("Empty response from {}: {}", url, e)));
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }
}

/// The uniform operation set over one resource.
///
/// Every operation issues exactly one HTTP call. Pick `T = serde_json::Value`
/// to get the body back verbatim.
#[derive(Debug, Clone)]
pub struct Service {
    client: ApiClient,
    name: String,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, rest: &[&str]) -> Result<Url, ApiError> {
        let mut segments = Vec::with_capacity(rest.len() + 1);
        segments.push(self.name.as_str());
        segments.extend_from_slice(rest);
        self.client.url(&segments)
    }

    /// URL for a sub-path below the resource. Unlike ids, `path` may span
    /// several segments.
    fn sub_path_url(&self, path: &str) -> Result<Url, ApiError> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if let Some(dot) = parts.iter().find(|p| is_dot_segment(p)) {
            return Err(ApiError::InvalidRequest(format!(
                "path {:?} must not contain {:?} segments",
                path, dot
            )));
        }
        self.url(&parts)
    }

    /// Ids always map to exactly one path segment.
    fn require<'a>(what: &str, value: &'a str) -> Result<&'a str, ApiError> {
        if value.trim().is_empty() {
            Err(ApiError::InvalidRequest(format!("{} must not be empty", what)))
        } else if is_dot_segment(value) {
            // The URL parser would resolve these against the resource path
            Err(ApiError::InvalidRequest(format!("{} must not be {:?}", what, value)))
        } else {
            Ok(value)
        }
    }

    /// `POST /{resource}`
    pub async fn create<T, B>(&self, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.client.send(Method::POST, self.url(&[])?, Some(body)).await
    }

    /// `GET /{resource}`
    pub async fn find<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.client.send(Method::GET, self.url(&[])?, None::<&()>).await
    }

    /// `GET /{resource}?key=value...`
    pub async fn find_where<T: DeserializeOwned>(&self, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let mut url = self.url(&[])?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.client.send(Method::GET, url, None::<&()>).await
    }

    /// `GET /{resource}/{id}`
    pub async fn find_one<T: DeserializeOwned>(&self, id: &str) -> Result<T, ApiError> {
        let id = Self::require("id", id)?;
        self.client.send(Method::GET, self.url(&[id])?, None::<&()>).await
    }

    /// `GET /{resource}/user/{user_id}`
    pub async fn find_by_user_id<T: DeserializeOwned>(&self, user_id: &str) -> Result<T, ApiError> {
        let user_id = Self::require("user id", user_id)?;
        self.client
            .send(Method::GET, self.url(&["user", user_id])?, None::<&()>)
            .await
    }

    /// `PATCH /{resource}/{id}` with a full replacement body.
    ///
    /// The backend has no PUT; updates and partial patches share the verb.
    pub async fn update<T, B>(&self, id: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.patch(id, body).await
    }

    /// `PATCH /{resource}/{id}`
    pub async fn patch<T, B>(&self, id: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let id = Self::require("id", id)?;
        self.client.send(Method::PATCH, self.url(&[id])?, Some(body)).await
    }

    /// `DELETE /{resource}/{id}`
    pub async fn delete<T: DeserializeOwned>(&self, id: &str) -> Result<T, ApiError> {
        let id = Self::require("id", id)?;
        self.client.send(Method::DELETE, self.url(&[id])?, None::<&()>).await
    }

    /// `POST /{resource}/{path}`
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.client.send(Method::POST, self.sub_path_url(path)?, Some(body)).await
    }

    /// `GET /{resource}/{path}`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.client.send(Method::GET, self.sub_path_url(path)?, None::<&()>).await
    }
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(segment, "." | "..")
}
