//! Request description and bearer tagging
//!
//! An `ApiRequest` is an owned, replayable description of a call. It is
//! turned into a `reqwest::RequestBuilder` on every attempt, so the same
//! request can be re-tagged with a fresh token after a refresh.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::ApiError;

/// A caller's request: method, path, query, body and extra headers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Join a request path onto the base URL, keeping the base's own path.
pub fn join_url(base_url: &str, path: &str) -> Result<Url, ApiError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", joined, e)))
}

/// Build the outgoing request, attaching `Authorization: Bearer <token>`
/// when a token is present. Pure: reads nothing but its arguments.
pub fn tag(
    request: &ApiRequest,
    http: &reqwest::Client,
    base_url: &str,
    token: Option<&str>,
) -> Result<RequestBuilder, ApiError> {
    let url = join_url(base_url, &request.path)?;

    let mut builder = http.request(request.method.clone(), url);
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    if let Some(ref body) = request.body {
        builder = builder.json(body);
    }

    Ok(builder)
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub path: String,
    pub body: String,
}

impl ApiResponse {
    /// Parse the body. An empty body (e.g. 204) parses as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).map_err(|source| ApiError::Decode {
            path: self.path.clone(),
            source,
        })
    }
}
