//! Outgoing request descriptors and bearer-token attachment.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use tracing::warn;

use crate::auth::CredentialStore;

use super::ApiError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// One part of a multipart form. Kept as plain data so a request can be
/// re-sent after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Json {
        name: String,
        value: serde_json::Value,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// Method, path (relative to the API base URL), query, headers and body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    fn targets(&self, path: &str) -> bool {
        let own = self.path.split('?').next().unwrap_or_default();
        own.trim_end_matches('/') == path
    }

    pub fn is_refresh(&self) -> bool {
        self.targets(REFRESH_PATH)
    }

    pub fn is_login(&self) -> bool {
        self.targets(LOGIN_PATH)
    }

    /// Token carried in the `Authorization` header, if any
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Whether a request has already been re-sent after a token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    NotRetried,
    Retried,
}

/// A logical request together with its one-shot retry marker.
#[derive(Debug)]
pub struct TrackedRequest {
    request: ApiRequest,
    retry: RetryState,
}

impl TrackedRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retry: RetryState::NotRetried,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// A 401 on this request may be answered with a refresh: it has not been
    /// retried yet and it is not the login or refresh call itself.
    pub fn may_refresh(&self) -> bool {
        self.retry == RetryState::NotRetried
            && !self.request.is_login()
            && !self.request.is_refresh()
    }

    /// Consume the request, marking it as retried
    pub fn into_retry(self) -> Self {
        Self {
            request: self.request,
            retry: RetryState::Retried,
        }
    }
}

/// Attaches the current access credential to outgoing requests.
#[derive(Clone)]
pub struct RequestAuthenticator {
    credentials: Arc<CredentialStore>,
}

impl RequestAuthenticator {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Attach the stored credential, unless the request is the refresh call
    pub fn decorate(&self, request: &mut ApiRequest) {
        if let Some(token) = self.credentials.get() {
            self.decorate_with(request, &token);
        }
    }

    /// Attach an explicit credential, unless the request is the refresh call
    pub fn decorate_with(&self, request: &mut ApiRequest, token: &str) {
        if token.is_empty() || request.is_refresh() {
            return;
        }
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                request.headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => warn!("Stored access token is not a valid header value, sending without it"),
        }
    }
}
