//! In-memory transport for exercising the client without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tokio::sync::Notify;

use super::request::{ApiRequest, RequestBody, REFRESH_PATH};
use super::transport::{HttpTransport, RawResponse};
use super::ApiError;

const EMPTY_OK: &str = r#"{"errorMessage":null,"errorCode":0,"data":null}"#;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

/// Login/refresh body handing out `token` for a fixed test identity
pub fn auth_body(token: &str) -> String {
    format!(
        r#"{{"errorMessage":null,"errorCode":0,"data":{{"accessToken":"{}","userSessionResponse":{{"id":42,"email":"lan@example.com","name":"Tran Thi Lan","avatarUrl":null}}}}}}"#,
        token
    )
}

/// Answers requests from a script.
///
/// Resource requests succeed when they carry the accepted token (or when no
/// token is configured) and get 401 otherwise. Queued responses for a path
/// take precedence over that rule.
pub struct ScriptedTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    accepted_token: Mutex<Option<String>>,
    routes: Mutex<HashMap<String, String>>,
    queued: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    refresh_response: Mutex<RawResponse>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            accepted_token: Mutex::new(None),
            routes: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            refresh_response: Mutex::new(RawResponse::new(StatusCode::UNAUTHORIZED, "")),
            refresh_gate: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn accept_token(&self, token: &str) {
        *self.accepted_token.lock().unwrap() = Some(token.to_string());
    }

    /// Success body for `path`
    pub fn route(&self, path: &str, body: impl Into<String>) {
        self.routes.lock().unwrap().insert(path.to_string(), body.into());
    }

    /// One-shot response for the next request to `path`
    pub fn respond(&self, path: &str, status: StatusCode, body: impl Into<String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(RawResponse::new(status, body));
    }

    pub fn on_refresh(&self, status: StatusCode, body: impl Into<String>) {
        *self.refresh_response.lock().unwrap() = RawResponse::new(status, body);
    }

    /// Hold refresh calls until the returned gate is notified
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_refresh_calls(&self, count: usize) {
        while self.refresh_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn resource_response(&self, request: &ApiRequest) -> RawResponse {
        if let Some(queued) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
        {
            return queued;
        }

        let accepted = self.accepted_token.lock().unwrap().clone();
        if let Some(accepted) = accepted {
            if request.bearer_token() != Some(accepted.as_str()) {
                return RawResponse::new(
                    StatusCode::UNAUTHORIZED,
                    r#"{"errorMessage":"Token expired","errorCode":401,"data":null}"#,
                );
            }
        }

        let body = self
            .routes
            .lock()
            .unwrap()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| EMPTY_OK.to_string());
        RawResponse::new(StatusCode::OK, body)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            bearer: request.bearer_token().map(str::to_string),
            body: request.body.clone(),
        });

        if request.path == REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.refresh_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            return Ok(self.refresh_response.lock().unwrap().clone());
        }

        Ok(self.resource_response(request))
    }
}
