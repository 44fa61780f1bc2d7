//! HTTP transport used by the API client.
//!
//! `HttpTransport` is the seam between request/refresh logic and the network.
//! `ReqwestTransport` is the production implementation: a pooled reqwest
//! client with a cookie jar. The jar is where the backend's HTTP-only refresh
//! cookie lives; its `Set-Cookie` values are mirrored to disk so the refresh
//! capability survives a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::request::{ApiRequest, FormPart, RequestBody};
use super::ApiError;

/// Cookie file name in the state directory
const COOKIE_FILE: &str = "cookies.json";

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request as-is. Only transport-level failures are errors;
    /// every HTTP status comes back as a `RawResponse`.
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    cookies: Arc<CookieFile>,
}

impl ReqwestTransport {
    /// Create a transport for `base_url`. When `state_dir` is given, cookies
    /// are loaded from and saved to `<state_dir>/cookies.json`.
    pub fn new(base_url: &str, timeout: Duration, state_dir: Option<&Path>) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url)?;

        let jar = Arc::new(Jar::default());
        let cookies = Arc::new(CookieFile::load(
            state_dir.map(|dir| dir.join(COOKIE_FILE)),
        ));
        for value in cookies.values() {
            jar.add_cookie_str(&value, &origin);
        }

        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(jar)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
                headers
            })
            .build()?;

        Ok(Self {
            client,
            base_url,
            cookies,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build_form(parts: &[FormPart]) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                FormPart::Json { name, value } => {
                    let text = serde_json::to_string(value)?;
                    form.part(name.clone(), Part::text(text).mime_str("application/json")?)
                }
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => form.part(
                    name.clone(),
                    Part::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str(mime)?,
                ),
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let url = self.url(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
        };

        let response = builder.send().await?;
        let status = response.status();

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if !set_cookies.is_empty() {
            self.cookies.record(&set_cookies);
        }

        let body = response.text().await?;
        debug!(method = %request.method, url = %url, status = status.as_u16(), "Request completed");

        Ok(RawResponse { status, body })
    }
}

/// `Set-Cookie` values by cookie name, mirrored to a JSON file.
struct CookieFile {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, String>>,
}

impl CookieFile {
    fn load(path: Option<PathBuf>) -> Self {
        let values = path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|contents| match serde_json::from_str(&contents) {
                Ok(values) => Some(values),
                Err(e) => {
                    warn!(error = %e, "Ignoring corrupt cookie file");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> Vec<String> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn record(&self, set_cookies: &[String]) {
        let snapshot = {
            let mut values = self
                .values
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for raw in set_cookies {
                let Some(name) = cookie_name(raw) else {
                    continue;
                };
                if is_expiring(raw) {
                    values.remove(name);
                } else {
                    values.insert(name.to_string(), raw.clone());
                }
            }
            values.clone()
        };

        let Some(ref path) = self.path else {
            return;
        };
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist cookies");
        }
    }
}

fn cookie_name(raw: &str) -> Option<&str> {
    let (name, _) = raw.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// A cookie the server is deleting (logout answers with `Max-Age=0`)
fn is_expiring(raw: &str) -> bool {
    raw.split(';')
        .skip(1)
        .map(|attr| attr.trim().to_ascii_lowercase())
        .any(|attr| attr == "max-age=0" || attr.starts_with("max-age=-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_name() {
        assert_eq!(cookie_name("refreshToken=abc; HttpOnly; Path=/auth"), Some("refreshToken"));
        assert_eq!(cookie_name("=abc"), None);
        assert_eq!(cookie_name("garbage"), None);
    }

    #[test]
    fn test_is_expiring() {
        assert!(is_expiring("refreshToken=; Max-Age=0; Path=/"));
        assert!(!is_expiring("refreshToken=abc; Max-Age=604800; HttpOnly"));
    }

    #[test]
    fn test_cookie_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("certdash-cookies-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join(COOKIE_FILE);

        let file = CookieFile::load(Some(path.clone()));
        file.record(&["refreshToken=abc; HttpOnly; Path=/".to_string()]);

        let reloaded = CookieFile::load(Some(path.clone()));
        assert_eq!(reloaded.values(), vec!["refreshToken=abc; HttpOnly; Path=/".to_string()]);

        reloaded.record(&["refreshToken=; Max-Age=0".to_string()]);
        assert!(CookieFile::load(Some(path)).values().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_url_joins_paths() {
        let transport = ReqwestTransport::new("http://localhost:8080/", Duration::from_secs(5), None)
            .expect("build transport");
        assert_eq!(transport.url("/users/me"), "http://localhost:8080/users/me");
        assert_eq!(transport.url("organizations"), "http://localhost:8080/organizations");
    }
}
