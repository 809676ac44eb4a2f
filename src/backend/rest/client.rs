use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::TokenStore;
use crate::error::{BackendError, BackendResult};

/// Error body shapes returned by the hosted auth, table and storage endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for the hosted backend
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    tokens: TokenStore,
}

impl RestClient {
    pub fn new(base_url: &str, anon_key: &str, tokens: TokenStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request carrying the project key and the user's token (anon key when signed out)
    pub async fn request(&self, method: Method, path: &str) -> BackendResult<RequestBuilder> {
        let bearer = match self.tokens.load().await? {
            Some(token) => token,
            None => self.anon_key.clone(),
        };
        Ok(self
            .http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer))
    }

    /// Send and turn non-2xx responses into `BackendError`
    pub async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(parse_error_body(status.as_u16(), &body))
    }
}

/// Percent-encode each segment of an object key, keeping the separators
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn parse_error_body(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = parsed.code.and_then(|c| match c {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            }
        });

    let err = match code {
        Some(code) => BackendError::with_code(code, message),
        None => BackendError::new(message),
    };
    err.with_status(status)
}
