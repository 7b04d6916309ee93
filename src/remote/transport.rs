//! HTTP transport abstraction
//!
//! The Dropbox client only needs single POST round-trips. Keeping them behind
//! a trait lets tests script responses without a network.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ApiError;

/// POST body encodings used by the Dropbox API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    /// `application/json`
    Json(String),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// A POST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: HttpBody,
}

impl HttpRequest {
    /// POST with a JSON body
    pub fn json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            body: HttpBody::Json(body.into()),
        }
    }

    /// POST with a form body
    pub fn form(url: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            body: HttpBody::Form(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Look up a form field by name
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            HttpBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            HttpBody::Json(_) => None,
        }
    }
}

/// A fully-read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_lowercase(), value.into());
        self
    }

    /// Server-requested wait from a `Retry-After: <seconds>` header
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Sends a request and reads the whole response.
///
/// Implementations are shared across calls and must be safe to use from
/// several threads.
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport: Send + Sync {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking `reqwest` transport
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                endpoint: "client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let transport_error = |e: reqwest::Error| ApiError::Transport {
            endpoint: request.url.clone(),
            message: e.to_string(),
        };

        let mut builder = self.client.post(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        builder = match &request.body {
            HttpBody::Json(body) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone()),
            HttpBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
