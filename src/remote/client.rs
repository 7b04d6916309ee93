//! Dropbox API client: identity lookup and recursive folder listing.
//!
//! Every RPC call goes through [`DropboxClient::api_call`], which retries on
//! HTTP 429 with backoff and fails immediately on 401.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError};
use crate::models::{EntryKind, RemoteEntry};
use crate::remote::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Response of `/users/get_current_account`
#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    account_id: String,
}

/// Response of `/files/list_folder` and `/files/list_folder/continue`
#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    #[serde(default)]
    entries: Vec<WireEntry>,
    #[serde(default)]
    cursor: String,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    #[serde(rename = ".tag")]
    tag: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    path_lower: String,
    #[serde(default)]
    path_display: String,
}

impl WireEntry {
    fn into_entry(self) -> Option<RemoteEntry> {
        let kind = EntryKind::from_tag(&self.tag)?;
        Some(RemoteEntry {
            kind,
            id: self.id,
            name: self.name,
            path_lower: self.path_lower,
            path_display: self.path_display,
        })
    }
}

/// Exponential backoff: each step doubles, never above the ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }

    /// Current wait; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

/// Authenticated Dropbox client
pub struct DropboxClient {
    token: String,
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl DropboxClient {
    /// Create a client backed by a blocking `reqwest` transport
    pub fn new(
        token: impl Into<String>,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Ok(Self::with_transport(transport, token, config, cancel))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        token: impl Into<String>,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            token: token.into(),
            transport,
            config,
            cancel,
        }
    }

    /// Retrieve the current user's account ID
    pub fn get_account_id(&self) -> Result<String, ApiError> {
        let body = self.api_call("/users/get_current_account", "null".to_string())?;
        let account: Account = serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            context: "account",
            source,
        })?;

        if account.account_id.is_empty() {
            return Err(ApiError::MissingField("account_id"));
        }
        Ok(account.account_id)
    }

    /// List all file entries under `remote_path`, recursively.
    ///
    /// `remote_path` is `""` for the Dropbox root, never `"/"`.
    pub fn list_folder(&self, remote_path: &str) -> Result<Vec<RemoteEntry>, ApiError> {
        log::debug!("Listing Dropbox folder {:?}", remote_path);

        let request = serde_json::json!({
            "path": remote_path,
            "recursive": true,
        });
        let mut page = self.list_page("/files/list_folder", request)?;
        let mut entries = Vec::new();
        let mut pages = 1;

        loop {
            let before = entries.len();
            entries.extend(
                page.entries
                    .into_iter()
                    .filter_map(WireEntry::into_entry)
                    .filter(RemoteEntry::is_file),
            );
            log::debug!(
                "Page {}: {} files, has_more={}",
                pages,
                entries.len() - before,
                page.has_more
            );

            if !page.has_more {
                break;
            }
            let request = serde_json::json!({ "cursor": page.cursor });
            page = self.list_page("/files/list_folder/continue", request)?;
            pages += 1;
        }

        log::info!("Dropbox listing complete: {} files", entries.len());
        Ok(entries)
    }

    fn list_page(
        &self,
        endpoint: &str,
        request: serde_json::Value,
    ) -> Result<ListFolderResponse, ApiError> {
        let body = self.api_call(endpoint, request.to_string())?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            context: "list_folder",
            source,
        })
    }

    /// POST a JSON body to an RPC endpoint and return the 200 response body.
    ///
    /// The request runs on a helper thread so cancellation also abandons a
    /// call that is still in flight.
    ///
    /// 429 responses are retried until success or cancellation, waiting the
    /// server's `Retry-After` (capped at the backoff ceiling) or the next
    /// backoff step. 401 fails with [`AuthError::Unauthorized`]; any other
    /// status fails with [`ApiError::Status`].
    fn api_call(&self, endpoint: &str, body: String) -> Result<String, ApiError> {
        let url = format!("{}{}", self.config.api_base, endpoint);
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);

        loop {
            if self.cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let request = HttpRequest::json(url.as_str(), body.as_str()).bearer_token(&self.token);
            let transport = Arc::clone(&self.transport);
            let response = self
                .cancel
                .run_until_cancelled(move || transport.post(request))
                .ok_or(ApiError::Cancelled)??;

            match response.status {
                200 => return Ok(response.body),
                401 => return Err(AuthError::Unauthorized.into()),
                429 => {
                    let step = backoff.next_delay();
                    let wait = response
                        .retry_after()
                        .map(|d| d.min(backoff.max()))
                        .unwrap_or(step);
                    log::warn!("Rate limited by Dropbox on {}, waiting {:?}", endpoint, wait);
                    if !self.cancel.sleep(wait) {
                        return Err(ApiError::Cancelled);
                    }
                }
                status => {
                    return Err(ApiError::Status {
                        status,
                        endpoint: endpoint.to_string(),
                        body: response.body,
                    })
                }
            }
        }
    }
}
