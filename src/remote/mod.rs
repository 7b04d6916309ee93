//! Dropbox access: HTTP transport, API client, OAuth and local root discovery

pub mod auth;
pub mod client;
pub mod info;
pub mod transport;

pub use auth::{OAuthClient, TokenPair};
pub use client::{Backoff, DropboxClient};
pub use info::{compute_remote_path, detect_root_path};
pub use transport::{HttpBody, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
