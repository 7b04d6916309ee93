//! OAuth2 token endpoint calls for apps using offline (refresh-token) access

use serde::Deserialize;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError};
use crate::remote::transport::{HttpRequest, HttpTransport, ReqwestTransport};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

/// Tokens returned by an authorization-code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Client for the OAuth2 token endpoint
pub struct OAuthClient {
    transport: Arc<dyn HttpTransport>,
    token_endpoint: String,
    authorize_url: String,
}

impl OAuthClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Ok(Self::with_transport(transport, config))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            token_endpoint: config.token_endpoint.clone(),
            authorize_url: config.authorize_url.clone(),
        }
    }

    /// Exchange a refresh token for a short-lived access token
    pub fn refresh_access_token(
        &self,
        app_key: &str,
        app_secret: &str,
        refresh_token: &str,
    ) -> Result<String, ApiError> {
        let request = HttpRequest::form(
            self.token_endpoint.as_str(),
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", app_key),
                ("client_secret", app_secret),
            ],
        );
        let response = self.transport.post(request)?;
        if response.status != 200 {
            return Err(AuthError::RefreshRejected {
                status: response.status,
                body: response.body,
            }
            .into());
        }

        let token = decode(&response.body)?;
        if token.access_token.is_empty() {
            return Err(AuthError::MissingToken("access_token").into());
        }
        log::debug!("Obtained access token via refresh token");
        Ok(token.access_token)
    }

    /// Exchange a one-time authorization code for a refresh/access token pair
    pub fn exchange_authorization_code(
        &self,
        app_key: &str,
        app_secret: &str,
        code: &str,
    ) -> Result<TokenPair, ApiError> {
        let request = HttpRequest::form(
            self.token_endpoint.as_str(),
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", app_key),
                ("client_secret", app_secret),
            ],
        );
        let response = self.transport.post(request)?;
        if response.status != 200 {
            return Err(AuthError::ExchangeRejected {
                status: response.status,
                body: response.body,
            }
            .into());
        }

        let token = decode(&response.body)?;
        if token.refresh_token.is_empty() {
            return Err(AuthError::MissingToken("refresh_token").into());
        }
        if token.access_token.is_empty() {
            return Err(AuthError::MissingToken("access_token").into());
        }
        Ok(TokenPair {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }

    /// URL the user visits to grant offline access to the app
    pub fn authorization_url(&self, app_key: &str) -> String {
        let params = [
            ("client_id", app_key),
            ("response_type", "code"),
            ("token_access_type", "offline"),
        ];
        match reqwest::Url::parse_with_params(&self.authorize_url, &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}?client_id={}&response_type=code&token_access_type=offline",
                self.authorize_url, app_key
            ),
        }
    }
}

fn decode(body: &str) -> Result<TokenResponse, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        context: "token",
        source,
    })
}
