//! Stored refresh credentials
//!
//! Saved by the `auth` subcommand so later runs can mint access tokens
//! without user interaction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::APP_DIR;
use crate::error::Error;
use crate::remote::OAuthClient;

const CREDENTIALS_FILE: &str = "credentials.json";

/// App key, app secret and refresh token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// All three values are present
    pub fn is_complete(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty() && !self.refresh_token.is_empty()
    }

    /// Default location under the user's config directory
    pub fn default_path() -> Result<PathBuf, Error> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;
        Ok(dir.join(APP_DIR).join(CREDENTIALS_FILE))
    }

    /// Load from the default location. `Ok(None)` when nothing was saved.
    pub fn load() -> Result<Option<Self>, Error> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn save(&self) -> Result<PathBuf, Error> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, Error> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io("reading credentials file", e)),
        };
        let creds = serde_json::from_str(&data).map_err(|source| Error::Json {
            context: "credentials file",
            source,
        })?;
        Ok(Some(creds))
    }

    /// Write as pretty JSON. On Unix the directory is 0700 and the file 0600.
    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(dir) = path.parent() {
            create_private_dir(dir)
                .map_err(|e| Error::io("creating config directory", e))?;
        }

        let mut data = serde_json::to_string_pretty(self).map_err(|source| Error::Json {
            context: "credentials",
            source,
        })?;
        data.push('\n');

        write_private_file(path, data.as_bytes())
            .map_err(|e| Error::io("writing credentials file", e))
    }
}

/// Turn whatever the operator supplied into a bearer token.
///
/// Order: an explicit complete triple, then stored credentials, then a
/// direct token. Refresh failures are returned as-is rather than falling
/// through to the next source.
pub fn resolve_token(
    oauth: &OAuthClient,
    explicit: &Credentials,
    stored: Option<&Credentials>,
    direct_token: Option<&str>,
) -> Result<String, Error> {
    if explicit.is_complete() {
        log::info!("Refreshing Dropbox access token");
        return refresh(oauth, explicit);
    }

    if let Some(creds) = stored.filter(|c| c.is_complete()) {
        log::info!("Using stored credentials, refreshing access token");
        return refresh(oauth, creds);
    }

    if let Some(token) = direct_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    Err(Error::Config(
        "Dropbox authentication required. Either:\n  \
         - Provide --app-key, --app-secret, and --refresh-token\n  \
         - Provide --token or DROPBOX_TOKEN env var (short-lived, expires in ~4h)\n  \
         - Run `auth` interactively to set up credentials (one-time setup)"
            .to_string(),
    ))
}

fn refresh(oauth: &OAuthClient, creds: &Credentials) -> Result<String, Error> {
    let token = oauth.refresh_access_token(&creds.app_key, &creds.app_secret, &creds.refresh_token)?;
    log::info!("Access token refreshed");
    Ok(token)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(path, data)
}
