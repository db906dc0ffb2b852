//! OAuth2 credential acquisition for the Gmail API
//!
//! The cached token lives in `token.json` using the authorized-user layout
//! (`token`, `refresh_token`, `token_uri`, `client_id`, `client_secret`,
//! `scopes`, `expiry`). [`CredentialManager::acquire`] decides between the
//! cached token, a refresh, and the interactive installed-app flow; the
//! network side of the last two sits behind [`AuthorizationFlow`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{GmailError, Result};

/// Read-only scope, the only one the export needs
pub const READONLY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Google's OAuth2 token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A token expiring within this window is treated as already expired
const EXPIRY_SKEW_SECS: i64 = 300;

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Cached authorization token bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token sent with API calls
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl Credential {
    /// True when an expiry is known and `now` is within the skew window of it
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map(|expiry| now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry)
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// An access token is present and not expired
    pub fn is_valid(&self) -> bool {
        self.token.is_some() && !self.is_expired()
    }

    pub fn access_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| GmailError::AuthError("Credential has no access token".to_string()))
    }

    /// Load a cached credential; `None` when the file does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached token at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let credential = serde_json::from_str(&content).map_err(|e| {
            GmailError::ConfigError(format!("Malformed token file {:?}: {}", path, e))
        })?;
        Ok(Some(credential))
    }

    /// Overwrite the token file and restrict it to the owner
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        secure_token_file(path).await?;
        debug!("Saved token to {:?}", path);
        Ok(())
    }
}

/// Network side of credential acquisition
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Exchange the refresh token for a new access token.
    ///
    /// Must return [`GmailError::TokenRefreshRejected`] when the provider
    /// refuses the refresh token; any other error is treated as fatal.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run the interactive consent flow
    async fn authorize(&self) -> Result<Credential>;
}

/// Loads, refreshes or replaces the cached credential
pub struct CredentialManager {
    token_path: PathBuf,
    flow: Box<dyn AuthorizationFlow>,
}

impl CredentialManager {
    pub fn new(token_path: impl Into<PathBuf>, flow: Box<dyn AuthorizationFlow>) -> Self {
        Self {
            token_path: token_path.into(),
            flow,
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Return a usable credential, persisting it whenever it changed
    pub async fn acquire(&self) -> Result<Credential> {
        let cached = Credential::load(&self.token_path).await?;

        let credential = match cached {
            Some(credential) if credential.is_valid() => {
                debug!("Using cached token from {:?}", self.token_path);
                return Ok(credential);
            }
            Some(credential) if credential.refresh_token.is_some() => {
                info!("Cached token is no longer valid, refreshing");
                match self.flow.refresh(&credential).await {
                    Ok(refreshed) => refreshed,
                    Err(GmailError::TokenRefreshRejected(reason)) => {
                        warn!(
                            "Refresh token rejected ({}), falling back to interactive authorization",
                            reason
                        );
                        self.flow.authorize().await?
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {
                info!("No usable cached token, starting interactive authorization");
                self.flow.authorize().await?
            }
        };

        credential.save(&self.token_path).await?;
        info!("Token cached at {:?}", self.token_path);
        Ok(credential)
    }
}

/// Installed-application flow backed by yup-oauth2
///
/// The interactive step binds a local listener for the redirect and prints
/// the consent URL; it never opens a browser.
pub struct InstalledAppFlow {
    credentials_path: PathBuf,
    scopes: Vec<String>,
    port: u16,
}

impl InstalledAppFlow {
    pub fn new(credentials_path: impl Into<PathBuf>, scopes: Vec<String>, port: u16) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            scopes,
            port,
        }
    }

    fn return_method(&self) -> yup_oauth2::InstalledFlowReturnMethod {
        if self.port == 0 {
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect
        } else {
            yup_oauth2::InstalledFlowReturnMethod::HTTPPortRedirect(self.port)
        }
    }

    /// Scratch file the authenticator persists into, so the refresh token
    /// can be read back after the flow completes
    fn scratch_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!(
            "gmail-label-export-authflow-{}.json",
            std::process::id()
        ))
    }
}

#[async_trait]
impl AuthorizationFlow for InstalledAppFlow {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential.refresh_token.clone().ok_or_else(|| {
            GmailError::AuthError("Cannot refresh a credential without a refresh token".to_string())
        })?;

        let secret = yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            refresh_token: refresh_token.clone(),
            key_type: "authorized_user".to_string(),
        };

        let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        let scopes = if credential.scopes.is_empty() {
            &self.scopes
        } else {
            &credential.scopes
        };

        let access = auth.token(scopes.as_slice()).await.map_err(|e| match e {
            yup_oauth2::Error::AuthError(err) => GmailError::TokenRefreshRejected(err.to_string()),
            other => GmailError::AuthError(format!("Token refresh failed: {}", other)),
        })?;

        Ok(Credential {
            token: access.token().map(str::to_string),
            refresh_token: Some(refresh_token),
            token_uri: credential.token_uri.clone(),
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            scopes: scopes.clone(),
            expiry: access
                .expiration_time()
                .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0)),
        })
    }

    async fn authorize(&self) -> Result<Credential> {
        let secret = read_application_secret(&self.credentials_path).await?;

        let scratch = self.scratch_path();
        let _ = tokio::fs::remove_file(&scratch).await;

        let auth =
            yup_oauth2::InstalledFlowAuthenticator::builder(secret.clone(), self.return_method())
                .persist_tokens_to_disk(&scratch)
                .build()
                .await
                .map_err(|e| {
                    GmailError::AuthError(format!("Failed to build authenticator: {}", e))
                })?;

        let access = auth.token(self.scopes.as_slice()).await.map_err(|e| {
            GmailError::AuthError(format!("Interactive authorization failed: {}", e))
        })?;

        let refresh_token = read_persisted_refresh_token(&scratch).await;
        let _ = tokio::fs::remove_file(&scratch).await;
        if refresh_token.is_none() {
            warn!("Authorization did not return a refresh token; the next run will prompt again");
        }

        Ok(Credential {
            token: access.token().map(str::to_string),
            refresh_token,
            token_uri: secret.token_uri,
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            scopes: self.scopes.clone(),
            expiry: access
                .expiration_time()
                .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0)),
        })
    }
}

/// Read the application client secret (Google "installed" or "web" JSON)
pub async fn read_application_secret(path: &Path) -> Result<yup_oauth2::ApplicationSecret> {
    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GmailError::ConfigError(format!(
                "Application credentials file not found at {:?}",
                path
            )),
            _ => GmailError::ConfigError(format!(
                "Failed to read application credentials {:?}: {}",
                path, e
            )),
        })
}

/// Pull the refresh token out of yup-oauth2's on-disk token list
async fn read_persisted_refresh_token(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&content).ok()?;
    entries.iter().find_map(|entry| {
        entry
            .get("token")?
            .get("refresh_token")?
            .as_str()
            .map(str::to_string)
    })
}

/// Acquire a credential with the installed-app flow
pub async fn acquire(
    token_path: &Path,
    credentials_path: &Path,
    scopes: &[String],
    oauth2_port: u16,
) -> Result<Credential> {
    let flow = InstalledAppFlow::new(credentials_path, scopes.to_vec(), oauth2_port);
    CredentialManager::new(token_path, Box::new(flow))
        .acquire()
        .await
}

/// Where the hub takes its access tokens from
#[derive(Debug, Clone)]
pub enum HubTokenSource {
    /// Authorized-user authenticator; refreshes the access token as it expires
    Refreshing(yup_oauth2::authorized_user::AuthorizedUserSecret),
    /// The cached access token as-is, valid only until `expiry`
    Static(String),
}

impl HubTokenSource {
    /// Prefer refreshing whenever the credential carries a refresh token
    pub fn for_credential(credential: &Credential) -> Result<Self> {
        match &credential.refresh_token {
            Some(refresh_token) if !credential.client_id.is_empty() => {
                Ok(HubTokenSource::Refreshing(
                    yup_oauth2::authorized_user::AuthorizedUserSecret {
                        client_id: credential.client_id.clone(),
                        client_secret: credential.client_secret.clone(),
                        refresh_token: refresh_token.clone(),
                        key_type: "authorized_user".to_string(),
                    },
                ))
            }
            _ => Ok(HubTokenSource::Static(credential.access_token()?.to_string())),
        }
    }
}

/// Build a Gmail hub for the credential
pub async fn build_gmail_hub(credential: &Credential) -> Result<GmailHub> {
    let source = HubTokenSource::for_credential(credential)?;

    // Use HTTP/1 for compatibility (HTTP/2 is default but HTTP/1 works better with google-gmail1)
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    match source {
        HubTokenSource::Refreshing(secret) => {
            let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
                .build()
                .await
                .map_err(|e| {
                    GmailError::AuthError(format!("Failed to build authenticator: {}", e))
                })?;
            debug!("Gmail hub refreshes its access token through the refresh token");
            Ok(Gmail::new(client, auth))
        }
        HubTokenSource::Static(token) => {
            warn!("No refresh token cached; API calls fail once the access token expires");
            Ok(Gmail::new(client, token))
        }
    }
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs instead of Unix permissions
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
