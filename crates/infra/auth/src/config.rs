//! Credentials, endpoints and client configuration

use crate::error::{FreetradeError, FtResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default key file name searched in the working directory and config dir
pub const KEY_FILE_NAME: &str = "ft-keys.json";

/// Default session file name searched in the working directory and config dir
pub const SESSION_FILE_NAME: &str = "ft-session.json";

/// User agent of the Android app the backend expects
pub const DEFAULT_USER_AGENT: &str =
    "Freetrade/1.0.4756-4756 Dalvik/2.1.0 (Linux; U; Android 9; SM-G965U Build/PPR1.180610.011)";

/// Identity provider endpoint exchanging a custom token for session tokens
pub const DEFAULT_VERIFY_CUSTOM_TOKEN_URL: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/verifyCustomToken";

/// Identity provider endpoint exchanging a refresh token
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Static API keys and hosts loaded from the key file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Host of the OTP login service
    #[serde(rename = "prod_auth_dealstream_host")]
    pub auth_host: String,
    /// Host of the account API
    #[serde(rename = "prod_dealstream_host")]
    pub api_host: String,
    /// Identity provider API key
    #[serde(rename = "google_android_device_verification_api_key")]
    pub android_verification_api_key: String,
}

impl Credentials {
    /// Load credentials from an explicit key file or the default locations
    ///
    /// # Errors
    /// Returns an error if no candidate exists or the found file is invalid
    pub fn load(key_file: Option<&Path>) -> FtResult<Self> {
        let candidates = match key_file {
            Some(path) => vec![path.to_path_buf()],
            None => default_candidates(KEY_FILE_NAME),
        };

        let path = candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| FreetradeError::Credentials {
                message: format!("No key file found at {candidates:?}"),
            })?;

        Self::from_key_file(path)
    }

    /// Parse a key file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or lacks a required key
    pub fn from_key_file(path: &Path) -> FtResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| FreetradeError::Credentials {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;

        let credentials: Self =
            serde_json::from_str(&content).map_err(|e| FreetradeError::Credentials {
                message: format!("Invalid key file {}: {e}", path.display()),
            })?;

        info!("Loaded credentials from {}", path.display());
        Ok(credentials)
    }
}

/// Base URLs of the services the client talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// OTP login service, e.g. `https://auth.example.com`
    pub auth_base_url: String,
    /// Account API service
    pub api_base_url: String,
    /// Custom token exchange endpoint (without `?key=`)
    pub verify_custom_token_url: String,
    /// Refresh token exchange endpoint (without `?key=`)
    pub secure_token_url: String,
}

impl Endpoints {
    /// Production endpoints for the given credentials
    #[must_use]
    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            auth_base_url: format!("https://{}", credentials.auth_host),
            api_base_url: format!("https://{}", credentials.api_host),
            verify_custom_token_url: DEFAULT_VERIFY_CUSTOM_TOKEN_URL.to_string(),
            secure_token_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
        }
    }

    /// Route every endpoint to one base URL (local mocks)
    #[must_use]
    pub fn single_host(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            auth_base_url: format!("{base}/auth"),
            api_base_url: format!("{base}/api"),
            verify_custom_token_url: format!(
                "{base}/identitytoolkit/v3/relyingparty/verifyCustomToken"
            ),
            secure_token_url: format!("{base}/v1/token"),
        }
    }
}

/// Freetrade client configuration
#[derive(Debug, Clone)]
pub struct FreetradeConfig {
    /// Account email the OTP is sent to
    pub email: String,
    /// Static keys and hosts
    pub credentials: Credentials,
    /// Service URLs
    pub endpoints: Endpoints,
    /// User-Agent sent on every request
    pub user_agent: String,
    /// Optional session file tried before the defaults
    pub session_file: Option<PathBuf>,
    /// Renew the ID token when fewer than this many seconds remain
    pub refresh_margin: Duration,
    /// Per-request timeout of the HTTP client
    pub request_timeout: Duration,
    /// Write the rotated refresh token back after every refresh
    pub persist_rotated_tokens: bool,
}

impl FreetradeConfig {
    /// Create new configuration with production endpoints
    #[must_use]
    pub fn new(email: String, credentials: Credentials) -> Self {
        let endpoints = Endpoints::from_credentials(&credentials);
        Self {
            email,
            credentials,
            endpoints,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_file: None,
            refresh_margin: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            persist_rotated_tokens: true,
        }
    }

    /// Load configuration from .env file
    ///
    /// # Errors
    /// Returns an error if `FREETRADE_EMAIL` is not set or no key file is found
    pub fn from_env_file() -> FtResult<Self> {
        dotenv::dotenv().ok();

        let email = std::env::var("FREETRADE_EMAIL").map_err(|_| FreetradeError::Credentials {
            message: "FREETRADE_EMAIL not found in environment".to_string(),
        })?;
        let key_file = std::env::var("FREETRADE_KEY_FILE").ok().map(PathBuf::from);
        let credentials = Credentials::load(key_file.as_deref())?;

        let mut config = Self::new(email, credentials);
        if let Ok(path) = std::env::var("FREETRADE_SESSION_FILE") {
            config = config.with_session_file(PathBuf::from(path));
        }
        if let Ok(user_agent) = std::env::var("FREETRADE_USER_AGENT") {
            config = config.with_user_agent(user_agent);
        }
        debug!("Configuration loaded for {}", config.email);
        Ok(config)
    }

    /// Set service URLs
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set User-Agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Prefer this session file over the defaults
    #[must_use]
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    /// Set the renewal margin
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Toggle writing rotated refresh tokens
    #[must_use]
    pub fn with_persist_rotated_tokens(mut self, persist: bool) -> Self {
        self.persist_rotated_tokens = persist;
        self
    }

    /// Ordered session file candidates: explicit, working dir, user config dir
    #[must_use]
    pub fn session_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(path) = &self.session_file {
            candidates.push(path.clone());
        }
        candidates.extend(default_candidates(SESSION_FILE_NAME));
        candidates
    }
}

fn default_candidates(file_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(file_name)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("freetrade").join(file_name));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY_FILE: &str = r#"{
        "prod_auth_dealstream_host": "auth.example.com",
        "prod_dealstream_host": "api.example.com",
        "google_android_device_verification_api_key": "key-123",
        "algolia_api_key": "ignored"
    }"#;

    fn credentials() -> Credentials {
        Credentials {
            auth_host: "auth.example.com".to_string(),
            api_host: "api.example.com".to_string(),
            android_verification_api_key: "key-123".to_string(),
        }
    }

    #[test]
    fn test_key_file_parsing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(KEY_FILE_NAME);
        fs::write(&path, KEY_FILE).unwrap();

        let loaded = Credentials::load(Some(&path)).unwrap();
        assert_eq!(loaded, credentials());
    }

    #[test]
    fn test_key_file_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(KEY_FILE_NAME);
        fs::write(&path, r#"{"prod_dealstream_host": "api.example.com"}"#).unwrap();

        let err = Credentials::load(Some(&path)).unwrap_err();
        assert!(matches!(err, FreetradeError::Credentials { .. }));
    }

    #[test]
    fn test_key_file_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Credentials::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("No key file found"));
    }

    #[test]
    fn test_production_endpoints() {
        let endpoints = Endpoints::from_credentials(&credentials());
        assert_eq!(endpoints.auth_base_url, "https://auth.example.com");
        assert_eq!(endpoints.api_base_url, "https://api.example.com");
        assert_eq!(endpoints.secure_token_url, DEFAULT_SECURE_TOKEN_URL);
    }

    #[test]
    fn test_session_candidates_order() {
        let config = FreetradeConfig::new("me@example.com".to_string(), credentials())
            .with_session_file(PathBuf::from("/tmp/custom.json"));

        let candidates = config.session_candidates();
        assert_eq!(candidates[0], PathBuf::from("/tmp/custom.json"));
        assert_eq!(candidates[1], PathBuf::from(SESSION_FILE_NAME));
        assert!(candidates.len() <= 3);
    }

    #[test]
    fn test_defaults() {
        let config = FreetradeConfig::new("me@example.com".to_string(), credentials());
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
        assert!(config.persist_rotated_tokens);
        assert_eq!(config.session_candidates()[0], PathBuf::from(SESSION_FILE_NAME));
    }
}
