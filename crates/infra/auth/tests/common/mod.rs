//! Shared fixtures for the session integration tests

#![allow(dead_code)]

use chrono::Utc;
use freetrade_auth::{
    Credentials, Endpoints, FreetradeAuth, FreetradeConfig, FtResult, OtpProvider, SessionStore,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use wiremock::MockServer;

pub const API_KEY: &str = "test-api-key";
pub const EMAIL: &str = "trader@example.com";
pub const OTP: &str = "123456";
pub const AUTH_HOST: &str = "auth.freetrade.test";
pub const API_HOST: &str = "api.freetrade.test";

/// ID token whose `exp` is `secs` away from now
pub fn jwt_expiring_in(secs: i64) -> String {
    let claims = json!({
        "exp": Utc::now().timestamp() + secs,
        "sub": "user-1",
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-signing-secret"),
    )
    .unwrap()
}

pub fn credentials() -> Credentials {
    Credentials {
        auth_host: AUTH_HOST.to_string(),
        api_host: API_HOST.to_string(),
        android_verification_api_key: API_KEY.to_string(),
    }
}

pub fn config(server: &MockServer) -> FreetradeConfig {
    FreetradeConfig::new(EMAIL.to_string(), credentials())
        .with_endpoints(Endpoints::single_host(&server.uri()))
}

/// OTP source that counts how often it was asked
#[derive(Clone, Default)]
pub struct CountingOtp {
    calls: Arc<AtomicUsize>,
}

impl CountingOtp {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OtpProvider for CountingOtp {
    fn one_time_password(&self) -> FtResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OTP.to_string())
    }
}

/// Test harness: mock server, temp dir and session candidates
pub struct Harness {
    pub server: MockServer,
    pub dir: TempDir,
    pub otp: CountingOtp,
    pub candidates: Vec<PathBuf>,
}

impl Harness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let candidates = vec![
            dir.path().join("custom.json"),
            dir.path().join("ft-session.json"),
        ];
        Self {
            server,
            dir,
            otp: CountingOtp::default(),
            candidates,
        }
    }

    pub fn primary(&self) -> &Path {
        &self.candidates[0]
    }

    pub fn write_candidate(&self, index: usize, content: &str) {
        std::fs::write(&self.candidates[index], content).unwrap();
    }

    pub fn auth(&self) -> FreetradeAuth {
        self.auth_with(config(&self.server))
    }

    pub fn auth_with(&self, config: FreetradeConfig) -> FreetradeAuth {
        FreetradeAuth::with_parts(
            config,
            reqwest::Client::new(),
            SessionStore::new(self.candidates.clone()),
            Arc::new(self.otp.clone()),
        )
    }

    pub fn read_primary(&self) -> serde_json::Value {
        let content = std::fs::read_to_string(self.primary()).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
