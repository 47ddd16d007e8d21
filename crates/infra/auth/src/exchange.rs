//! Token exchange client
//!
//! Four single round trips against the OTP login service and the identity
//! provider. Nothing here retries; callers decide what a failure means.

use crate::config::Endpoints;
use crate::error::{ExchangeStage, FreetradeError, FtResult};
use crate::headers::RequestHeaders;
use crate::jwt::redact;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

/// Refresh/ID token pair issued by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Rotating refresh token
    pub refresh_token: String,
    /// Encoded ID token (JWT)
    pub id_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("refresh_token", &redact(&self.refresh_token))
            .field("id_token", &redact(&self.id_token))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct OtpLoginResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenResponse {
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Client for the login and token endpoints
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: Client,
    endpoints: Endpoints,
    api_key: String,
}

impl TokenExchangeClient {
    /// Create a client over a shared HTTP client
    #[must_use]
    pub fn new(http: Client, endpoints: Endpoints, api_key: String) -> Self {
        Self {
            http,
            endpoints,
            api_key,
        }
    }

    /// Ask the auth host to email an OTP
    ///
    /// # Errors
    /// Returns `TokenExchangeFailed{request_otp}` on a non-success status
    pub async fn request_otp(&self, email: &str, headers: &RequestHeaders) -> FtResult<()> {
        let stage = ExchangeStage::RequestOtp;
        let url = format!("{}/start", self.endpoints.auth_base_url);
        debug!("Requesting OTP for {email}");

        let response = self
            .http
            .post(&url)
            .headers(headers.to_header_map()?)
            .form(&[("email", email)])
            .send()
            .await
            .map_err(|source| FreetradeError::Transport { stage, source })?;

        read_body(stage, response).await?;
        info!("OTP requested, check the inbox of {email}");
        Ok(())
    }

    /// Redeem the OTP for a custom token
    ///
    /// # Errors
    /// Returns `OtpRejected` if the auth host does not hand out a token
    pub async fn redeem_otp(
        &self,
        email: &str,
        otp: &str,
        headers: &RequestHeaders,
    ) -> FtResult<String> {
        let stage = ExchangeStage::RedeemOtp;
        let url = format!("{}/login", self.endpoints.auth_base_url);

        let response = self
            .http
            .post(&url)
            .headers(headers.to_header_map()?)
            .form(&[("email", email), ("otp", otp)])
            .send()
            .await
            .map_err(|source| FreetradeError::Transport { stage, source })?;

        let rejected = |reason: String| FreetradeError::OtpRejected { reason };

        let body = read_body(stage, response).await.map_err(|e| match e {
            FreetradeError::TokenExchangeFailed { reason, .. } => rejected(reason),
            other => other,
        })?;
        let parsed: OtpLoginResponse = serde_json::from_str(&body)
            .map_err(|e| rejected(format!("malformed login response: {e}")))?;
        let custom_token = parsed
            .access_token
            .ok_or_else(|| rejected("access_token not found in login response".to_string()))?;

        debug!("OTP accepted, custom token {}", redact(&custom_token));
        Ok(custom_token)
    }

    /// Exchange a custom token for the first refresh/ID token pair
    ///
    /// # Errors
    /// Returns `TokenExchangeFailed{issue_tokens}` on failure
    pub async fn issue_tokens(&self, custom_token: &str) -> FtResult<TokenPair> {
        let stage = ExchangeStage::IssueTokens;

        let response = self
            .http
            .post(&self.endpoints.verify_custom_token_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "token": custom_token,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .map_err(|source| FreetradeError::Transport { stage, source })?;

        let parsed: CustomTokenResponse = parse_json(stage, response).await?;
        let pair = token_pair(stage, parsed.refresh_token, parsed.id_token)?;
        info!("Session tokens issued");
        Ok(pair)
    }

    /// Exchange a refresh token for a rotated pair
    ///
    /// # Errors
    /// Returns `TokenExchangeFailed{refresh}` on failure
    pub async fn refresh(&self, refresh_token: &str) -> FtResult<TokenPair> {
        let stage = ExchangeStage::Refresh;

        let response = self
            .http
            .post(&self.endpoints.secure_token_url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|source| FreetradeError::Transport { stage, source })?;

        let parsed: RefreshResponse = parse_json(stage, response).await?;
        let pair = token_pair(stage, parsed.refresh_token, parsed.id_token)?;
        debug!("Refresh token rotated to {}", redact(&pair.refresh_token));
        Ok(pair)
    }
}

async fn read_body(stage: ExchangeStage, response: Response) -> FtResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| FreetradeError::Transport { stage, source })?;

    if !status.is_success() {
        return Err(FreetradeError::exchange(
            stage,
            format!("HTTP {status} - {body}"),
        ));
    }
    Ok(body)
}

async fn parse_json<T: DeserializeOwned>(stage: ExchangeStage, response: Response) -> FtResult<T> {
    let body = read_body(stage, response).await?;
    serde_json::from_str(&body)
        .map_err(|e| FreetradeError::exchange(stage, format!("malformed response: {e}")))
}

fn token_pair(
    stage: ExchangeStage,
    refresh_token: Option<String>,
    id_token: Option<String>,
) -> FtResult<TokenPair> {
    let refresh_token = refresh_token
        .ok_or_else(|| FreetradeError::exchange(stage, "refresh token not found in response"))?;
    let id_token =
        id_token.ok_or_else(|| FreetradeError::exchange(stage, "ID token not found in response"))?;
    Ok(TokenPair {
        refresh_token,
        id_token,
    })
}
