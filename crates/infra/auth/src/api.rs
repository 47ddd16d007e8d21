//! Authenticated account API calls
//!
//! Every call renews the session if needed and builds fresh headers before
//! it is dispatched.

use crate::auth::FreetradeAuth;
use crate::error::{FreetradeError, FtResult};
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct WithdrawFunds<'a> {
    account_id: &'a str,
    amount: &'a str,
}

#[derive(Debug, Serialize)]
struct SetActiveAccount<'a> {
    account_id: &'a str,
}

/// Account API client sharing one authenticated session
#[derive(Debug, Clone)]
pub struct FreetradeApi {
    auth: Arc<FreetradeAuth>,
    http: Client,
    base_url: String,
}

impl FreetradeApi {
    /// Create a client for `base_url` (e.g. `https://{api_host}`)
    #[must_use]
    pub fn new(auth: Arc<FreetradeAuth>, http: Client, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Session this client authenticates with
    #[must_use]
    pub fn auth(&self) -> &Arc<FreetradeAuth> {
        &self.auth
    }

    /// Look up UK addresses for a postcode
    ///
    /// # Errors
    /// Returns an error if the session cannot be renewed or the call fails
    pub async fn get_address_by_postcode(&self, postcode: &str) -> FtResult<Value> {
        self.send::<()>(
            Method::GET,
            &["proxy", "postcodelookup", "uk", postcode],
            None,
        )
        .await
    }

    /// Withdraw `amount` (e.g. `"1.00"`) from an account
    ///
    /// # Errors
    /// Returns an error if the session cannot be renewed or the call fails
    pub async fn withdraw_funds(&self, account_id: &str, amount: &str) -> FtResult<Value> {
        let body = WithdrawFunds { account_id, amount };
        self.send(Method::POST, &["banking", "withdraw-funds"], Some(&body))
            .await
    }

    /// Switch the active account of a client
    ///
    /// # Errors
    /// Returns an error if the session cannot be renewed or the call fails
    pub async fn set_active_account(&self, client_id: &str, account_id: &str) -> FtResult<Value> {
        let body = SetActiveAccount { account_id };
        self.send(
            Method::POST,
            &["clients", client_id, "set-active-account"],
            Some(&body),
        )
        .await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> FtResult<Value> {
        let path = format!("/{}", segments.join("/"));
        let url = self.endpoint_url(segments)?;

        self.auth.ensure_valid().await?;
        let headers = self.auth.next_request_headers().await?;
        debug!("{method} {path} request_id={}", headers.request_id());

        let mut request = self
            .http
            .request(method, url)
            .headers(headers.to_header_map()?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        read_json(&path, response).await
    }

    /// Base URL with each segment appended and percent-encoded
    fn endpoint_url(&self, segments: &[&str]) -> FtResult<Url> {
        let invalid = |reason: String| FreetradeError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_json(endpoint: &str, response: Response) -> FtResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        warn!("{endpoint} failed: HTTP {status}");
        return Err(FreetradeError::ApiRequestFailed {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| FreetradeError::ApiRequestFailed {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body: format!("invalid JSON body: {e}"),
    })
}
