//! Per-request header set
//!
//! Headers are rebuilt from the current session state on every call in a
//! fixed order; `Authorization` comes first once a bearer token exists.

use crate::error::{FreetradeError, FtResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

pub const AUTHORIZATION: &str = "Authorization";
pub const SESSION_ID: &str = "session_id";
pub const REQUEST_ID: &str = "request_id";
pub const USER_AGENT: &str = "User-Agent";
pub const HOST: &str = "Host";
pub const CONNECTION: &str = "Connection";
pub const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Ordered header list for one outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(&'static str, String)>,
}

impl RequestHeaders {
    /// Build the header set; a fresh `request_id` is generated every time
    #[must_use]
    pub fn build(session_id: &str, user_agent: &str, host: &str, bearer: Option<&str>) -> Self {
        let mut entries = Vec::with_capacity(7);
        if let Some(token) = bearer {
            entries.push((AUTHORIZATION, bearer_value(token)));
        }
        entries.push((SESSION_ID, session_id.to_string()));
        entries.push((REQUEST_ID, Uuid::new_v4().to_string()));
        entries.push((USER_AGENT, user_agent.to_string()));
        entries.push((HOST, host.to_string()));
        entries.push((CONNECTION, "close".to_string()));
        entries.push((ACCEPT_ENCODING, "gzip, deflate".to_string()));
        Self { entries }
    }

    /// Value of a header, names compared case-insensitively
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Correlation id of this request
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.get(REQUEST_ID).unwrap_or_default()
    }

    /// Header names in wire order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    /// `(name, value)` pairs in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().map(|(n, v)| (*n, v.as_str()))
    }

    /// Convert to a reqwest header map, preserving order
    ///
    /// # Errors
    /// Returns an error if a value contains bytes not allowed in headers
    pub fn to_header_map(&self) -> FtResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let name = *name;
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| FreetradeError::InvalidHeader {
                    name,
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| FreetradeError::InvalidHeader {
                    name,
                    reason: e.to_string(),
                })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// `Authorization` header value for an ID token
#[must_use]
pub fn bearer_value(id_token: &str) -> String {
    format!("Bearer {id_token}")
}
