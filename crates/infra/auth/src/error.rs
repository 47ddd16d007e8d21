//! Error types for the Freetrade session client

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The network exchange a token or OTP failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    /// `POST {auth_host}/start`
    RequestOtp,
    /// `POST {auth_host}/login`
    RedeemOtp,
    /// Custom token -> first refresh/ID token pair
    IssueTokens,
    /// Refresh token -> rotated refresh/ID token pair
    Refresh,
}

impl ExchangeStage {
    /// Stable snake_case name used in logs and error messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestOtp => "request_otp",
            Self::RedeemOtp => "redeem_otp",
            Self::IssueTokens => "issue_tokens",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freetrade client error types
#[derive(Error, Debug)]
pub enum FreetradeError {
    /// A session file candidate could not be used
    #[error("Session file {path:?} unreadable: {reason}")]
    SessionFileUnreadable {
        /// Candidate path that was tried
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Writing the session file failed
    #[error("Failed to write session file {path:?}: {source}")]
    SessionWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A token exchange returned a non-success status or an incomplete body
    #[error("Token exchange failed at stage {stage}: {reason}")]
    TokenExchangeFailed {
        /// Exchange that failed
        stage: ExchangeStage,
        /// Status and body summary
        reason: String,
    },

    /// The OTP was not accepted by the auth host
    #[error("OTP rejected: {reason}")]
    OtpRejected {
        /// Status and body summary
        reason: String,
    },

    /// The OTP input collaborator could not produce a value
    #[error("OTP input failed: {reason}")]
    OtpInput {
        /// What went wrong while reading the OTP
        reason: String,
    },

    /// The request never produced a response
    #[error("Transport error during {stage}: {source}")]
    Transport {
        /// Exchange that was in flight
        stage: ExchangeStage,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// Renewal of a live session failed; a fresh login is required
    #[error("Session expired, re-authentication required: {reason}")]
    SessionExpired {
        /// Cause of the failed renewal
        reason: String,
    },

    /// A bearer-dependent operation was called before any token was issued
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The ID token could not be decoded to read its `exp` claim
    #[error("Malformed ID token: {reason}")]
    MalformedToken {
        /// Decoding failure
        reason: String,
    },

    /// The key file is missing or incomplete
    #[error("Credentials error: {message}")]
    Credentials {
        /// What is missing or invalid
        message: String,
    },

    /// A header value could not be encoded for the wire
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name
        name: &'static str,
        /// Encoding failure
        reason: String,
    },

    /// The API base URL cannot carry path segments
    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl {
        /// Configured base URL
        url: String,
        /// Parse failure
        reason: String,
    },

    /// Building the HTTP client failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// An authenticated API call returned a non-success status
    #[error("API request {endpoint} failed: HTTP {status} - {body}")]
    ApiRequestFailed {
        /// Request path
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

impl FreetradeError {
    pub(crate) fn exchange(stage: ExchangeStage, reason: impl Into<String>) -> Self {
        Self::TokenExchangeFailed {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }
}

/// Type alias for Freetrade results
pub type FtResult<T> = Result<T, FreetradeError>;
