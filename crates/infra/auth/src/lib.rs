//! Freetrade Authentication Module
//!
//! Session client for the Freetrade mobile-app backend: OTP login, persisted
//! refresh tokens and transparent renewal of the ID token before every
//! authenticated API call.

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::multiple_crate_versions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod jwt;
pub mod otp;
pub mod session;

// Public exports with meaningful names
pub use api::FreetradeApi;
pub use auth::{AuthPhase, FreetradeAuth, SessionOrigin};
pub use config::{Credentials, Endpoints, FreetradeConfig};
pub use error::{ExchangeStage, FreetradeError, FtResult};
pub use exchange::{TokenExchangeClient, TokenPair};
pub use headers::RequestHeaders;
pub use jwt::IdToken;
#[cfg(feature = "verify-signature")]
pub use jwt::TokenVerifier;
pub use otp::{ConsoleOtpPrompt, OtpProvider};
pub use session::{PersistedSession, SessionStore};
