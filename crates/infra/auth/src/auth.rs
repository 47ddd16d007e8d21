//! Freetrade session core
//!
//! Owns the token state machine: restoring a persisted session, the OTP
//! login, and renewal of the ID token before it expires. All state lives
//! behind one async mutex so a check-then-refresh sequence can never race
//! another one; the refresh token rotates on every exchange and two
//! concurrent refreshes would invalidate each other.

use crate::config::FreetradeConfig;
use crate::error::{ExchangeStage, FreetradeError, FtResult};
use crate::exchange::{TokenExchangeClient, TokenPair};
use crate::headers::{RequestHeaders, bearer_value};
use crate::jwt::{IdToken, redact};
use crate::otp::{ConsoleOtpPrompt, OtpProvider};
use crate::session::{PersistedSession, SessionStore};
use chrono::Utc;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[cfg(feature = "verify-signature")]
use crate::jwt::TokenVerifier;

/// Where the session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No tokens yet
    Unauthenticated,
    /// OTP email requested, waiting for the code
    OtpRequested,
    /// Custom token obtained, session tokens not yet issued
    OtpRedeemed,
    /// Holding a refresh token and an ID token
    Authenticated,
    /// Exchanging the refresh token
    Refreshing,
}

/// How `initialize` obtained its tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Refreshed from a persisted session file
    Restored {
        /// File the session was read from
        path: PathBuf,
    },
    /// Full OTP login
    FreshLogin {
        /// File the new session was written to
        path: PathBuf,
    },
}

#[derive(Debug)]
struct AuthState {
    phase: AuthPhase,
    custom_token: Option<String>,
    id_token: Option<IdToken>,
    refresh_token: Option<String>,
    session_id: String,
}

impl AuthState {
    fn new() -> Self {
        Self {
            phase: AuthPhase::Unauthenticated,
            custom_token: None,
            id_token: None,
            refresh_token: None,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    fn persisted(&self) -> Option<PersistedSession> {
        self.refresh_token.as_ref().map(|refresh_token| PersistedSession {
            refresh_token: refresh_token.clone(),
            session_id: self.session_id.clone(),
        })
    }
}

/// Authenticated Freetrade session
pub struct FreetradeAuth {
    config: FreetradeConfig,
    exchange: TokenExchangeClient,
    store: SessionStore,
    otp: Arc<dyn OtpProvider>,
    state: Mutex<AuthState>,
    #[cfg(feature = "verify-signature")]
    verifier: Option<TokenVerifier>,
}

impl std::fmt::Debug for FreetradeAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreetradeAuth")
            .field("email", &self.config.email)
            .field("candidates", &self.store.candidates())
            .finish_non_exhaustive()
    }
}

impl FreetradeAuth {
    /// Create a session that prompts for the OTP on the terminal
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: FreetradeConfig) -> FtResult<Self> {
        Self::with_otp_provider(config, Arc::new(ConsoleOtpPrompt::default()))
    }

    /// Create a session with an injected OTP source
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn with_otp_provider(
        config: FreetradeConfig,
        otp: Arc<dyn OtpProvider>,
    ) -> FtResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let store = SessionStore::new(config.session_candidates());
        Ok(Self::with_parts(config, http, store, otp))
    }

    /// Create a session over an explicit candidate list and HTTP client
    #[must_use]
    pub fn with_parts(
        config: FreetradeConfig,
        http: Client,
        store: SessionStore,
        otp: Arc<dyn OtpProvider>,
    ) -> Self {
        let exchange = TokenExchangeClient::new(
            http,
            config.endpoints.clone(),
            config.credentials.android_verification_api_key.clone(),
        );
        Self {
            config,
            exchange,
            store,
            otp,
            state: Mutex::new(AuthState::new()),
            #[cfg(feature = "verify-signature")]
            verifier: None,
        }
    }

    /// Verify the signature of every ID token before storing it
    #[cfg(feature = "verify-signature")]
    #[must_use]
    pub fn with_verifier(mut self, verifier: TokenVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Restore a persisted session or perform a full OTP login
    ///
    /// The first usable session file is refreshed; if that refresh fails the
    /// OTP login runs once. The new session is written to the primary
    /// candidate path.
    ///
    /// # Errors
    /// Returns an error if the OTP login or writing the session fails
    pub async fn initialize(&self) -> FtResult<SessionOrigin> {
        let mut state = self.state.lock().await;

        if let Some(loaded) = self.store.load() {
            state.refresh_token = Some(loaded.refresh_token);
            if let Some(session_id) = loaded.session_id {
                state.session_id = session_id;
            }

            match self.refresh_locked(&mut state).await {
                Ok(()) => {
                    info!(
                        "✓ Restored session {} from {}",
                        state.session_id,
                        loaded.path.display()
                    );
                    self.persist_rotated(&state);
                    return Ok(SessionOrigin::Restored { path: loaded.path });
                }
                Err(e) => {
                    warn!(
                        "Persisted session at {} could not be refreshed ({e}), logging in again",
                        loaded.path.display()
                    );
                    *state = AuthState::new();
                }
            }
        } else {
            info!("No usable session file found, performing fresh login");
        }

        let path = self.login_locked(&mut state).await?;
        Ok(SessionOrigin::FreshLogin { path })
    }

    /// Refresh the ID token if it expires within the renewal margin
    ///
    /// # Errors
    /// Returns `NotAuthenticated` before login, `SessionExpired` if the
    /// refresh exchange is refused, `MalformedToken` if the renewed ID token
    /// cannot be decoded
    pub async fn ensure_valid(&self) -> FtResult<()> {
        let mut state = self.state.lock().await;

        let Some(id_token) = state.id_token.as_ref() else {
            return Err(FreetradeError::NotAuthenticated);
        };

        let now = Utc::now().timestamp();
        let margin = i64::try_from(self.config.refresh_margin.as_secs()).unwrap_or(i64::MAX);
        if !id_token.needs_refresh(now, margin) {
            return Ok(());
        }

        info!(
            "ID token expires in {}s, refreshing",
            id_token.seconds_remaining(now)
        );
        let previous = state.refresh_token.clone();
        let result = self.refresh_locked(&mut state).await;
        if result.is_ok() || state.refresh_token != previous {
            self.persist_rotated(&state);
        }

        match result {
            Ok(()) => Ok(()),
            Err(FreetradeError::TokenExchangeFailed {
                stage: ExchangeStage::Refresh,
                reason,
            }) => {
                error!("Session renewal refused: {reason}");
                Err(FreetradeError::SessionExpired { reason })
            }
            Err(e) => Err(e),
        }
    }

    /// `Authorization` header value for the current ID token
    ///
    /// # Errors
    /// Returns `NotAuthenticated` if no ID token has been issued
    pub async fn auth_bearer_value(&self) -> FtResult<String> {
        let state = self.state.lock().await;
        state
            .id_token
            .as_ref()
            .map(|token| bearer_value(token.as_str()))
            .ok_or(FreetradeError::NotAuthenticated)
    }

    /// Headers for the next API request, with a new `request_id`
    ///
    /// # Errors
    /// Returns `NotAuthenticated` if no ID token has been issued
    pub async fn next_request_headers(&self) -> FtResult<RequestHeaders> {
        let state = self.state.lock().await;
        let id_token = state
            .id_token
            .as_ref()
            .ok_or(FreetradeError::NotAuthenticated)?;
        Ok(RequestHeaders::build(
            &state.session_id,
            &self.config.user_agent,
            &self.config.credentials.api_host,
            Some(id_token.as_str()),
        ))
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> AuthPhase {
        self.state.lock().await.phase
    }

    /// Correlation id sent with every request
    pub async fn session_id(&self) -> String {
        self.state.lock().await.session_id.clone()
    }

    /// Expiry of the current ID token as a Unix timestamp
    pub async fn id_token_expires_at(&self) -> Option<i64> {
        self.state
            .lock()
            .await
            .id_token
            .as_ref()
            .map(IdToken::expires_at)
    }

    /// The document that would be persisted for the current state
    pub async fn persisted_session(&self) -> Option<PersistedSession> {
        self.state.lock().await.persisted()
    }

    async fn login_locked(&self, state: &mut AuthState) -> FtResult<PathBuf> {
        let email = self.config.email.as_str();
        state.phase = AuthPhase::Unauthenticated;

        let headers = self.auth_host_headers(state);
        self.exchange.request_otp(email, &headers).await?;
        state.phase = AuthPhase::OtpRequested;

        let otp = self.read_otp().await?;

        let headers = self.auth_host_headers(state);
        let custom_token = self.exchange.redeem_otp(email, &otp, &headers).await?;
        state.custom_token = Some(custom_token);
        state.phase = AuthPhase::OtpRedeemed;

        let custom_token = state
            .custom_token
            .as_deref()
            .ok_or(FreetradeError::NotAuthenticated)?;
        let pair = self.exchange.issue_tokens(custom_token).await?;
        self.store_pair(state, pair)?;
        state.phase = AuthPhase::Authenticated;

        let session = state.persisted().ok_or(FreetradeError::NotAuthenticated)?;
        let path = self.store.save(&session)?;
        info!("✅ Freetrade login completed, session {}", state.session_id);
        Ok(path)
    }

    async fn refresh_locked(&self, state: &mut AuthState) -> FtResult<()> {
        let refresh_token = state
            .refresh_token
            .clone()
            .ok_or(FreetradeError::NotAuthenticated)?;

        let previous = state.phase;
        state.phase = AuthPhase::Refreshing;
        debug!("Refreshing with {}", redact(&refresh_token));

        let result = match self.exchange.refresh(&refresh_token).await {
            Ok(pair) => self.store_pair(state, pair),
            Err(e) => Err(e),
        };

        state.phase = match result {
            Ok(()) => AuthPhase::Authenticated,
            Err(_) => previous,
        };
        result
    }

    /// The refresh token is kept even if the ID token cannot be decoded; the
    /// server has already invalidated the previous one.
    fn store_pair(&self, state: &mut AuthState, pair: TokenPair) -> FtResult<()> {
        state.refresh_token = Some(pair.refresh_token);
        let id_token = self.decode_id_token(&pair.id_token)?;
        debug!("ID token valid until {}", id_token.expires_at());
        state.id_token = Some(id_token);
        Ok(())
    }

    #[cfg(feature = "verify-signature")]
    fn decode_id_token(&self, raw: &str) -> FtResult<IdToken> {
        match &self.verifier {
            Some(verifier) => verifier.verify(raw),
            None => IdToken::parse_unverified(raw),
        }
    }

    #[cfg(not(feature = "verify-signature"))]
    fn decode_id_token(&self, raw: &str) -> FtResult<IdToken> {
        IdToken::parse_unverified(raw)
    }

    fn auth_host_headers(&self, state: &AuthState) -> RequestHeaders {
        RequestHeaders::build(
            &state.session_id,
            &self.config.user_agent,
            &self.config.credentials.auth_host,
            None,
        )
    }

    async fn read_otp(&self) -> FtResult<String> {
        let provider = Arc::clone(&self.otp);
        tokio::task::spawn_blocking(move || provider.one_time_password())
            .await
            .map_err(|e| FreetradeError::OtpInput {
                reason: e.to_string(),
            })?
    }

    fn persist_rotated(&self, state: &AuthState) {
        if !self.config.persist_rotated_tokens {
            return;
        }
        if let Some(session) = state.persisted()
            && let Err(e) = self.store.save(&session)
        {
            warn!("Failed to persist rotated refresh token: {e}");
        }
    }
}
