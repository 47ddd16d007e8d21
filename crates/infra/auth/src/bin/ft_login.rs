//! Log in to Freetrade and persist the session
//!
//! Reads `FREETRADE_EMAIL` (and optionally `FREETRADE_KEY_FILE`,
//! `FREETRADE_SESSION_FILE`, `FREETRADE_USER_AGENT`) from the environment or
//! a `.env` file.

use freetrade_auth::{FreetradeAuth, FreetradeConfig, SessionOrigin};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FreetradeConfig::from_env_file()?;

    info!("🚀 Freetrade Login");
    info!("{}", "=".repeat(50));
    info!("📋 Configuration:");
    info!("  Email: {}", config.email);
    info!("  Auth host: {}", config.credentials.auth_host);
    info!("  API host: {}", config.credentials.api_host);
    info!("  Session candidates:");
    for path in config.session_candidates() {
        info!("    - {}", path.display());
    }
    info!("");

    let auth = FreetradeAuth::new(config)?;

    match auth.initialize().await {
        Ok(origin) => {
            match origin {
                SessionOrigin::Restored { path } => {
                    info!("  ✅ Session restored from {}", path.display());
                }
                SessionOrigin::FreshLogin { path } => {
                    info!("  ✅ Logged in, session saved to {}", path.display());
                }
            }
            info!("  🆔 Session id: {}", auth.session_id().await);
            if let Some(expires_at) = auth.id_token_expires_at().await {
                let remaining = expires_at - chrono::Utc::now().timestamp();
                info!("  ⏳ ID token valid for {remaining}s");
            }
        }
        Err(e) => {
            info!("  ❌ Authentication Failed: {e}");
            info!("");
            info!("📝 Troubleshooting:");
            info!("  1. Verify the key file hosts and API key");
            info!("  2. Use the OTP from the most recent magic link email");
            info!("  3. Delete a stale session file to force a fresh login");
            return Err(e.into());
        }
    }

    Ok(())
}
