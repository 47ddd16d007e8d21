//! One-time password input
//!
//! The session core asks an [`OtpProvider`] for the code emailed during
//! login. The default prompts on the terminal; anything else (an inbox
//! parser, a test fixture) can be injected instead.

use crate::error::{FreetradeError, FtResult};
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;

/// Source of the emailed one-time password
///
/// Called from a blocking thread, so implementations may block.
pub trait OtpProvider: Send + Sync {
    /// Return the OTP for the pending login
    ///
    /// # Errors
    /// Returns `OtpInput` if no code can be obtained
    fn one_time_password(&self) -> FtResult<String>;
}

impl<F> OtpProvider for F
where
    F: Fn() -> FtResult<String> + Send + Sync,
{
    fn one_time_password(&self) -> FtResult<String> {
        self()
    }
}

/// Prompts for the OTP on the terminal
#[derive(Debug, Clone)]
pub struct ConsoleOtpPrompt {
    prompt: String,
}

impl Default for ConsoleOtpPrompt {
    fn default() -> Self {
        Self {
            prompt: "What is the OTP (one time password) in the Magic link in the email?"
                .to_string(),
        }
    }
}

impl ConsoleOtpPrompt {
    /// Use a custom prompt text
    #[must_use]
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl OtpProvider for ConsoleOtpPrompt {
    fn one_time_password(&self) -> FtResult<String> {
        let input: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(self.prompt.as_str())
            .validate_with(|value: &String| -> Result<(), &str> {
                if value.trim().is_empty() {
                    Err("the OTP cannot be empty")
                } else {
                    Ok(())
                }
            })
            .interact_text()
            .map_err(|e| FreetradeError::OtpInput {
                reason: e.to_string(),
            })?;

        normalize_otp(&input)
    }
}

fn normalize_otp(input: &str) -> FtResult<String> {
    let otp = input.trim();
    if otp.is_empty() {
        return Err(FreetradeError::OtpInput {
            reason: "empty OTP entered".to_string(),
        });
    }
    Ok(otp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_trimmed() {
        assert_eq!(normalize_otp("  123456 \n").unwrap(), "123456");
    }

    #[test]
    fn test_empty_otp_rejected() {
        let err = normalize_otp(" \n").unwrap_err();
        assert!(matches!(err, FreetradeError::OtpInput { .. }));
    }

    #[test]
    fn test_closure_provider() {
        let provider = || -> FtResult<String> { Ok("654321".to_string()) };
        assert_eq!(provider.one_time_password().unwrap(), "654321");
    }

    #[test]
    fn test_closure_provider_error_passes_through() {
        let provider = || -> FtResult<String> {
            Err(FreetradeError::OtpInput {
                reason: "no terminal".to_string(),
            })
        };
        let err = provider.one_time_password().unwrap_err();
        assert!(err.to_string().contains("no terminal"));
    }
}
