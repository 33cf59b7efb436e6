use async_trait::async_trait;
use secrecy::Secret;
use thiserror::Error;

/// Port for the rate-limiting feed consumed by the ban daemon. Strictly
/// fire and forget: implementations swallow transport errors, a failed
/// notification must never affect a login result.
#[async_trait]
pub trait ThrottleNotifier: Send + Sync {
    async fn invalid_login(&self, username: &str, remote_addr: &str);
}

#[derive(Debug, Error)]
pub enum OtpValidationError {
    /// The validation service answered and rejected the OTP.
    #[error("OTP rejected: {0}")]
    Rejected(String),
    /// The service could not be reached or answered garbage. Treated as a
    /// verification failure by callers, never retried.
    #[error("validation service unavailable: {0}")]
    Transport(String),
}

/// Port for the remote Yubico OTP validation service.
#[async_trait]
pub trait OtpValidationClient: Send + Sync {
    async fn verify(
        &self,
        client_id: &str,
        api_key: &Secret<String>,
        otp: &str,
    ) -> Result<(), OtpValidationError>;
}
