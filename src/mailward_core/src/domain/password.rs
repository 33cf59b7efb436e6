use secrecy::{ExposeSecret, Secret};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password does not meet complexity requirements")]
    Complexity,
    #[error("password confirmation does not match")]
    Mismatch,
}

/// A candidate password for account updates, validated against the panel
/// complexity policy. Login never goes through this type: stored legacy
/// hashes may cover passwords the current policy would reject.
#[derive(Clone)]
pub struct NewPassword(Secret<String>);

impl NewPassword {
    /// Policy: at least 6 characters with at least one letter and one
    /// digit.
    pub fn parse(candidate: Secret<String>) -> Result<Self, PasswordError> {
        let raw = candidate.expose_secret();
        let long_enough = raw.chars().count() >= 6;
        let has_letter = raw.chars().any(|c| c.is_alphabetic());
        let has_digit = raw.chars().any(|c| c.is_ascii_digit());
        if long_enough && has_letter && has_digit {
            Ok(Self(candidate))
        } else {
            Err(PasswordError::Complexity)
        }
    }

    /// Parses after checking the retyped confirmation matches.
    pub fn parse_confirmed(
        candidate: Secret<String>,
        confirmation: &Secret<String>,
    ) -> Result<Self, PasswordError> {
        if candidate.expose_secret() != confirmation.expose_secret() {
            return Err(PasswordError::Mismatch);
        }
        Self::parse(candidate)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NewPassword(****)")
    }
}
