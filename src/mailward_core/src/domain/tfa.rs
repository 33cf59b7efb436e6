//! Second-factor domain model: the closed mechanism set, enrolled factor
//! rows and the per-mechanism enrollment/verification payloads. Adding a
//! mechanism without updating every dispatch site must not compile.

use std::fmt;

use secrecy::{ExposeSecret, Secret};
use thiserror::Error;
use totp_rs::{Algorithm, TOTP};

use super::u2f::{U2fRegisterResponse, U2fRegistration, U2fSignResponse};
use super::username::Username;

/// Length of a Yubico OTP and of its modhex device prefix.
pub const YUBICO_OTP_LEN: usize = 44;
pub const YUBICO_MODHEX_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TfaMechanism {
    None,
    Totp,
    U2f,
    YubiOtp,
    Hotp,
}

impl TfaMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            TfaMechanism::None => "none",
            TfaMechanism::Totp => "totp",
            TfaMechanism::U2f => "u2f",
            TfaMechanism::YubiOtp => "yubi_otp",
            TfaMechanism::Hotp => "hotp",
        }
    }

    /// Human-facing label, kept for the factor overview.
    pub fn pretty(&self) -> &'static str {
        match self {
            TfaMechanism::None => "-",
            TfaMechanism::Totp => "Time-based OTP",
            TfaMechanism::U2f => "Fido U2F",
            TfaMechanism::YubiOtp => "Yubico OTP",
            TfaMechanism::Hotp => "HMAC-based OTP",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "none" => Some(TfaMechanism::None),
            "totp" => Some(TfaMechanism::Totp),
            "u2f" => Some(TfaMechanism::U2f),
            "yubi_otp" => Some(TfaMechanism::YubiOtp),
            "hotp" => Some(TfaMechanism::Hotp),
            _ => None,
        }
    }
}

impl fmt::Display for TfaMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mechanism-specific secret material of a stored factor.
#[derive(Debug, Clone)]
pub enum TfaMaterial {
    /// Base32 shared secret.
    Totp { secret: Secret<String> },
    U2f(U2fRegistration),
    /// Stored as `client_id:api_key:modhex_prefix`.
    YubiOtp {
        client_id: String,
        api_key: Secret<String>,
        modhex_prefix: String,
    },
    /// Stub mechanism; material is kept opaque and never verified.
    Hotp { secret: Secret<String> },
}

impl TfaMaterial {
    pub fn mechanism(&self) -> TfaMechanism {
        match self {
            TfaMaterial::Totp { .. } => TfaMechanism::Totp,
            TfaMaterial::U2f(_) => TfaMechanism::U2f,
            TfaMaterial::YubiOtp { .. } => TfaMechanism::YubiOtp,
            TfaMaterial::Hotp { .. } => TfaMechanism::Hotp,
        }
    }
}

/// One enrolled factor row.
#[derive(Debug, Clone)]
pub struct TfaFactor {
    pub id: i64,
    pub username: Username,
    pub key_label: String,
    pub active: bool,
    pub material: TfaMaterial,
}

impl TfaFactor {
    pub fn mechanism(&self) -> TfaMechanism {
        self.material.mechanism()
    }
}

/// A factor to insert; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTfaFactor {
    pub username: Username,
    pub key_label: String,
    pub active: bool,
    pub material: TfaMaterial,
}

/// Per-mechanism enrollment payloads.
#[derive(Debug)]
pub enum TfaEnrollment {
    /// Disable TFA entirely; removes every factor.
    None,
    Totp {
        key_label: String,
        secret: Secret<String>,
        confirm_code: String,
    },
    U2f {
        key_label: String,
        response: U2fRegisterResponse,
    },
    YubiOtp {
        key_label: String,
        client_id: String,
        api_key: Secret<String>,
        otp: String,
    },
    /// Recognized but not implemented; enrollment is rejected.
    Hotp,
}

impl TfaEnrollment {
    pub fn mechanism(&self) -> TfaMechanism {
        match self {
            TfaEnrollment::None => TfaMechanism::None,
            TfaEnrollment::Totp { .. } => TfaMechanism::Totp,
            TfaEnrollment::U2f { .. } => TfaMechanism::U2f,
            TfaEnrollment::YubiOtp { .. } => TfaMechanism::YubiOtp,
            TfaEnrollment::Hotp => TfaMechanism::Hotp,
        }
    }
}

/// Per-mechanism verification payloads for the pending-login step.
#[derive(Debug)]
pub enum TfaVerification {
    None,
    Totp { code: String },
    U2f { response: U2fSignResponse },
    YubiOtp { otp: String },
    Hotp { code: String },
}

impl TfaVerification {
    pub fn mechanism(&self) -> TfaMechanism {
        match self {
            TfaVerification::None => TfaMechanism::None,
            TfaVerification::Totp { .. } => TfaMechanism::Totp,
            TfaVerification::U2f { .. } => TfaMechanism::U2f,
            TfaVerification::YubiOtp { .. } => TfaMechanism::YubiOtp,
            TfaVerification::Hotp { .. } => TfaMechanism::Hotp,
        }
    }
}

/// Summary row for the factor overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfaFactorSummary {
    pub id: i64,
    pub key_label: String,
    /// Device prefix, present for Yubico OTP factors only.
    pub modhex_prefix: Option<String>,
}

/// What the user currently has enrolled, as shown in the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfaDescription {
    pub mechanism: TfaMechanism,
    pub pretty: &'static str,
    pub factors: Vec<TfaFactorSummary>,
}

impl TfaDescription {
    /// Builds the overview for a mechanism from the user's factor rows.
    pub fn build(mechanism: TfaMechanism, factors: &[TfaFactor]) -> Self {
        let factors = match mechanism {
            // No factors to list for these.
            TfaMechanism::None | TfaMechanism::Hotp => Vec::new(),
            TfaMechanism::Totp | TfaMechanism::U2f | TfaMechanism::YubiOtp => factors
                .iter()
                .filter(|f| f.mechanism() == mechanism)
                .map(|f| TfaFactorSummary {
                    id: f.id,
                    key_label: f.key_label.clone(),
                    modhex_prefix: match &f.material {
                        TfaMaterial::YubiOtp { modhex_prefix, .. } => Some(modhex_prefix.clone()),
                        _ => None,
                    },
                })
                .collect(),
        };
        Self {
            mechanism,
            pretty: mechanism.pretty(),
            factors,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TotpError {
    #[error("shared secret is not valid base32")]
    InvalidSecret,
    #[error("system clock error")]
    Clock,
}

/// Checks a 6-digit time-step code against a base32 shared secret.
/// Standard 30 second window with one step of tolerance either way.
/// Secrets down to the RFC 4226 minimum are accepted; the panel's
/// generator hands out 16 base32 characters (80 bits).
pub fn verify_totp(secret_base32: &Secret<String>, code: &str) -> Result<bool, TotpError> {
    let secret = totp_rs::Secret::Encoded(secret_base32.expose_secret().clone())
        .to_bytes()
        .map_err(|_| TotpError::InvalidSecret)?;
    let totp = TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, secret);
    totp.check_current(code).map_err(|_| TotpError::Clock)
}

/// Whether a submitted Yubico OTP has the expected 44-character
/// alphanumeric shape.
pub fn yubico_otp_shape_ok(otp: &str) -> bool {
    otp.len() == YUBICO_OTP_LEN && otp.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The 12-character modhex device prefix of a well-shaped Yubico OTP.
pub fn yubico_modhex_prefix(otp: &str) -> &str {
    &otp[..YUBICO_MODHEX_PREFIX_LEN]
}
