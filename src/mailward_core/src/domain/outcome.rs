//! Structured outcome records. Every public operation of the core pushes
//! one of these into the session context; presentation and localization of
//! the machine-readable code belong to an external collaborator.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Danger,
}

/// Machine-readable outcome keys, serialized in snake case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCode {
    MalformedUsername,
    AccessDenied,
    LoginFailed,
    LoggedInAs,
    AwaitingTfaConfirmation,
    PasswordMismatch,
    PasswordComplexity,
    ObjectModified,
    LastKey,
    UnknownTfaMethod,
    TfaTokenInvalid,
    TotpVerificationFailed,
    YotpVerificationFailed,
    U2fVerificationFailed,
    HotpVerificationFailed,
    VerifiedTotpLogin,
    VerifiedYotpLogin,
    VerifiedU2fLogin,
    StorageError,
}

impl OutcomeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCode::MalformedUsername => "malformed_username",
            OutcomeCode::AccessDenied => "access_denied",
            OutcomeCode::LoginFailed => "login_failed",
            OutcomeCode::LoggedInAs => "logged_in_as",
            OutcomeCode::AwaitingTfaConfirmation => "awaiting_tfa_confirmation",
            OutcomeCode::PasswordMismatch => "password_mismatch",
            OutcomeCode::PasswordComplexity => "password_complexity",
            OutcomeCode::ObjectModified => "object_modified",
            OutcomeCode::LastKey => "last_key",
            OutcomeCode::UnknownTfaMethod => "unknown_tfa_method",
            OutcomeCode::TfaTokenInvalid => "tfa_token_invalid",
            OutcomeCode::TotpVerificationFailed => "totp_verification_failed",
            OutcomeCode::YotpVerificationFailed => "yotp_verification_failed",
            OutcomeCode::U2fVerificationFailed => "u2f_verification_failed",
            OutcomeCode::HotpVerificationFailed => "hotp_verification_failed",
            OutcomeCode::VerifiedTotpLogin => "verified_totp_login",
            OutcomeCode::VerifiedYotpLogin => "verified_yotp_login",
            OutcomeCode::VerifiedU2fLogin => "verified_u2f_login",
            OutcomeCode::StorageError => "storage_error",
        }
    }
}

/// One observable outcome of an operation: severity, code and ordered
/// interpolation arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub code: OutcomeCode,
    pub args: Vec<String>,
}

impl ResultRecord {
    pub fn new(severity: Severity, code: OutcomeCode) -> Self {
        Self {
            severity,
            code,
            args: Vec::new(),
        }
    }

    pub fn success(code: OutcomeCode) -> Self {
        Self::new(Severity::Success, code)
    }

    pub fn info(code: OutcomeCode) -> Self {
        Self::new(Severity::Info, code)
    }

    pub fn danger(code: OutcomeCode) -> Self {
        Self::new(Severity::Danger, code)
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
