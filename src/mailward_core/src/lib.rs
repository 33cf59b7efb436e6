pub mod domain;
pub mod ports;
pub mod session;

// Re-export commonly used types for convenience
pub use domain::{
    outcome::{OutcomeCode, ResultRecord, Severity},
    password::{NewPassword, PasswordError},
    password_hash::{HashParseError, PasswordHash, hash_password, verify_hash},
    role::{AccountTier, LOGIN_TIER_ORDER, Role},
    tfa::{
        NewTfaFactor, TfaDescription, TfaEnrollment, TfaFactor, TfaFactorSummary, TfaMaterial,
        TfaMechanism, TfaVerification, TotpError, verify_totp, yubico_modhex_prefix,
        yubico_otp_shape_ok,
    },
    throttle::LoginThrottle,
    u2f::{
        U2fAuthOutcome, U2fError, U2fRegisterRequest, U2fRegisterResponse, U2fRegistration,
        U2fSignRequest, U2fSignResponse, verify_authentication, verify_registration,
    },
    username::{Username, UsernameError, is_valid_domain_name},
};

pub use ports::{
    repositories::{
        AccountStore, AccountStoreError, DirectoryStore, DirectoryStoreError, StoredCredential,
        TfaFactorFilter, TfaStore, TfaStoreError,
    },
    services::{OtpValidationClient, OtpValidationError, ThrottleNotifier},
};

pub use session::{AuthenticatedIdentity, PendingAuth, SessionContext};
