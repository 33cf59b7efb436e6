//! # Mailward - Mail Admin Panel Auth Library
//!
//! This is a facade crate that re-exports all public APIs from the mailward
//! components. Use this crate to get access to the panel's authentication,
//! second-factor and access-control functionality in one place.
//!
//! ## Usage
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! mailward = { path = "../mailward" }
//! ```
//!
//! ## Structure
//!
//! - **Core domain types**: `Username`, `Role`, `PasswordHash`, `TfaMechanism`, etc.
//! - **Repository traits**: `AccountStore`, `TfaStore`, `DirectoryStore`
//! - **Use cases**: `LoginUseCase`, `VerifyTfaUseCase`, `EnrollTfaUseCase`, etc.
//! - **Adapters**: `PgDirectoryStore`, `MemoryDirectory`, `RedisFailBanNotifier`,
//!   `YubicoHttpClient`

// ============================================================================
// Core Domain Types
// ============================================================================

/// Core domain types and value objects
pub mod core {
    pub use mailward_core::*;
}

// Re-export most commonly used core types at the root level
pub use mailward_core::{
    AccountTier, AuthenticatedIdentity, NewPassword, OutcomeCode, PasswordError, PasswordHash,
    PendingAuth, ResultRecord, Role, SessionContext, Severity, TfaDescription, TfaEnrollment,
    TfaMechanism, TfaVerification, Username, UsernameError, hash_password, is_valid_domain_name,
    verify_hash,
};

// ============================================================================
// Repository Traits (Ports)
// ============================================================================

/// Repository and service trait definitions
pub mod ports {
    pub use mailward_core::ports::repositories::*;
    pub use mailward_core::ports::services::*;
}

// Re-export port traits at root level
pub use mailward_core::{
    AccountStore, AccountStoreError, DirectoryStore, DirectoryStoreError, OtpValidationClient,
    OtpValidationError, TfaStore, TfaStoreError, ThrottleNotifier,
};

// ============================================================================
// Use Cases (Application Layer)
// ============================================================================

/// Application use cases
pub mod use_cases {
    pub use mailward_application::*;
}

// Re-export use cases at root level
pub use mailward_application::{
    AccessControlUseCase, ChangePasswordUseCase, DescribeTfaUseCase, EnrollTfaUseCase,
    LoginResponse, LoginUseCase, UnsetTfaUseCase, VerifyTfaUseCase,
};

// ============================================================================
// Adapters (Infrastructure)
// ============================================================================

/// Infrastructure adapters
pub mod adapters {
    /// Persistence implementations
    pub mod persistence {
        pub use mailward_adapters::persistence::*;
    }

    /// Fail-ban notification feed
    pub mod notify {
        pub use mailward_adapters::notify::*;
    }

    /// Remote OTP validation
    pub mod otp {
        pub use mailward_adapters::otp::*;
    }

    /// Configuration
    pub mod config {
        pub use mailward_adapters::config::*;
    }
}

// Re-export commonly used adapters at root level
pub use mailward_adapters::{
    MemoryDirectory, PgDirectoryStore, RedisFailBanNotifier, Settings, YubicoHttpClient,
};

// ============================================================================
// Re-export common external dependencies
// ============================================================================

/// Re-export async-trait for implementing the port traits
pub use async_trait::async_trait;

/// Re-export secrecy for working with secrets
pub use secrecy::{ExposeSecret, Secret};
