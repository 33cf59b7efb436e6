use async_trait::async_trait;
use thiserror::Error;

use crate::domain::role::AccountTier;
use crate::domain::tfa::{NewTfaFactor, TfaFactor, TfaMechanism};
use crate::domain::username::Username;

/// One stored password row for a username within a tier. A username may
/// own several rows during hash-scheme migrations; the first row whose
/// hash verifies wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub password_hash: String,
    pub active: bool,
}

// AccountStore port trait and errors
#[derive(Debug, Error)]
pub enum AccountStoreError {
    #[error("unexpected error {0}")]
    UnexpectedError(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All password rows for the username in the given tier, active or
    /// not. Order is the storage order; callers must not rely on it
    /// beyond "first verifying row wins".
    async fn find_credentials(
        &self,
        tier: AccountTier,
        username: &Username,
    ) -> Result<Vec<StoredCredential>, AccountStoreError>;

    /// Replaces the password hash of a mailbox-tier account.
    async fn set_mailbox_password(
        &self,
        username: &Username,
        password_hash: &str,
    ) -> Result<(), AccountStoreError>;
}

// TfaStore port trait and errors
#[derive(Debug, Error)]
pub enum TfaStoreError {
    #[error("unexpected error {0}")]
    UnexpectedError(String),
}

/// Which factor rows a delete targets. A closed set: each variant backs
/// exactly one enrollment or unset rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TfaFactorFilter {
    /// Every factor of the user (TOTP enrollment, disabling TFA).
    All,
    /// Every factor whose mechanism differs (U2F enrollment keeps other
    /// U2F keys).
    AllExcept(TfaMechanism),
    /// Yubico enrollment: drops only Yubico factors registered under a
    /// different device prefix. Factors of other mechanisms stay.
    YubiEnrollPurge { modhex_prefix: String },
    /// One specific factor, by id (unset operation).
    ById(i64),
}

#[async_trait]
pub trait TfaStore: Send + Sync {
    /// The mechanism of the user's active factor, or `None` when no
    /// active factor exists.
    async fn active_mechanism(&self, username: &Username) -> Result<TfaMechanism, TfaStoreError>;

    async fn list_factors(
        &self,
        username: &Username,
        mechanism: Option<TfaMechanism>,
    ) -> Result<Vec<TfaFactor>, TfaStoreError>;

    /// Inserts a factor and returns its assigned id.
    async fn insert_factor(&self, factor: NewTfaFactor) -> Result<i64, TfaStoreError>;

    async fn delete_factors(
        &self,
        username: &Username,
        filter: TfaFactorFilter,
    ) -> Result<(), TfaStoreError>;

    async fn count_active(&self, username: &Username) -> Result<u32, TfaStoreError>;

    /// Re-arms factors that were soft-deactivated for "skip next login".
    async fn reactivate(&self, username: &Username) -> Result<(), TfaStoreError>;

    /// Persists the advanced signature counter of a U2F factor.
    async fn advance_u2f_counter(&self, id: i64, counter: u32) -> Result<(), TfaStoreError>;
}

// DirectoryStore port trait and errors
#[derive(Debug, Error)]
pub enum DirectoryStoreError {
    #[error("unexpected error {0}")]
    UnexpectedError(String),
}

/// Read-only ownership lookups used by post-authentication access checks.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn domain_exists(&self, domain: &str) -> Result<bool, DirectoryStoreError>;

    /// Target of an alias domain, or `None` when the name is not an
    /// alias.
    async fn alias_domain_target(
        &self,
        domain: &str,
    ) -> Result<Option<String>, DirectoryStoreError>;

    /// Alias domains whose target is the given domain.
    async fn alias_domains_with_target(
        &self,
        target: &str,
    ) -> Result<Vec<String>, DirectoryStoreError>;

    /// Whether an active grant links the domain admin to the domain.
    async fn domain_admin_grant_exists(
        &self,
        username: &Username,
        domain: &str,
    ) -> Result<bool, DirectoryStoreError>;

    /// Owning domain of a mailbox address, if the mailbox exists.
    async fn mailbox_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError>;

    /// Owning domain of an alias address, if the alias exists.
    async fn alias_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError>;
}
