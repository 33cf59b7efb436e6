use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use mailward_core::{
    AccountStore, AccountStoreError, AccountTier, DirectoryStore, DirectoryStoreError,
    NewTfaFactor, StoredCredential, TfaFactor, TfaFactorFilter, TfaMaterial, TfaMechanism,
    TfaStore, TfaStoreError, Username, hash_password,
};

#[derive(Default)]
struct Inner {
    credentials: HashMap<(AccountTier, String), Vec<StoredCredential>>,
    factors: Vec<TfaFactor>,
    next_factor_id: i64,
    domains: HashSet<String>,
    // alias domain -> target domain
    alias_domains: HashMap<String, String>,
    // (domain admin username, domain)
    grants: HashSet<(String, String)>,
    // address -> owning domain
    mailboxes: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

/// In-memory directory backing all three store ports. Used in tests and
/// for single-process demos; state is shared across clones.
#[derive(Default, Clone)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a credential row with an already-encoded hash, which may use
    /// any of the legacy schemes.
    pub async fn add_credential(&self, tier: AccountTier, username: &str, encoded_hash: &str) {
        let mut inner = self.inner.write().await;
        inner
            .credentials
            .entry((tier, username.to_string()))
            .or_default()
            .push(StoredCredential {
                password_hash: encoded_hash.to_string(),
                active: true,
            });
    }

    /// Seeds a credential row under the primary hash scheme.
    pub async fn add_password(&self, tier: AccountTier, username: &str, password: &str) {
        self.add_credential(tier, username, &hash_password(password))
            .await;
    }

    pub async fn add_domain(&self, domain: &str) {
        self.inner.write().await.domains.insert(domain.to_string());
    }

    pub async fn add_alias_domain(&self, alias: &str, target: &str) {
        self.inner
            .write()
            .await
            .alias_domains
            .insert(alias.to_string(), target.to_string());
    }

    pub async fn add_grant(&self, username: &str, domain: &str) {
        self.inner
            .write()
            .await
            .grants
            .insert((username.to_string(), domain.to_string()));
    }

    pub async fn add_mailbox(&self, address: &str, domain: &str) {
        self.inner
            .write()
            .await
            .mailboxes
            .insert(address.to_string(), domain.to_string());
    }

    pub async fn add_alias_address(&self, address: &str, domain: &str) {
        self.inner
            .write()
            .await
            .aliases
            .insert(address.to_string(), domain.to_string());
    }

    /// Soft-deactivates every factor of the user ("skip next login").
    pub async fn deactivate_factors(&self, username: &str) {
        let mut inner = self.inner.write().await;
        for factor in inner
            .factors
            .iter_mut()
            .filter(|f| f.username.as_str() == username)
        {
            factor.active = false;
        }
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryDirectory {
    async fn find_credentials(
        &self,
        tier: AccountTier,
        username: &Username,
    ) -> Result<Vec<StoredCredential>, AccountStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .get(&(tier, username.as_str().to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_mailbox_password(
        &self,
        username: &Username,
        password_hash: &str,
    ) -> Result<(), AccountStoreError> {
        let mut inner = self.inner.write().await;
        let rows = inner
            .credentials
            .entry((AccountTier::Mailbox, username.as_str().to_string()))
            .or_default();
        *rows = vec![StoredCredential {
            password_hash: password_hash.to_string(),
            active: true,
        }];
        Ok(())
    }
}

#[async_trait::async_trait]
impl TfaStore for MemoryDirectory {
    async fn active_mechanism(&self, username: &Username) -> Result<TfaMechanism, TfaStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .factors
            .iter()
            .find(|f| f.username == *username && f.active)
            .map(|f| f.mechanism())
            .unwrap_or(TfaMechanism::None))
    }

    async fn list_factors(
        &self,
        username: &Username,
        mechanism: Option<TfaMechanism>,
    ) -> Result<Vec<TfaFactor>, TfaStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .factors
            .iter()
            .filter(|f| f.username == *username)
            .filter(|f| mechanism.is_none_or(|m| f.mechanism() == m))
            .cloned()
            .collect())
    }

    async fn insert_factor(&self, factor: NewTfaFactor) -> Result<i64, TfaStoreError> {
        let mut inner = self.inner.write().await;
        inner.next_factor_id += 1;
        let id = inner.next_factor_id;
        inner.factors.push(TfaFactor {
            id,
            username: factor.username,
            key_label: factor.key_label,
            active: factor.active,
            material: factor.material,
        });
        Ok(id)
    }

    async fn delete_factors(
        &self,
        username: &Username,
        filter: TfaFactorFilter,
    ) -> Result<(), TfaStoreError> {
        let mut inner = self.inner.write().await;
        inner.factors.retain(|f| {
            if f.username != *username {
                return true;
            }
            match &filter {
                TfaFactorFilter::All => false,
                TfaFactorFilter::AllExcept(kept) => f.mechanism() == *kept,
                TfaFactorFilter::YubiEnrollPurge { modhex_prefix } => match &f.material {
                    TfaMaterial::YubiOtp {
                        modhex_prefix: stored,
                        ..
                    } => stored == modhex_prefix,
                    _ => true,
                },
                TfaFactorFilter::ById(id) => f.id != *id,
            }
        });
        Ok(())
    }

    async fn count_active(&self, username: &Username) -> Result<u32, TfaStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .factors
            .iter()
            .filter(|f| f.username == *username && f.active)
            .count() as u32)
    }

    async fn reactivate(&self, username: &Username) -> Result<(), TfaStoreError> {
        let mut inner = self.inner.write().await;
        for factor in inner
            .factors
            .iter_mut()
            .filter(|f| f.username == *username)
        {
            factor.active = true;
        }
        Ok(())
    }

    async fn advance_u2f_counter(&self, id: i64, counter: u32) -> Result<(), TfaStoreError> {
        let mut inner = self.inner.write().await;
        let factor = inner
            .factors
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| TfaStoreError::UnexpectedError(format!("no factor with id {id}")))?;
        match &mut factor.material {
            TfaMaterial::U2f(registration) => {
                registration.counter = counter;
                Ok(())
            }
            _ => Err(TfaStoreError::UnexpectedError(format!(
                "factor {id} is not a U2F factor"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn domain_exists(&self, domain: &str) -> Result<bool, DirectoryStoreError> {
        Ok(self.inner.read().await.domains.contains(domain))
    }

    async fn alias_domain_target(
        &self,
        domain: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.inner.read().await.alias_domains.get(domain).cloned())
    }

    async fn alias_domains_with_target(
        &self,
        target: &str,
    ) -> Result<Vec<String>, DirectoryStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .alias_domains
            .iter()
            .filter(|(_, t)| t.as_str() == target)
            .map(|(alias, _)| alias.clone())
            .collect())
    }

    async fn domain_admin_grant_exists(
        &self,
        username: &Username,
        domain: &str,
    ) -> Result<bool, DirectoryStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .grants
            .contains(&(username.as_str().to_string(), domain.to_string())))
    }

    async fn mailbox_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.inner.read().await.mailboxes.get(address).cloned())
    }

    async fn alias_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.inner.read().await.aliases.get(address).cloned())
    }
}
