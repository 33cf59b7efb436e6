use mailward_core::{
    AccountStore, AccountTier, NewPassword, OutcomeCode, PasswordError, ResultRecord, Role,
    SessionContext, hash_password, verify_hash,
};
use secrecy::{ExposeSecret, Secret};

/// A mailbox user changing their own password: old password proves the
/// caller, the new one passes the complexity policy and is stored under
/// the primary hash scheme.
pub struct ChangePasswordUseCase<A>
where
    A: AccountStore,
{
    accounts: A,
}

impl<A> ChangePasswordUseCase<A>
where
    A: AccountStore,
{
    pub fn new(accounts: A) -> Self {
        Self { accounts }
    }

    #[tracing::instrument(
        name = "ChangePasswordUseCase::execute",
        skip(self, ctx, old_password, new_password, confirmation)
    )]
    pub async fn execute(
        &self,
        ctx: &mut SessionContext,
        old_password: &Secret<String>,
        new_password: Secret<String>,
        confirmation: &Secret<String>,
    ) -> bool {
        let Some(identity) = ctx.identity().cloned() else {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        };
        if identity.role != Role::User || !identity.username.is_email_shaped() {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        }

        let rows = match self
            .accounts
            .find_credentials(AccountTier::Mailbox, &identity.username)
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                tracing::error!(%error, "credential lookup failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        };
        let old_verifies = rows
            .iter()
            .any(|row| row.active && verify_hash(&row.password_hash, old_password.expose_secret()));
        if !old_verifies {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        }

        let new_password = match NewPassword::parse_confirmed(new_password, confirmation) {
            Ok(password) => password,
            Err(PasswordError::Mismatch) => {
                ctx.record(ResultRecord::danger(OutcomeCode::PasswordMismatch));
                return false;
            }
            Err(PasswordError::Complexity) => {
                ctx.record(ResultRecord::danger(OutcomeCode::PasswordComplexity));
                return false;
            }
        };

        match self
            .accounts
            .set_mailbox_password(&identity.username, &hash_password(new_password.expose()))
            .await
        {
            Ok(()) => {
                ctx.record(
                    ResultRecord::success(OutcomeCode::ObjectModified)
                        .with_arg(identity.username.as_str()),
                );
                true
            }
            Err(error) => {
                tracing::error!(%error, "password update failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailward_core::{
        AccountStoreError, AuthenticatedIdentity, StoredCredential, Username, verify_hash,
    };
    use std::sync::Mutex;

    struct MockAccountStore {
        password_hash: String,
        updates: Mutex<Vec<(String, String)>>,
    }

    impl MockAccountStore {
        fn with_password(password: &str) -> Self {
            Self {
                password_hash: hash_password(password),
                updates: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl AccountStore for MockAccountStore {
        async fn find_credentials(
            &self,
            _tier: AccountTier,
            _username: &Username,
        ) -> Result<Vec<StoredCredential>, AccountStoreError> {
            Ok(vec![StoredCredential {
                password_hash: self.password_hash.clone(),
                active: true,
            }])
        }

        async fn set_mailbox_password(
            &self,
            username: &Username,
            password_hash: &str,
        ) -> Result<(), AccountStoreError> {
            self.updates
                .lock()
                .unwrap()
                .push((username.as_str().to_string(), password_hash.to_string()));
            Ok(())
        }
    }

    fn secret(s: &str) -> Secret<String> {
        Secret::from(s.to_string())
    }

    fn user_ctx() -> SessionContext {
        let mut ctx = SessionContext::new("192.0.2.1");
        ctx.set_identity(AuthenticatedIdentity {
            username: Username::parse("user@example.com").unwrap(),
            role: Role::User,
        });
        ctx
    }

    #[tokio::test]
    async fn stores_the_new_password_under_the_primary_scheme() {
        let use_case = ChangePasswordUseCase::new(MockAccountStore::with_password("old pass 1"));
        let mut ctx = user_ctx();

        let changed = use_case
            .execute(
                &mut ctx,
                &secret("old pass 1"),
                secret("new pass 2"),
                &secret("new pass 2"),
            )
            .await;
        assert!(changed);

        let updates = use_case.accounts.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "user@example.com");
        assert!(updates[0].1.starts_with("{SSHA256}"));
        assert!(verify_hash(&updates[0].1, "new pass 2"));
    }

    #[tokio::test]
    async fn wrong_old_password_is_denied() {
        let use_case = ChangePasswordUseCase::new(MockAccountStore::with_password("old pass 1"));
        let mut ctx = user_ctx();

        let changed = use_case
            .execute(
                &mut ctx,
                &secret("not the old one 1"),
                secret("new pass 2"),
                &secret("new pass 2"),
            )
            .await;
        assert!(!changed);
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::AccessDenied)
        );
    }

    #[tokio::test]
    async fn mismatched_confirmation_is_reported_before_complexity() {
        let use_case = ChangePasswordUseCase::new(MockAccountStore::with_password("old pass 1"));
        let mut ctx = user_ctx();

        let changed = use_case
            .execute(
                &mut ctx,
                &secret("old pass 1"),
                secret("short"),
                &secret("other"),
            )
            .await;
        assert!(!changed);
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::PasswordMismatch)
        );
    }

    #[tokio::test]
    async fn weak_passwords_are_rejected() {
        let use_case = ChangePasswordUseCase::new(MockAccountStore::with_password("old pass 1"));
        let mut ctx = user_ctx();

        let changed = use_case
            .execute(
                &mut ctx,
                &secret("old pass 1"),
                secret("abcdef"),
                &secret("abcdef"),
            )
            .await;
        assert!(!changed);
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::PasswordComplexity)
        );
        assert!(use_case.accounts.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn admins_do_not_change_passwords_here() {
        let use_case = ChangePasswordUseCase::new(MockAccountStore::with_password("old pass 1"));
        let mut ctx = SessionContext::new("192.0.2.1");
        ctx.set_identity(AuthenticatedIdentity {
            username: Username::parse("admin").unwrap(),
            role: Role::SuperAdmin,
        });

        let changed = use_case
            .execute(
                &mut ctx,
                &secret("old pass 1"),
                secret("new pass 2"),
                &secret("new pass 2"),
            )
            .await;
        assert!(!changed);
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::AccessDenied)
        );
    }
}
