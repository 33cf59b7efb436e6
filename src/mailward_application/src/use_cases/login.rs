use mailward_core::{
    AccountStore, AccountTier, AuthenticatedIdentity, LOGIN_TIER_ORDER, OutcomeCode, PendingAuth,
    ResultRecord, Role, SessionContext, TfaMechanism, TfaStore, ThrottleNotifier, Username,
    verify_hash,
};
use secrecy::{ExposeSecret, Secret};

/// Response from the login use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    /// Credentials verified, no second factor enrolled.
    Authenticated(Role),
    /// Credentials verified, second factor outstanding.
    PendingTfa { mechanism: TfaMechanism },
    /// Anything else. The session records carry the reason.
    Rejected,
}

/// Login use case: tiered credential verification with per-session
/// throttling and a TFA consult on success.
pub struct LoginUseCase<A, T, N>
where
    A: AccountStore,
    T: TfaStore,
    N: ThrottleNotifier,
{
    accounts: A,
    tfa: T,
    notifier: N,
}

impl<A, T, N> LoginUseCase<A, T, N>
where
    A: AccountStore,
    T: TfaStore,
    N: ThrottleNotifier,
{
    pub fn new(accounts: A, tfa: T, notifier: N) -> Self {
        Self {
            accounts,
            tfa,
            notifier,
        }
    }

    /// Execute the login use case.
    ///
    /// Tiers are consulted in strict privilege order and the first tier
    /// holding rows for the username decides the attempt; lower tiers are
    /// consulted only when every higher tier is empty. A failed attempt
    /// drives the session throttle and only returns after the computed
    /// delay has elapsed.
    #[tracing::instrument(name = "LoginUseCase::execute", skip(self, ctx, password))]
    pub async fn execute(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        password: &Secret<String>,
    ) -> LoginResponse {
        // Pre-lookup guard: a malformed username never reaches storage
        // and never drives the throttle.
        let username = match Username::parse(username) {
            Ok(username) => username,
            Err(_) => {
                ctx.record(ResultRecord::danger(OutcomeCode::MalformedUsername));
                return LoginResponse::Rejected;
            }
        };

        for tier in LOGIN_TIER_ORDER {
            match self.tier_decision(tier, &username, password).await {
                Ok(Some(true)) => {
                    ctx.throttle().clear();
                    return self.conclude(ctx, &username, tier.role()).await;
                }
                // The tier claims the username but no row verifies. The
                // attempt fails here; a lower tier never gets a say.
                Ok(Some(false)) => return self.reject(ctx, &username).await,
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(%error, tier = ?tier, "credential lookup failed");
                    ctx.record(
                        ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                    );
                    return LoginResponse::Rejected;
                }
            }
        }

        self.reject(ctx, &username).await
    }

    /// The tier's decision for the username: `None` when the tier holds
    /// no rows at all, otherwise whether any active row verifies the
    /// password.
    async fn tier_decision(
        &self,
        tier: AccountTier,
        username: &Username,
        password: &Secret<String>,
    ) -> Result<Option<bool>, mailward_core::AccountStoreError> {
        let rows = self.accounts.find_credentials(tier, username).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.iter().any(|row| {
            row.active && verify_hash(&row.password_hash, password.expose_secret())
        })))
    }

    /// Credentials verified: consult the factor registry and either hand
    /// out the identity or park the login as pending.
    async fn conclude(
        &self,
        ctx: &mut SessionContext,
        username: &Username,
        role: Role,
    ) -> LoginResponse {
        let mechanism = match self.tfa.active_mechanism(username).await {
            Ok(mechanism) => mechanism,
            Err(error) => {
                tracing::error!(%error, "factor lookup failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return LoginResponse::Rejected;
            }
        };

        // Re-arm factors soft-deactivated for "skip next login". Read the
        // active mechanism first so the re-armed factor does not apply to
        // this very login.
        if let Err(error) = self.tfa.reactivate(username).await {
            tracing::warn!(%error, "factor reactivation failed");
        }

        match mechanism {
            TfaMechanism::None => {
                ctx.record(
                    ResultRecord::success(OutcomeCode::LoggedInAs)
                        .with_arg(role.as_str())
                        .with_arg(username.as_str()),
                );
                ctx.set_identity(AuthenticatedIdentity {
                    username: username.clone(),
                    role,
                });
                LoginResponse::Authenticated(role)
            }
            mechanism => {
                ctx.record(
                    ResultRecord::info(OutcomeCode::AwaitingTfaConfirmation)
                        .with_arg(username.as_str()),
                );
                ctx.set_pending(PendingAuth {
                    username: username.clone(),
                    role,
                    mechanism,
                });
                LoginResponse::PendingTfa { mechanism }
            }
        }
    }

    /// No tier verified: notify the ban feed, stall for the throttle
    /// delay, record the failure.
    async fn reject(&self, ctx: &mut SessionContext, username: &Username) -> LoginResponse {
        let identity_attached = ctx.has_identity();
        let delay = ctx.throttle().register_failure(identity_attached);
        self.notifier
            .invalid_login(username.as_str(), ctx.remote_addr())
            .await;
        tokio::time::sleep(delay).await;
        ctx.record(ResultRecord::danger(OutcomeCode::LoginFailed).with_arg(username.as_str()));
        LoginResponse::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailward_core::{
        AccountStoreError, NewTfaFactor, StoredCredential, TfaFactor, TfaFactorFilter,
        TfaStoreError, hash_password,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockAccountStore {
        rows: HashMap<(AccountTier, String), Vec<StoredCredential>>,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl MockAccountStore {
        fn with_password(tier: AccountTier, username: &str, password: &str) -> Self {
            let mut store = Self::default();
            store.add(tier, username, password);
            store
        }

        fn add(&mut self, tier: AccountTier, username: &str, password: &str) {
            self.rows
                .entry((tier, username.to_string()))
                .or_default()
                .push(StoredCredential {
                    password_hash: hash_password(password),
                    active: true,
                });
        }
    }

    #[async_trait::async_trait]
    impl AccountStore for MockAccountStore {
        async fn find_credentials(
            &self,
            tier: AccountTier,
            username: &Username,
        ) -> Result<Vec<StoredCredential>, AccountStoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AccountStoreError::UnexpectedError("db down".into()));
            }
            Ok(self
                .rows
                .get(&(tier, username.as_str().to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn set_mailbox_password(
            &self,
            _username: &Username,
            _password_hash: &str,
        ) -> Result<(), AccountStoreError> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct MockTfaStore {
        mechanism: Option<TfaMechanism>,
        reactivations: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TfaStore for MockTfaStore {
        async fn active_mechanism(&self, _username: &Username) -> Result<TfaMechanism, TfaStoreError> {
            Ok(self.mechanism.unwrap_or(TfaMechanism::None))
        }

        async fn list_factors(
            &self,
            _username: &Username,
            _mechanism: Option<TfaMechanism>,
        ) -> Result<Vec<TfaFactor>, TfaStoreError> {
            unimplemented!()
        }

        async fn insert_factor(&self, _factor: NewTfaFactor) -> Result<i64, TfaStoreError> {
            unimplemented!()
        }

        async fn delete_factors(
            &self,
            _username: &Username,
            _filter: TfaFactorFilter,
        ) -> Result<(), TfaStoreError> {
            unimplemented!()
        }

        async fn count_active(&self, _username: &Username) -> Result<u32, TfaStoreError> {
            unimplemented!()
        }

        async fn reactivate(&self, _username: &Username) -> Result<(), TfaStoreError> {
            self.reactivations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn advance_u2f_counter(&self, _id: i64, _counter: u32) -> Result<(), TfaStoreError> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notifications: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ThrottleNotifier for RecordingNotifier {
        async fn invalid_login(&self, username: &str, remote_addr: &str) {
            self.notifications
                .lock()
                .unwrap()
                .push((username.to_string(), remote_addr.to_string()));
        }
    }

    fn secret(s: &str) -> Secret<String> {
        Secret::from(s.to_string())
    }

    #[tokio::test]
    async fn higher_tier_wins_over_mailbox_with_same_username() {
        let mut accounts = MockAccountStore::with_password(
            AccountTier::DomainAdmin,
            "admin@example.com",
            "admin pass 1",
        );
        accounts.add(AccountTier::Mailbox, "admin@example.com", "mailbox pass 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case
            .execute(&mut ctx, "admin@example.com", &secret("admin pass 1"))
            .await;
        assert_eq!(response, LoginResponse::Authenticated(Role::DomainAdmin));

        // The mailbox password does not satisfy the domainadmin tier, and
        // the mailbox tier is never reached for it.
        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case
            .execute(&mut ctx, "admin@example.com", &secret("mailbox pass 1"))
            .await;
        assert_eq!(response, LoginResponse::Rejected);

        // Two lookups per attempt: the empty superadmin tier, then the
        // domainadmin tier which decides. The mailbox tier was not read.
        assert_eq!(use_case.accounts.lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn mailbox_password_authenticates_when_username_exists_only_there() {
        let accounts =
            MockAccountStore::with_password(AccountTier::Mailbox, "user@example.com", "user pass 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case
            .execute(&mut ctx, "User@Example.com", &secret("user pass 1"))
            .await;
        assert_eq!(response, LoginResponse::Authenticated(Role::User));
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::LoggedInAs)
        );
    }

    #[tokio::test]
    async fn enrolled_factor_parks_the_login_as_pending() {
        let accounts = MockAccountStore::with_password(
            AccountTier::SuperAdmin,
            "admin",
            "root pass 1",
        );
        let tfa = MockTfaStore {
            mechanism: Some(TfaMechanism::Totp),
            ..Default::default()
        };
        let use_case = LoginUseCase::new(accounts, tfa, RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case.execute(&mut ctx, "admin", &secret("root pass 1")).await;
        assert_eq!(
            response,
            LoginResponse::PendingTfa {
                mechanism: TfaMechanism::Totp
            }
        );
        assert!(!ctx.has_identity());
        assert_eq!(ctx.pending().map(|p| p.role), Some(Role::SuperAdmin));
        assert_eq!(use_case.tfa.reactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reactivates_soft_deactivated_factors_on_direct_success() {
        let accounts =
            MockAccountStore::with_password(AccountTier::SuperAdmin, "admin", "root pass 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        use_case.execute(&mut ctx, "admin", &secret("root pass 1")).await;
        assert_eq!(use_case.tfa.reactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_logins_stall_in_half_second_steps() {
        let accounts =
            MockAccountStore::with_password(AccountTier::Mailbox, "user@example.com", "right one 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("203.0.113.9");
        for expected in [0.0_f64, 0.5, 1.0] {
            let before = tokio::time::Instant::now();
            let response = use_case
                .execute(&mut ctx, "user@example.com", &secret("wrong one 1"))
                .await;
            assert_eq!(response, LoginResponse::Rejected);
            assert_eq!(before.elapsed(), Duration::from_secs_f64(expected));
        }

        let notifications = use_case.notifier.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 3);
        assert_eq!(
            notifications[0],
            ("user@example.com".to_string(), "203.0.113.9".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_throttle() {
        let accounts =
            MockAccountStore::with_password(AccountTier::Mailbox, "user@example.com", "right one 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("203.0.113.9");
        use_case
            .execute(&mut ctx, "user@example.com", &secret("wrong one 1"))
            .await;
        use_case
            .execute(&mut ctx, "user@example.com", &secret("wrong one 1"))
            .await;
        use_case
            .execute(&mut ctx, "user@example.com", &secret("right one 1"))
            .await;

        let before = tokio::time::Instant::now();
        use_case
            .execute(&mut ctx, "user@example.com", &secret("wrong one 1"))
            .await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_identity_does_not_grow_the_delay() {
        let accounts =
            MockAccountStore::with_password(AccountTier::Mailbox, "user@example.com", "right one 1");
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("203.0.113.9");
        ctx.set_identity(AuthenticatedIdentity {
            username: Username::parse("admin").unwrap(),
            role: Role::SuperAdmin,
        });
        for _ in 0..3 {
            let before = tokio::time::Instant::now();
            use_case
                .execute(&mut ctx, "user@example.com", &secret("wrong one 1"))
                .await;
            assert_eq!(before.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn malformed_username_never_reaches_storage() {
        let accounts = MockAccountStore::default();
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case
            .execute(&mut ctx, "not an email!! ", &secret("whatever 1"))
            .await;
        assert_eq!(response, LoginResponse::Rejected);
        assert_eq!(use_case.accounts.lookups.load(Ordering::SeqCst), 0);
        assert!(use_case.notifier.notifications.lock().unwrap().is_empty());
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::MalformedUsername)
        );
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_rejection() {
        let accounts = MockAccountStore {
            fail: true,
            ..Default::default()
        };
        let use_case = LoginUseCase::new(accounts, MockTfaStore::default(), RecordingNotifier::default());

        let mut ctx = SessionContext::new("192.0.2.1");
        let response = use_case
            .execute(&mut ctx, "user@example.com", &secret("whatever 1"))
            .await;
        assert_eq!(response, LoginResponse::Rejected);
        assert_eq!(
            ctx.records().last().map(|r| r.code),
            Some(OutcomeCode::StorageError)
        );
    }
}
