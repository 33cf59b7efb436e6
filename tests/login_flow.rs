//! End-to-end flows against the in-memory directory: login, factor
//! enrollment, pending-TFA promotion and the access checks, wired the way
//! a panel process would wire them.

use mailward::{
    AccessControlUseCase, AccountTier, EnrollTfaUseCase, LoginResponse, LoginUseCase,
    MemoryDirectory, OtpValidationClient, OtpValidationError, Role, Secret, SessionContext,
    TfaEnrollment, TfaMechanism, ThrottleNotifier, UnsetTfaUseCase, VerifyTfaUseCase,
    async_trait,
};

struct NoNotifier;

#[async_trait]
impl ThrottleNotifier for NoNotifier {
    async fn invalid_login(&self, _username: &str, _remote_addr: &str) {}
}

struct AcceptAllOtp;

#[async_trait]
impl OtpValidationClient for AcceptAllOtp {
    async fn verify(
        &self,
        _client_id: &str,
        _api_key: &Secret<String>,
        _otp: &str,
    ) -> Result<(), OtpValidationError> {
        Ok(())
    }
}

fn secret(s: &str) -> Secret<String> {
    Secret::from(s.to_string())
}

fn totp_code(secret_b32: &str) -> String {
    let secret = totp_rs::Secret::Encoded(secret_b32.to_string())
        .to_bytes()
        .unwrap();
    totp_rs::TOTP::new_unchecked(totp_rs::Algorithm::SHA1, 6, 1, 30, secret)
        .generate_current()
        .unwrap()
}

const SECRET_B32: &str = "JBSWY3DPEHPK3PXP";

#[tokio::test]
async fn login_enroll_and_verify_round_trip() {
    let directory = MemoryDirectory::new();
    directory
        .add_password(AccountTier::SuperAdmin, "admin", "root pass 1")
        .await;

    let login = LoginUseCase::new(directory.clone(), directory.clone(), NoNotifier);
    let enroll = EnrollTfaUseCase::new(directory.clone(), directory.clone(), AcceptAllOtp);
    let verify = VerifyTfaUseCase::new(directory.clone(), AcceptAllOtp);

    // First login: no factor enrolled yet.
    let mut ctx = SessionContext::new("192.0.2.1");
    let response = login.execute(&mut ctx, "admin", &secret("root pass 1")).await;
    assert_eq!(response, LoginResponse::Authenticated(Role::SuperAdmin));

    // Enroll a TOTP factor from the authenticated session.
    let enrolled = enroll
        .execute(
            &mut ctx,
            TfaEnrollment::Totp {
                key_label: "phone".into(),
                secret: secret(SECRET_B32),
                confirm_code: totp_code(SECRET_B32),
            },
            &secret("root pass 1"),
        )
        .await;
    assert!(enrolled);

    // The next login parks as pending and the code promotes it.
    let mut ctx = SessionContext::new("192.0.2.1");
    let response = login.execute(&mut ctx, "admin", &secret("root pass 1")).await;
    assert_eq!(
        response,
        LoginResponse::PendingTfa {
            mechanism: TfaMechanism::Totp
        }
    );
    let promoted = verify
        .execute(
            &mut ctx,
            mailward::TfaVerification::Totp {
                code: totp_code(SECRET_B32),
            },
        )
        .await;
    assert!(promoted);
    assert_eq!(ctx.identity().map(|i| i.role), Some(Role::SuperAdmin));
}

#[tokio::test]
async fn the_last_factor_can_not_be_unset() {
    let directory = MemoryDirectory::new();
    directory
        .add_password(AccountTier::SuperAdmin, "admin", "root pass 1")
        .await;

    let login = LoginUseCase::new(directory.clone(), directory.clone(), NoNotifier);
    let enroll = EnrollTfaUseCase::new(directory.clone(), directory.clone(), AcceptAllOtp);
    let unset = UnsetTfaUseCase::new(directory.clone());

    let mut ctx = SessionContext::new("192.0.2.1");
    login.execute(&mut ctx, "admin", &secret("root pass 1")).await;
    enroll
        .execute(
            &mut ctx,
            TfaEnrollment::Totp {
                key_label: "phone".into(),
                secret: secret(SECRET_B32),
                confirm_code: totp_code(SECRET_B32),
            },
            &secret("root pass 1"),
        )
        .await;

    // One enrolled factor: removal by id is refused.
    assert!(!unset.execute(&mut ctx, 1).await);

    // Disabling through enrollment still works.
    assert!(enroll.execute(&mut ctx, TfaEnrollment::None, &secret("root pass 1")).await);
}

#[tokio::test]
async fn domain_admin_access_spans_alias_domains() {
    let directory = MemoryDirectory::new();
    directory.add_domain("example.com").await;
    directory.add_alias_domain("alias.example", "example.com").await;
    directory.add_grant("da@example.com", "alias.example").await;
    directory.add_mailbox("user@example.com", "example.com").await;

    let access = AccessControlUseCase::new(directory.clone());
    let mut ctx = SessionContext::new("192.0.2.1");

    assert!(
        access
            .has_domain_access(&mut ctx, "da@example.com", Role::DomainAdmin, "example.com")
            .await
    );
    assert!(
        access
            .has_mailbox_object_access(
                &mut ctx,
                "da@example.com",
                Role::DomainAdmin,
                "user@example.com"
            )
            .await
    );
    assert!(
        !access
            .has_mailbox_object_access(
                &mut ctx,
                "someone@else.test",
                Role::User,
                "user@example.com"
            )
            .await
    );
}
