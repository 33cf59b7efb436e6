use mailward_core::{
    AccountStore, AuthenticatedIdentity, OtpValidationClient, OutcomeCode, ResultRecord,
    SessionContext, TfaEnrollment, TfaFactorFilter, TfaMaterial, TfaMechanism, TfaStore,
    TfaStoreError, NewTfaFactor, Username, verify_hash, verify_registration, verify_totp,
    yubico_modhex_prefix, yubico_otp_shape_ok,
};
use secrecy::{ExposeSecret, Secret};

/// Factor enrollment: a signed-in admin or domain admin proves possession
/// of the new factor and re-enters their password, then the registry is
/// rewritten according to the per-mechanism replacement rule.
pub struct EnrollTfaUseCase<A, T, O>
where
    A: AccountStore,
    T: TfaStore,
    O: OtpValidationClient,
{
    accounts: A,
    tfa: T,
    otp_client: O,
}

impl<A, T, O> EnrollTfaUseCase<A, T, O>
where
    A: AccountStore,
    T: TfaStore,
    O: OtpValidationClient,
{
    pub fn new(accounts: A, tfa: T, otp_client: O) -> Self {
        Self {
            accounts,
            tfa,
            otp_client,
        }
    }

    #[tracing::instrument(
        name = "EnrollTfaUseCase::execute",
        skip(self, ctx, enrollment, confirm_password)
    )]
    pub async fn execute(
        &self,
        ctx: &mut SessionContext,
        enrollment: TfaEnrollment,
        confirm_password: &Secret<String>,
    ) -> bool {
        let Some(identity) = ctx.identity().cloned() else {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        };
        if !identity.role.may_manage_tfa() {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        }
        match self.password_confirmed(&identity, confirm_password).await {
            Ok(true) => {}
            Ok(false) => {
                ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
                return false;
            }
            Err(error) => {
                tracing::error!(%error, "credential lookup failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        }

        let username = identity.username;
        let outcome = match enrollment {
            TfaEnrollment::None => self.disable(&username).await,
            TfaEnrollment::Totp {
                key_label,
                secret,
                confirm_code,
            } => {
                // Possession proof before anything is deleted.
                match verify_totp(&secret, &confirm_code) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => {
                        ctx.record(ResultRecord::danger(OutcomeCode::TotpVerificationFailed));
                        return false;
                    }
                }
                self.replace_all(
                    &username,
                    NewTfaFactor {
                        username: username.clone(),
                        key_label,
                        active: true,
                        material: TfaMaterial::Totp { secret },
                    },
                )
                .await
            }
            TfaEnrollment::YubiOtp {
                key_label,
                client_id,
                api_key,
                otp,
            } => {
                if !yubico_otp_shape_ok(&otp) {
                    ctx.record(
                        ResultRecord::danger(OutcomeCode::TfaTokenInvalid)
                            .with_arg("token length error"),
                    );
                    return false;
                }
                if let Err(error) = self.otp_client.verify(&client_id, &api_key, &otp).await {
                    ctx.record(
                        ResultRecord::danger(OutcomeCode::YotpVerificationFailed)
                            .with_arg(error.to_string()),
                    );
                    return false;
                }
                let modhex_prefix = yubico_modhex_prefix(&otp).to_string();
                self.enroll_yubi(&username, key_label, client_id, api_key, modhex_prefix)
                    .await
            }
            TfaEnrollment::U2f { key_label, response } => {
                let Some(request) = ctx.take_u2f_register() else {
                    ctx.record(
                        ResultRecord::danger(OutcomeCode::U2fVerificationFailed)
                            .with_arg("no outstanding challenge"),
                    );
                    return false;
                };
                let registration = match verify_registration(&request, &response) {
                    Ok(registration) => registration,
                    Err(error) => {
                        ctx.record(
                            ResultRecord::danger(OutcomeCode::U2fVerificationFailed)
                                .with_arg(error.to_string()),
                        );
                        return false;
                    }
                };
                self.enroll_u2f(&username, key_label, registration).await
            }
            TfaEnrollment::Hotp => {
                // Recognized tag without an enrollment path.
                ctx.record(ResultRecord::danger(OutcomeCode::UnknownTfaMethod));
                return false;
            }
        };

        match outcome {
            Ok(()) => {
                ctx.record(
                    ResultRecord::success(OutcomeCode::ObjectModified).with_arg(username.as_str()),
                );
                true
            }
            Err(error) => {
                tracing::error!(%error, "factor registry update failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                false
            }
        }
    }

    async fn password_confirmed(
        &self,
        identity: &AuthenticatedIdentity,
        password: &Secret<String>,
    ) -> Result<bool, mailward_core::AccountStoreError> {
        let rows = self
            .accounts
            .find_credentials(identity.role.tier(), &identity.username)
            .await?;
        Ok(rows
            .iter()
            .any(|row| row.active && verify_hash(&row.password_hash, password.expose_secret())))
    }

    async fn disable(&self, username: &Username) -> Result<(), TfaStoreError> {
        self.tfa.delete_factors(username, TfaFactorFilter::All).await
    }

    /// TOTP is exclusive: enrolling replaces every prior factor.
    async fn replace_all(
        &self,
        username: &Username,
        factor: NewTfaFactor,
    ) -> Result<(), TfaStoreError> {
        self.tfa.delete_factors(username, TfaFactorFilter::All).await?;
        self.tfa.insert_factor(factor).await?;
        Ok(())
    }

    /// Yubico: purge only Yubico factors with a different device prefix,
    /// then store `client_id:api_key:prefix`.
    async fn enroll_yubi(
        &self,
        username: &Username,
        key_label: String,
        client_id: String,
        api_key: Secret<String>,
        modhex_prefix: String,
    ) -> Result<(), TfaStoreError> {
        self.tfa
            .delete_factors(
                username,
                TfaFactorFilter::YubiEnrollPurge {
                    modhex_prefix: modhex_prefix.clone(),
                },
            )
            .await?;
        self.tfa
            .insert_factor(NewTfaFactor {
                username: username.clone(),
                key_label,
                active: true,
                material: TfaMaterial::YubiOtp {
                    client_id,
                    api_key,
                    modhex_prefix,
                },
            })
            .await?;
        Ok(())
    }

    /// U2F accumulates keys: only factors of other mechanisms are purged.
    async fn enroll_u2f(
        &self,
        username: &Username,
        key_label: String,
        registration: mailward_core::U2fRegistration,
    ) -> Result<(), TfaStoreError> {
        self.tfa
            .delete_factors(username, TfaFactorFilter::AllExcept(TfaMechanism::U2f))
            .await?;
        self.tfa
            .insert_factor(NewTfaFactor {
                username: username.clone(),
                key_label,
                active: true,
                material: TfaMaterial::U2f(registration),
            })
            .await?;
        Ok(())
    }
}
