use mailward_core::{
    AuthenticatedIdentity, OtpValidationClient, OutcomeCode, PendingAuth, ResultRecord,
    SessionContext, TfaMaterial, TfaMechanism, TfaStore, TfaVerification, U2fRegistration,
    verify_authentication, verify_totp, yubico_modhex_prefix, yubico_otp_shape_ok,
};

/// Second step of a pending login: checks the submitted factor proof
/// against the user's enrolled factors and, on success, promotes the
/// pending authentication to a full identity.
pub struct VerifyTfaUseCase<T, O>
where
    T: TfaStore,
    O: OtpValidationClient,
{
    tfa: T,
    otp_client: O,
}

impl<T, O> VerifyTfaUseCase<T, O>
where
    T: TfaStore,
    O: OtpValidationClient,
{
    pub fn new(tfa: T, otp_client: O) -> Self {
        Self { tfa, otp_client }
    }

    /// Execute the verification. Returns whether the login was promoted;
    /// the session records carry the per-mechanism outcome either way.
    #[tracing::instrument(name = "VerifyTfaUseCase::execute", skip(self, ctx, attempt))]
    pub async fn execute(&self, ctx: &mut SessionContext, attempt: TfaVerification) -> bool {
        let Some(pending) = ctx.pending().cloned() else {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        };

        // The stored mechanism is authoritative; a proof for any other
        // mechanism is rejected without touching factor material.
        let mechanism = match self.tfa.active_mechanism(&pending.username).await {
            Ok(mechanism) => mechanism,
            Err(error) => {
                tracing::error!(%error, "factor lookup failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        };
        if attempt.mechanism() != mechanism {
            ctx.record(ResultRecord::danger(OutcomeCode::UnknownTfaMethod));
            return false;
        }

        match attempt {
            TfaVerification::Totp { code } => self.verify_totp(ctx, &pending, &code).await,
            TfaVerification::YubiOtp { otp } => self.verify_yubi(ctx, &pending, &otp).await,
            TfaVerification::U2f { response } => {
                let factors = match self
                    .tfa
                    .list_factors(&pending.username, Some(TfaMechanism::U2f))
                    .await
                {
                    Ok(factors) => factors,
                    Err(error) => {
                        tracing::error!(%error, "factor listing failed");
                        ctx.record(
                            ResultRecord::danger(OutcomeCode::StorageError)
                                .with_arg(error.to_string()),
                        );
                        return false;
                    }
                };
                let registrations: Vec<(i64, U2fRegistration)> = factors
                    .into_iter()
                    .filter(|f| f.active)
                    .filter_map(|f| match f.material {
                        TfaMaterial::U2f(registration) => Some((f.id, registration)),
                        _ => None,
                    })
                    .collect();

                let Some(request) = ctx.take_u2f_sign() else {
                    ctx.record(
                        ResultRecord::danger(OutcomeCode::U2fVerificationFailed)
                            .with_arg("no outstanding challenge"),
                    );
                    return false;
                };
                match verify_authentication(&request, &response, &registrations) {
                    Ok(outcome) => {
                        if let Err(error) = self
                            .tfa
                            .advance_u2f_counter(outcome.factor_id, outcome.counter)
                            .await
                        {
                            tracing::error!(%error, "counter advance failed");
                            ctx.record(
                                ResultRecord::danger(OutcomeCode::StorageError)
                                    .with_arg(error.to_string()),
                            );
                            return false;
                        }
                        self.promote(ctx, pending, outcome.factor_id, OutcomeCode::VerifiedU2fLogin);
                        true
                    }
                    Err(error) => {
                        ctx.record(
                            ResultRecord::danger(OutcomeCode::U2fVerificationFailed)
                                .with_arg(error.to_string()),
                        );
                        false
                    }
                }
            }
            TfaVerification::Hotp { .. } => {
                // Recognized but not implemented; always fails.
                ctx.record(ResultRecord::danger(OutcomeCode::HotpVerificationFailed));
                false
            }
            TfaVerification::None => {
                ctx.record(ResultRecord::danger(OutcomeCode::UnknownTfaMethod));
                false
            }
        }
    }

    async fn verify_totp(&self, ctx: &mut SessionContext, pending: &PendingAuth, code: &str) -> bool {
        let factors = match self
            .tfa
            .list_factors(&pending.username, Some(TfaMechanism::Totp))
            .await
        {
            Ok(factors) => factors,
            Err(error) => {
                tracing::error!(%error, "factor listing failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        };

        for factor in factors.iter().filter(|f| f.active) {
            let TfaMaterial::Totp { secret } = &factor.material else {
                continue;
            };
            match verify_totp(secret, code) {
                Ok(true) => {
                    self.promote(ctx, pending.clone(), factor.id, OutcomeCode::VerifiedTotpLogin);
                    return true;
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%error, factor = factor.id, "unusable shared secret");
                }
            }
        }
        ctx.record(ResultRecord::danger(OutcomeCode::TotpVerificationFailed));
        false
    }

    async fn verify_yubi(&self, ctx: &mut SessionContext, pending: &PendingAuth, otp: &str) -> bool {
        if !yubico_otp_shape_ok(otp) {
            ctx.record(
                ResultRecord::danger(OutcomeCode::YotpVerificationFailed)
                    .with_arg("token length error"),
            );
            return false;
        }
        let prefix = yubico_modhex_prefix(otp);

        let factors = match self
            .tfa
            .list_factors(&pending.username, Some(TfaMechanism::YubiOtp))
            .await
        {
            Ok(factors) => factors,
            Err(error) => {
                tracing::error!(%error, "factor listing failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        };

        // The device prefix picks the stored factor; an OTP from an
        // unregistered device never reaches the validation service.
        let matched = factors.iter().filter(|f| f.active).find_map(|f| match &f.material {
            TfaMaterial::YubiOtp {
                client_id,
                api_key,
                modhex_prefix,
            } if modhex_prefix == prefix => Some((f.id, client_id.clone(), api_key.clone())),
            _ => None,
        });
        let Some((factor_id, client_id, api_key)) = matched else {
            ctx.record(
                ResultRecord::danger(OutcomeCode::YotpVerificationFailed)
                    .with_arg("unknown device"),
            );
            return false;
        };

        match self.otp_client.verify(&client_id, &api_key, otp).await {
            Ok(()) => {
                self.promote(ctx, pending.clone(), factor_id, OutcomeCode::VerifiedYotpLogin);
                true
            }
            Err(error) => {
                ctx.record(
                    ResultRecord::danger(OutcomeCode::YotpVerificationFailed)
                        .with_arg(error.to_string()),
                );
                false
            }
        }
    }

    fn promote(
        &self,
        ctx: &mut SessionContext,
        pending: PendingAuth,
        factor_id: i64,
        code: OutcomeCode,
    ) {
        ctx.take_pending();
        ctx.set_verified_factor(factor_id);
        ctx.record(ResultRecord::success(code).with_arg(pending.username.as_str()));
        ctx.set_identity(AuthenticatedIdentity {
            username: pending.username,
            role: pending.role,
        });
    }
}
