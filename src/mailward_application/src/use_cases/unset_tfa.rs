use mailward_core::{
    OutcomeCode, ResultRecord, SessionContext, TfaFactorFilter, TfaStore,
};

/// Removes one of the caller's own factors by id. The last remaining
/// active factor can not be removed; TFA is disabled through enrollment
/// with the `none` mechanism instead.
pub struct UnsetTfaUseCase<T>
where
    T: TfaStore,
{
    tfa: T,
}

impl<T> UnsetTfaUseCase<T>
where
    T: TfaStore,
{
    pub fn new(tfa: T) -> Self {
        Self { tfa }
    }

    #[tracing::instrument(name = "UnsetTfaUseCase::execute", skip(self, ctx))]
    pub async fn execute(&self, ctx: &mut SessionContext, factor_id: i64) -> bool {
        let Some(identity) = ctx.identity().cloned() else {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        };
        if !identity.role.may_manage_tfa() || factor_id <= 0 {
            ctx.record(ResultRecord::danger(OutcomeCode::AccessDenied));
            return false;
        }

        let active = match self.tfa.count_active(&identity.username).await {
            Ok(count) => count,
            Err(error) => {
                tracing::error!(%error, "factor count failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                return false;
            }
        };
        if active == 1 {
            ctx.record(ResultRecord::danger(OutcomeCode::LastKey));
            return false;
        }

        match self
            .tfa
            .delete_factors(&identity.username, TfaFactorFilter::ById(factor_id))
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
                tracing::error!(%error, "factor removal failed");
                ctx.record(
                    ResultRecord::danger(OutcomeCode::StorageError).with_arg(error.to_string()),
                );
                false
            }
        }
    }
}
