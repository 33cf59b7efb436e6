use mailward_core::{TfaDescription, TfaStore, TfaStoreError, Username};

/// Read model for the factor overview panel.
pub struct DescribeTfaUseCase<T>
where
    T: TfaStore,
{
    tfa: T,
}

impl<T> DescribeTfaUseCase<T>
where
    T: TfaStore,
{
    pub fn new(tfa: T) -> Self {
        Self { tfa }
    }

    #[tracing::instrument(name = "DescribeTfaUseCase::execute", skip(self))]
    pub async fn execute(&self, username: &Username) -> Result<TfaDescription, TfaStoreError> {
        let mechanism = self.tfa.active_mechanism(username).await?;
        let factors = self.tfa.list_factors(username, None).await?;
        Ok(TfaDescription::build(mechanism, &factors))
    }
}
