use mailward_core::{
    DirectoryStore, OutcomeCode, ResultRecord, Role, SessionContext, Username,
    is_valid_domain_name,
};

/// Post-authentication ownership checks for domains, mailboxes and
/// aliases. Read-only; any directory failure degrades to a denial.
pub struct AccessControlUseCase<D>
where
    D: DirectoryStore,
{
    directory: D,
}

impl<D> AccessControlUseCase<D>
where
    D: DirectoryStore,
{
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Whether the principal may administer the domain.
    ///
    /// Superadmins own every known domain name, primary or alias, by the
    /// literal name. Domain admins need an active grant on the name
    /// itself or on an alias domain targeting it. Mailbox users never
    /// hold domain access.
    #[tracing::instrument(name = "AccessControlUseCase::has_domain_access", skip(self, ctx))]
    pub async fn has_domain_access(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        role: Role,
        domain: &str,
    ) -> bool {
        let Ok(username) = Username::parse(username) else {
            ctx.record(ResultRecord::danger(OutcomeCode::MalformedUsername));
            return false;
        };
        let domain = domain.trim().to_lowercase();
        if !is_valid_domain_name(&domain) {
            return false;
        }

        match role {
            Role::SuperAdmin => self.domain_is_known(&domain).await,
            Role::DomainAdmin => self.granted(&username, &domain).await,
            Role::User => false,
        }
    }

    /// Whether the principal may touch the mailbox `object`.
    #[tracing::instrument(name = "AccessControlUseCase::has_mailbox_object_access", skip(self, ctx))]
    pub async fn has_mailbox_object_access(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        role: Role,
        object: &str,
    ) -> bool {
        self.object_access(ctx, username, role, object, ObjectKind::Mailbox)
            .await
    }

    /// Whether the principal may touch the alias address `object`.
    #[tracing::instrument(name = "AccessControlUseCase::has_alias_object_access", skip(self, ctx))]
    pub async fn has_alias_object_access(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        role: Role,
        object: &str,
    ) -> bool {
        self.object_access(ctx, username, role, object, ObjectKind::Alias)
            .await
    }

    async fn object_access(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        role: Role,
        object: &str,
        kind: ObjectKind,
    ) -> bool {
        let Ok(username) = Username::parse(username) else {
            ctx.record(ResultRecord::danger(OutcomeCode::MalformedUsername));
            return false;
        };
        let object = object.trim().to_lowercase();

        // Self-access: every role may touch its own address, whether or
        // not a directory row exists for it.
        if username.as_str() == object {
            return true;
        }

        let owner = match kind {
            ObjectKind::Mailbox => self.directory.mailbox_owner_domain(&object).await,
            ObjectKind::Alias => self.directory.alias_owner_domain(&object).await,
        };
        let owner = match owner {
            Ok(Some(domain)) => domain,
            Ok(None) => return false,
            Err(error) => {
                tracing::error!(%error, "owner lookup failed");
                return false;
            }
        };

        match role {
            Role::SuperAdmin => self.domain_is_known(&owner).await,
            Role::DomainAdmin => self.granted(&username, &owner).await,
            Role::User => false,
        }
    }

    async fn domain_is_known(&self, domain: &str) -> bool {
        match self.directory.domain_exists(domain).await {
            Ok(true) => true,
            Ok(false) => match self.directory.alias_domain_target(domain).await {
                Ok(target) => target.is_some(),
                Err(error) => {
                    tracing::error!(%error, "alias domain lookup failed");
                    false
                }
            },
            Err(error) => {
                tracing::error!(%error, "domain lookup failed");
                false
            }
        }
    }

    /// Grant on the name itself, or on any alias domain targeting it.
    async fn granted(&self, username: &Username, domain: &str) -> bool {
        match self.directory.domain_admin_grant_exists(username, domain).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(error) => {
                tracing::error!(%error, "grant lookup failed");
                return false;
            }
        }

        let aliases = match self.directory.alias_domains_with_target(domain).await {
            Ok(aliases) => aliases,
            Err(error) => {
                tracing::error!(%error, "alias domain listing failed");
                return false;
            }
        };
        for alias in aliases {
            match self
                .directory
                .domain_admin_grant_exists(username, &alias)
                .await
            {
                Ok(true) => return true,
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(%error, "grant lookup failed");
                    return false;
                }
            }
        }
        false
    }
}

enum ObjectKind {
    Mailbox,
    Alias,
}
