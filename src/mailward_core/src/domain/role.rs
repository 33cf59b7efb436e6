use std::fmt;

/// Privilege role attached to an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    DomainAdmin,
    User,
}

impl Role {
    /// The wire/log spelling, matching the stored role strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "admin",
            Role::DomainAdmin => "domainadmin",
            Role::User => "user",
        }
    }

    /// Roles allowed to manage their own second factors.
    pub fn may_manage_tfa(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::DomainAdmin)
    }

    /// The account tier holding this role's own credential rows.
    pub fn tier(&self) -> AccountTier {
        match self {
            Role::SuperAdmin => AccountTier::SuperAdmin,
            Role::DomainAdmin => AccountTier::DomainAdmin,
            Role::User => AccountTier::Mailbox,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three privilege-ordered account collections consulted during
/// login. The same username may exist independently in more than one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountTier {
    SuperAdmin,
    DomainAdmin,
    Mailbox,
}

impl AccountTier {
    /// The role granted when credentials verify against this tier.
    pub fn role(&self) -> Role {
        match self {
            AccountTier::SuperAdmin => Role::SuperAdmin,
            AccountTier::DomainAdmin => Role::DomainAdmin,
            AccountTier::Mailbox => Role::User,
        }
    }
}

/// Fixed lookup order for login: the first tier with a verifying row wins
/// and lower tiers are never consulted.
pub const LOGIN_TIER_ORDER: [AccountTier; 3] = [
    AccountTier::SuperAdmin,
    AccountTier::DomainAdmin,
    AccountTier::Mailbox,
];
