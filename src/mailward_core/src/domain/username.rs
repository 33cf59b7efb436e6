use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Loose email shape check, equivalent in spirit to a `user@host.tld`
/// filter. Full RFC 5321 validation is out of scope; the directory is the
/// source of truth for what actually exists.
static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!("static regex"))
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("malformed username")]
    Malformed,
}

/// A login name accepted by the panel: either an email address (mailbox
/// users, most domain admins) or a plain handle made of alphanumerics and
/// `_ . -` (the bootstrap superadmin). Always stored lower-cased and
/// trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, UsernameError> {
        let normalized = raw.trim().to_lowercase();
        if is_acceptable_username(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(UsernameError::Malformed)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_email_shaped(&self) -> bool {
        EMAIL_SHAPE.is_match(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_acceptable_username(candidate: &str) -> bool {
    if EMAIL_SHAPE.is_match(candidate) {
        return true;
    }
    // Handle form: alphanumeric once `_ . -` are stripped, and not empty
    // after stripping.
    let stripped: String = candidate
        .chars()
        .filter(|c| !matches!(c, '_' | '.' | '-'))
        .collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_alphanumeric())
}

static DOMAIN_LABELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([a-z\d](-*[a-z\d])*)(\.([a-z\d](-*[a-z\d])*))*$")
        .unwrap_or_else(|_| unreachable!("static regex"))
});

/// Syntactic domain name check used before any ownership lookup: label
/// characters, overall length of at most 253 and labels of at most 63
/// octets.
pub fn is_valid_domain_name(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    if !DOMAIN_LABELS.is_match(domain) {
        return false;
    }
    domain.split('.').all(|label| (1..=63).contains(&label.len()))
}
