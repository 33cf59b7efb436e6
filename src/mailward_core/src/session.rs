//! Request-scoped session context. Created per request, discarded on
//! response; everything a login or access-check operation needs to read
//! or mutate about the caller's session lives here, never in globals.

use crate::domain::outcome::ResultRecord;
use crate::domain::role::Role;
use crate::domain::tfa::TfaMechanism;
use crate::domain::throttle::LoginThrottle;
use crate::domain::u2f::{U2fRegisterRequest, U2fSignRequest};
use crate::domain::username::Username;

/// A fully authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub username: Username,
    pub role: Role,
}

/// Primary credentials verified, second factor outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuth {
    pub username: Username,
    pub role: Role,
    pub mechanism: TfaMechanism,
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    remote_addr: String,
    identity: Option<AuthenticatedIdentity>,
    pending: Option<PendingAuth>,
    throttle: LoginThrottle,
    u2f_register: Option<U2fRegisterRequest>,
    u2f_sign: Option<U2fSignRequest>,
    verified_factor: Option<i64>,
    records: Vec<ResultRecord>,
}

impl SessionContext {
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            ..Self::default()
        }
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn record(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn take_records(&mut self) -> Vec<ResultRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.identity.as_ref()
    }

    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    pub fn set_identity(&mut self, identity: AuthenticatedIdentity) {
        self.identity = Some(identity);
    }

    pub fn pending(&self) -> Option<&PendingAuth> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, pending: PendingAuth) {
        self.pending = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingAuth> {
        self.pending.take()
    }

    pub fn throttle(&mut self) -> &mut LoginThrottle {
        &mut self.throttle
    }

    pub fn throttle_delay(&self) -> Option<std::time::Duration> {
        self.throttle.current_delay()
    }

    /// Issues a registration challenge, replacing any previous one.
    pub fn issue_u2f_register(&mut self, app_id: &str) -> U2fRegisterRequest {
        let request = U2fRegisterRequest::new(app_id);
        self.u2f_register = Some(request.clone());
        request
    }

    /// Consumes the outstanding registration challenge, if any.
    pub fn take_u2f_register(&mut self) -> Option<U2fRegisterRequest> {
        self.u2f_register.take()
    }

    /// Issues an authentication challenge, replacing any previous one.
    pub fn issue_u2f_sign(&mut self, app_id: &str, key_handles: Vec<String>) -> U2fSignRequest {
        let request = U2fSignRequest::new(app_id, key_handles);
        self.u2f_sign = Some(request.clone());
        request
    }

    /// Consumes the outstanding authentication challenge, if any.
    pub fn take_u2f_sign(&mut self) -> Option<U2fSignRequest> {
        self.u2f_sign.take()
    }

    pub fn set_verified_factor(&mut self, id: i64) {
        self.verified_factor = Some(id);
    }

    /// The factor id that satisfied the last TFA verification.
    pub fn verified_factor(&self) -> Option<i64> {
        self.verified_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u2f_challenges_are_single_use() {
        let mut ctx = SessionContext::new("192.0.2.1");
        let issued = ctx.issue_u2f_register("https://mail.example.com");
        let taken = ctx.take_u2f_register().unwrap();
        assert_eq!(issued, taken);
        assert!(ctx.take_u2f_register().is_none());
    }

    #[test]
    fn reissuing_replaces_the_outstanding_challenge() {
        let mut ctx = SessionContext::new("192.0.2.1");
        let first = ctx.issue_u2f_sign("https://mail.example.com", vec![]);
        let second = ctx.issue_u2f_sign("https://mail.example.com", vec![]);
        assert_ne!(first.challenge, second.challenge);
        assert_eq!(ctx.take_u2f_sign().unwrap(), second);
    }
}
