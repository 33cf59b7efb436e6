use std::time::Duration;

/// Per-session anti-brute-force state. Absent until the first failed
/// login; the first failure sets the delay to zero and each further
/// failure adds half a second, unless an authenticated identity is already
/// attached to the session (the dual-login case, which must not be
/// penalized for a second identity's typo).
///
/// The caller is expected to sleep for the returned delay before handing
/// the failure back to the client. Any successful primary-credential
/// verification clears the state unconditionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginThrottle {
    delay_secs: Option<f64>,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the failure transition and returns the delay to serve.
    pub fn register_failure(&mut self, identity_attached: bool) -> Duration {
        match self.delay_secs {
            None => self.delay_secs = Some(0.0),
            Some(current) if !identity_attached => self.delay_secs = Some(current + 0.5),
            Some(_) => {}
        }
        Duration::from_secs_f64(self.delay_secs.unwrap_or(0.0))
    }

    /// Reset to absent, as on any successful credential verification.
    pub fn clear(&mut self) {
        self.delay_secs = None;
    }

    pub fn current_delay(&self) -> Option<Duration> {
        self.delay_secs.map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_in_half_second_steps() {
        let mut throttle = LoginThrottle::new();
        let delays: Vec<f64> = (0..5)
            .map(|_| throttle.register_failure(false).as_secs_f64())
            .collect();
        assert_eq!(delays, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn success_resets_the_sequence() {
        let mut throttle = LoginThrottle::new();
        throttle.register_failure(false);
        throttle.register_failure(false);
        throttle.clear();
        assert_eq!(throttle.current_delay(), None);
        assert_eq!(throttle.register_failure(false), Duration::ZERO);
    }

    #[test]
    fn attached_identity_freezes_the_delay() {
        let mut throttle = LoginThrottle::new();
        throttle.register_failure(false);
        throttle.register_failure(false);
        let frozen = throttle.register_failure(true);
        assert_eq!(frozen, Duration::from_millis(500));
        assert_eq!(throttle.register_failure(true), Duration::from_millis(500));
    }

    #[test]
    fn first_failure_with_identity_still_initializes() {
        let mut throttle = LoginThrottle::new();
        assert_eq!(throttle.register_failure(true), Duration::ZERO);
        assert_eq!(throttle.current_delay(), Some(Duration::ZERO));
    }
}
