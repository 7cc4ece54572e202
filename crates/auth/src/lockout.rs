//! Failed-login lockout state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Threshold and window for locking an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Active,
    Locked { until: DateTime<Utc> },
}

/// Per-user counters persisted alongside the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCounters {
    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginCounters {
    /// Locked while `locked_until` is strictly in the future.
    pub fn state_at(&self, now: DateTime<Utc>) -> LockState {
        match self.locked_until {
            Some(until) if until > now => LockState::Locked { until },
            _ => LockState::Active,
        }
    }

    /// Record a failed password check at `now`.
    ///
    /// An elapsed lock is cleared (and the counter zeroed) before counting
    /// this failure. Reaching `max_attempts` locks until `now + lock_duration`.
    pub fn register_failure(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> LockState {
        if self.locked_until.is_some_and(|until| until <= now) {
            self.login_attempts = 0;
            self.locked_until = None;
        }

        self.login_attempts = self.login_attempts.saturating_add(1);
        if self.login_attempts >= policy.max_attempts {
            self.locked_until = Some(now + policy.lock_duration);
        }

        self.state_at(now)
    }

    pub fn register_success(&mut self) {
        self.login_attempts = 0;
        self.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn fifth_failure_locks_for_fifteen_minutes() {
        let policy = LockoutPolicy::default();
        let mut c = LoginCounters::default();
        for i in 0..4 {
            let now = t0() + Duration::seconds(i);
            assert_eq!(c.register_failure(&policy, now), LockState::Active);
        }
        let fifth = t0() + Duration::seconds(4);
        let until = fifth + Duration::minutes(15);
        assert_eq!(c.register_failure(&policy, fifth), LockState::Locked { until });
        assert_eq!(c.login_attempts, 5);
        assert_eq!(c.state_at(until - Duration::seconds(1)), LockState::Locked { until });
        assert_eq!(c.state_at(until), LockState::Active);
    }

    #[test]
    fn elapsed_lock_restarts_the_count() {
        let policy = LockoutPolicy::default();
        let mut c = LoginCounters {
            login_attempts: 5,
            locked_until: Some(t0()),
        };
        let after = t0() + Duration::seconds(1);
        assert_eq!(c.register_failure(&policy, after), LockState::Active);
        assert_eq!(c.login_attempts, 1);
        assert_eq!(c.locked_until, None);
    }

    #[test]
    fn success_clears_everything() {
        let mut c = LoginCounters {
            login_attempts: 3,
            locked_until: None,
        };
        c.register_success();
        assert_eq!(c, LoginCounters::default());
    }
}
