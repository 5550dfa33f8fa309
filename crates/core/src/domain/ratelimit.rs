use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::domain::user::UserId;

/// Sliding-window message rate guard. Each admitted message is stamped; a
/// message is rejected when the window already holds `limit` stamps. Rejected
/// attempts are not stamped, so a flooding user regains access as soon as the
/// oldest stamp ages out, not `window` after their last attempt.
#[derive(Debug)]
pub struct SpamGuard {
    limit: usize,
    window: Duration,
    stamps: HashMap<UserId, VecDeque<DateTime<Utc>>>,
}

impl SpamGuard {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit: limit as usize,
            window: Duration::seconds(window_secs as i64),
            stamps: HashMap::new(),
        }
    }

    /// Admits or rejects a message arriving at `now`.
    pub fn admit_at(&mut self, user: UserId, now: DateTime<Utc>) -> bool {
        let stamps = self.stamps.entry(user).or_default();

        // A stamp aged exactly `window` is already outside it.
        while let Some(oldest) = stamps.front() {
            if now - *oldest >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.limit {
            return false;
        }

        stamps.push_back(now);
        true
    }

    /// Stamps currently inside the window for `user`, as of the last call.
    pub fn recent_count(&self, user: UserId) -> usize {
        self.stamps.get(&user).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::domain::user::UserId;

    use super::SpamGuard;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let mut guard = SpamGuard::new(5, 60);
        let user = UserId(1);

        for n in 0..5 {
            assert!(guard.admit_at(user, start() + Duration::seconds(n)));
        }
        assert!(!guard.admit_at(user, start() + Duration::seconds(5)));
    }

    #[test]
    fn rejected_attempts_do_not_extend_the_block() {
        let mut guard = SpamGuard::new(2, 60);
        let user = UserId(1);

        assert!(guard.admit_at(user, start()));
        assert!(guard.admit_at(user, start() + Duration::seconds(1)));

        // Hammering while blocked leaves no stamps behind.
        for n in 2..50 {
            assert!(!guard.admit_at(user, start() + Duration::seconds(n)));
        }

        // The first stamp ages out exactly 60s after it landed.
        assert!(guard.admit_at(user, start() + Duration::seconds(60)));
    }

    #[test]
    fn stamp_aged_exactly_one_window_is_outside_it() {
        let mut guard = SpamGuard::new(1, 60);
        let user = UserId(1);

        assert!(guard.admit_at(user, start()));
        assert!(!guard.admit_at(user, start() + Duration::seconds(59)));
        assert!(guard.admit_at(user, start() + Duration::seconds(60)));
    }

    #[test]
    fn users_are_tracked_independently() {
        let mut guard = SpamGuard::new(1, 60);

        assert!(guard.admit_at(UserId(1), start()));
        assert!(guard.admit_at(UserId(2), start()));
        assert!(!guard.admit_at(UserId(1), start() + Duration::seconds(1)));
        assert_eq!(guard.recent_count(UserId(2)), 1);
    }
}
