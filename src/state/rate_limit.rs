use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{config::RateLimitConfig, state::identity::ConnectionId};

/// Actions subject to admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedAction {
    CreateRoom,
    JoinRoom,
    SubmitAnswer,
}

/// Sliding-window counter keyed by connection.
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    buckets: DashMap<ConnectionId, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: DashMap::new(),
        }
    }

    /// Admit and record an attempt happening now.
    pub fn admit(&self, key: ConnectionId) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Admit and record an attempt happening at `now`.
    ///
    /// Attempts older than the window are discarded first; the attempt is denied
    /// when `limit` attempts remain, and denied attempts are not recorded.
    pub fn admit_at(&self, key: ConnectionId, now: Instant) -> bool {
        let mut bucket = self.buckets.entry(key).or_default();
        while bucket
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= self.window)
        {
            bucket.pop_front();
        }

        if bucket.len() >= self.limit {
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Drop the bucket of a connection that went away.
    pub fn forget(&self, key: ConnectionId) {
        self.buckets.remove(&key);
    }
}

/// The three independently configured limiters.
pub struct RateLimiters {
    create_room: SlidingWindowLimiter,
    join_room: SlidingWindowLimiter,
    submit_answer: SlidingWindowLimiter,
}

impl RateLimiters {
    pub fn new(
        create_room: RateLimitConfig,
        join_room: RateLimitConfig,
        submit_answer: RateLimitConfig,
    ) -> Self {
        Self {
            create_room: create_room.into(),
            join_room: join_room.into(),
            submit_answer: submit_answer.into(),
        }
    }

    pub fn admit(&self, action: LimitedAction, connection: ConnectionId) -> bool {
        self.limiter(action).admit(connection)
    }

    pub fn forget(&self, connection: ConnectionId) {
        self.create_room.forget(connection);
        self.join_room.forget(connection);
        self.submit_answer.forget(connection);
    }

    fn limiter(&self, action: LimitedAction) -> &SlidingWindowLimiter {
        match action {
            LimitedAction::CreateRoom => &self.create_room,
            LimitedAction::JoinRoom => &self.join_room,
            LimitedAction::SubmitAnswer => &self.submit_answer,
        }
    }
}

impl From<RateLimitConfig> for SlidingWindowLimiter {
    fn from(value: RateLimitConfig) -> Self {
        SlidingWindowLimiter::new(value.limit, value.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn admits_up_to_limit_within_window() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(10));
        let key = Uuid::new_v4();
        let start = Instant::now();

        for offset in 0..3 {
            assert!(limiter.admit_at(key, start + Duration::from_secs(offset)));
        }
        assert!(!limiter.admit_at(key, start + Duration::from_secs(5)));
    }

    #[test]
    fn admits_again_once_oldest_attempt_leaves_window() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(10));
        let key = Uuid::new_v4();
        let start = Instant::now();

        assert!(limiter.admit_at(key, start));
        assert!(limiter.admit_at(key, start + Duration::from_secs(4)));
        assert!(!limiter.admit_at(key, start + Duration::from_secs(9)));

        assert!(limiter.admit_at(key, start + Duration::from_secs(10)));
        assert!(!limiter.admit_at(key, start + Duration::from_secs(11)));
        assert!(limiter.admit_at(key, start + Duration::from_secs(14)));
    }

    #[test]
    fn buckets_are_independent_per_connection() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(limiter.admit_at(a, start));
        assert!(!limiter.admit_at(a, start));
        assert!(limiter.admit_at(b, start));

        limiter.forget(a);
        assert!(limiter.admit_at(a, start));
    }

    #[test]
    fn actions_are_limited_independently() {
        let one = RateLimitConfig {
            limit: 1,
            window_secs: 60,
        };
        let limiters = RateLimiters::new(one, one, one);
        let connection = Uuid::new_v4();

        assert!(limiters.admit(LimitedAction::CreateRoom, connection));
        assert!(!limiters.admit(LimitedAction::CreateRoom, connection));
        assert!(limiters.admit(LimitedAction::JoinRoom, connection));
        assert!(limiters.admit(LimitedAction::SubmitAnswer, connection));
    }
}
