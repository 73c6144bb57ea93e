//! Per-client sliding-window rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::schema::RateLimitConfig;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

/// In-memory sliding-window rate limiter keyed by client identifier.
///
/// Counts only requests within the trailing window ending at "now", as
/// opposed to fixed periodically-reset buckets. Best-effort, single-process
/// protection: nothing persists across restarts.
///
/// Clients with no usable identifier must be keyed with the empty string;
/// they all share one bucket rather than bypassing the limit.
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    /// Request timestamps per client, newest last.
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests as usize,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether to admit a request from `client_id`.
    ///
    /// Prune, check, and append happen under one lock so concurrent calls
    /// for the same client cannot double-admit past the limit.
    pub fn admit(&self, client_id: &str) -> Admission {
        self.admit_at(client_id, Instant::now())
    }

    fn admit_at(&self, client_id: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock().expect("rate limiter mutex poisoned");
        let stamps = clients.entry(client_id.to_string()).or_default();
        if let Some(cutoff) = now.checked_sub(self.window) {
            stamps.retain(|&stamp| stamp > cutoff);
        }
        if stamps.len() >= self.max_requests {
            return Admission::Rejected;
        }
        stamps.push(now);
        Admission::Admitted
    }

    /// Drop records of clients with no activity inside the window, so the
    /// map stays bounded by clients seen recently rather than ever.
    pub fn evict_idle(&self) {
        self.evict_idle_at(Instant::now());
    }

    fn evict_idle_at(&self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        let mut clients = self.clients.lock().expect("rate limiter mutex poisoned");
        clients.retain(|_, stamps| stamps.last().is_some_and(|&stamp| stamp > cutoff));
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = limiter(3, 3600);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.admit_at("1.2.3.4", now), Admission::Admitted);
        }
        assert_eq!(limiter.admit_at("1.2.3.4", now), Admission::Rejected);
    }

    #[test]
    fn window_slides_rather_than_resets() {
        let limiter = limiter(2, 10);
        let start = Instant::now();
        assert_eq!(limiter.admit_at("c", start), Admission::Admitted);
        assert_eq!(
            limiter.admit_at("c", start + Duration::from_secs(5)),
            Admission::Admitted
        );
        assert_eq!(
            limiter.admit_at("c", start + Duration::from_secs(6)),
            Admission::Rejected
        );
        // The first timestamp has aged out; the one from t+5 still counts.
        assert_eq!(
            limiter.admit_at("c", start + Duration::from_secs(11)),
            Admission::Admitted
        );
        assert_eq!(
            limiter.admit_at("c", start + Duration::from_secs(12)),
            Admission::Rejected
        );
    }

    #[test]
    fn rejection_appends_no_timestamp() {
        let limiter = limiter(1, 10);
        let start = Instant::now();
        assert_eq!(limiter.admit_at("c", start), Admission::Admitted);
        // Rejected attempts must not extend the client's penalty.
        for s in 1..=5 {
            assert_eq!(
                limiter.admit_at("c", start + Duration::from_secs(s)),
                Admission::Rejected
            );
        }
        assert_eq!(
            limiter.admit_at("c", start + Duration::from_secs(11)),
            Admission::Admitted
        );
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = limiter(1, 3600);
        let now = Instant::now();
        assert_eq!(limiter.admit_at("a", now), Admission::Admitted);
        assert_eq!(limiter.admit_at("b", now), Admission::Admitted);
        assert_eq!(limiter.admit_at("a", now), Admission::Rejected);
        assert_eq!(limiter.admit_at("b", now), Admission::Rejected);
    }

    #[test]
    fn empty_client_id_shares_one_bucket() {
        let limiter = limiter(2, 3600);
        let now = Instant::now();
        assert_eq!(limiter.admit_at("", now), Admission::Admitted);
        assert_eq!(limiter.admit_at("", now), Admission::Admitted);
        assert_eq!(limiter.admit_at("", now), Admission::Rejected);
    }

    #[test]
    fn evicts_idle_clients() {
        let limiter = limiter(5, 10);
        let start = Instant::now();
        limiter.admit_at("a", start);
        limiter.admit_at("b", start + Duration::from_secs(8));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.evict_idle_at(start + Duration::from_secs(15));
        assert_eq!(limiter.tracked_clients(), 1);

        limiter.evict_idle_at(start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
