use crate::error::ProxyError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed one-minute window per key, used for the search route.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn per_minute(per_minute: u32) -> Self {
        Self {
            per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one hit against `key`.
    pub fn check(&self, key: &str) -> Result<(), ProxyError> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), ProxyError> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop expired windows so idle keys do not pile up.
        windows.retain(|_, w| now.duration_since(w.started) < WINDOW);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if window.count >= self.per_minute {
            let elapsed = now.duration_since(window.started);
            let retry_after_secs = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return Err(ProxyError::RateLimited { retry_after_secs });
        }
        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_resets() {
        let rl = RateLimiter::per_minute(3);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(rl.check_at("alice", t0).is_ok());
        }
        let err = rl.check_at("alice", t0 + Duration::from_secs(20)).unwrap_err();
        assert_eq!(err, ProxyError::RateLimited { retry_after_secs: 40 });
        assert!(rl.check_at("alice", t0 + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let rl = RateLimiter::per_minute(1);
        let t0 = Instant::now();
        assert!(rl.check_at("alice", t0).is_ok());
        assert!(rl.check_at("alice", t0).is_err());
        assert!(rl.check_at("proxy-user", t0).is_ok());
        assert!(rl.check_at("proxy-user", t0).is_err());
    }

    #[test]
    fn zero_budget_always_limited() {
        let rl = RateLimiter::per_minute(0);
        assert!(matches!(rl.check("bob"), Err(ProxyError::RateLimited { .. })));
    }
}
