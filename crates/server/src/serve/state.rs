//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use tokio::sync::Mutex;

use chantier_storage::MemoryStorage;

use super::RATE_LIMIT_WINDOW_SECS;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// In-memory per-IP rate limiter.
pub struct RateLimiter {
    /// Request counts per IP per window.
    tracker: Mutex<IpTracker>,
    /// Maximum requests per window.
    max_requests: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u64) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
        }
    }

    /// Check if a request from the given IP is allowed.
    /// Returns Ok(()) if allowed, Err(retry_after_secs) if rate limited.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;

        // Evict every entry whose window has expired, including idle IPs
        // that will never be checked again; the map stays bounded by the
        // number of IPs active in the current window.
        tracker
            .retain(|_, (_, start)| now.duration_since(*start).as_secs() < RATE_LIMIT_WINDOW_SECS);

        let entry = tracker.entry(ip).or_insert((0, now));
        entry.0 += 1;
        if entry.0 > self.max_requests {
            let elapsed = now.duration_since(entry.1).as_secs();
            Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn requests_over_the_limit_are_rejected_within_the_window() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.check_at(ip(1), now).await.is_ok());
        assert!(limiter.check_at(ip(1), now).await.is_ok());
        let retry_after = limiter.check_at(ip(1), now).await.unwrap_err();
        assert_eq!(retry_after, RATE_LIMIT_WINDOW_SECS);

        // A different IP has its own budget.
        assert!(limiter.check_at(ip(2), now).await.is_ok());
    }

    #[tokio::test]
    async fn expired_windows_are_evicted_even_for_idle_ips() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        limiter.check_at(ip(1), now).await.unwrap();
        limiter.check_at(ip(2), now).await.unwrap();
        assert_eq!(limiter.tracker.lock().await.len(), 2);

        // One window later, a check from a third IP prunes both idle
        // entries, and the previously exhausted IP gets a fresh budget.
        let later = now + Duration::from_secs(RATE_LIMIT_WINDOW_SECS + 1);
        limiter.check_at(ip(3), later).await.unwrap();
        assert_eq!(limiter.tracker.lock().await.len(), 1);
        assert!(limiter.check_at(ip(1), later).await.is_ok());
    }
}

/// Application state shared across request handlers.
pub struct AppState {
    /// The storage backend mutations and queries run against.
    pub storage: MemoryStorage,
    /// Per-IP rate limiter.
    pub rate_limiter: RateLimiter,
    /// Optional API key for authentication. None = no auth required.
    pub api_key: Option<String>,
}
