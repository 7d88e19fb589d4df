//! Fixed-window request throttle for guarded endpoints.
//!
//! Counters live in a process-local `DashMap` keyed by
//! (endpoint, client identity). Holding the map's entry guard across the
//! reset-then-increment sequence makes each key's window update atomic
//! while leaving distinct keys free of contention.
//!
//! The windowing strategy is deliberately a fixed window, not token
//! bucket / leaky bucket: a client straddling a window boundary can land up
//! to twice the budget in a short span. Callers wanting stricter guarantees
//! should swap the algorithm, not patch around this one.

use crate::config::{RateLimitConfig, WindowConfig};
use crate::error::AuthError;
use axum::http::HeaderMap;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

const SWEEP_INTERVAL_SECS: i64 = 60;
/// Entries idle for this many windows are dropped by the lazy sweep.
const SWEEP_RETENTION_WINDOWS: i64 = 2;

/// The endpoints subject to throttling, each with its own window config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuardedEndpoint {
    Login,
    ForgotPassword,
}

impl GuardedEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardedEndpoint::Login => "login",
            GuardedEndpoint::ForgotPassword => "forgot_password",
        }
    }
}

/// Per-(endpoint, client) window state: start second + request count.
#[derive(Debug, Clone, Copy)]
struct Window {
    window_start_sec: i64,
    count: u32,
}

#[derive(Clone)]
pub struct ThrottleGuard {
    windows: Arc<DashMap<(GuardedEndpoint, String), Window>>,
    login: WindowConfig,
    forgot_password: WindowConfig,
    last_sweep: Arc<Mutex<i64>>,
}

impl ThrottleGuard {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            login: cfg.login,
            forgot_password: cfg.forgot_password,
            last_sweep: Arc::new(Mutex::new(0)),
        }
    }

    fn config_for(&self, endpoint: GuardedEndpoint) -> WindowConfig {
        match endpoint {
            GuardedEndpoint::Login => self.login,
            GuardedEndpoint::ForgotPassword => self.forgot_password,
        }
    }

    /// Count one request against the client's window, rejecting on overflow.
    pub fn check(&self, endpoint: GuardedEndpoint, client: &str) -> Result<(), AuthError> {
        self.check_at(endpoint, client, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// `check` with an explicit clock, the unit under test.
    pub fn check_at(
        &self,
        endpoint: GuardedEndpoint,
        client: &str,
        now_sec: i64,
    ) -> Result<(), AuthError> {
        let cfg = self.config_for(endpoint);
        self.maybe_sweep(now_sec);

        let mut window = self
            .windows
            .entry((endpoint, client.to_string()))
            .or_insert(Window {
                window_start_sec: now_sec,
                count: 0,
            });

        // The entry guard is held through reset + increment, so the
        // sequence cannot interleave with a concurrent check on this key.
        if now_sec - window.window_start_sec >= cfg.window_seconds as i64 {
            window.window_start_sec = now_sec;
            window.count = 0;
        }
        window.count += 1;

        if window.count > cfg.max_requests {
            let retry_after_secs =
                (cfg.window_seconds as i64 - (now_sec - window.window_start_sec)).max(1);
            let elapsed = now_sec - window.window_start_sec;
            drop(window);
            tracing::warn!(
                name = "throttle.rejected",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                endpoint = endpoint.as_str(),
                client = %client,
                elapsed_secs = elapsed,
                retry_after_secs,
                message = "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited { retry_after_secs });
        }
        Ok(())
    }

    /// Drop windows idle past their retention if enough time has passed.
    ///
    /// Bounds the otherwise unbounded per-client map without a background
    /// task; runs at most once per sweep interval and skips entirely when
    /// another request holds the sweep slot.
    fn maybe_sweep(&self, now_sec: i64) {
        if let Ok(mut last_sweep) = self.last_sweep.try_lock() {
            if now_sec - *last_sweep < SWEEP_INTERVAL_SECS {
                return;
            }
            *last_sweep = now_sec;
            drop(last_sweep);

            self.windows.retain(|(endpoint, _), window| {
                let window_secs = self.config_for(*endpoint).window_seconds as i64;
                now_sec - window.window_start_sec < window_secs * SWEEP_RETENTION_WINDOWS
            });
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Resolve the client identity for throttling and auditing.
///
/// Order: first entry of X-Forwarded-For, else X-Real-IP, else the
/// transport peer address. First non-empty value wins. Trusting the headers
/// assumes a trusted reverse proxy in front.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return Some(real_ip.to_string());
        }
    }
    peer.map(|addr| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    fn guard(max_requests: u32, window_seconds: u32) -> ThrottleGuard {
        let cfg = RateLimitConfig {
            login: WindowConfig {
                max_requests,
                window_seconds,
            },
            forgot_password: WindowConfig {
                max_requests,
                window_seconds,
            },
        };
        ThrottleGuard::new(&cfg)
    }

    #[test]
    fn test_allows_up_to_limit_then_rejects() {
        let guard = guard(5, 60);
        let now = 1_000_000;
        for _ in 0..5 {
            assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok());
        }
        let err = guard
            .check_at(GuardedEndpoint::Login, "1.2.3.4", now)
            .unwrap_err();
        match err {
            AuthError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_window_reset_restores_budget() {
        let guard = guard(5, 60);
        let now = 1_000_000;
        for _ in 0..5 {
            assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok());
        }
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_err());

        // Advancing past the window boundary resets the counter to 1.
        let later = now + 60;
        assert!(
            guard
                .check_at(GuardedEndpoint::Login, "1.2.3.4", later)
                .is_ok()
        );
        for _ in 0..4 {
            assert!(
                guard
                    .check_at(GuardedEndpoint::Login, "1.2.3.4", later)
                    .is_ok()
            );
        }
        assert!(
            guard
                .check_at(GuardedEndpoint::Login, "1.2.3.4", later)
                .is_err()
        );
    }

    #[test]
    fn test_retry_after_shrinks_as_window_ages() {
        let guard = guard(1, 60);
        let now = 1_000_000;
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok());

        let err = guard
            .check_at(GuardedEndpoint::Login, "1.2.3.4", now + 45)
            .unwrap_err();
        match err {
            AuthError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 15),
            other => panic!("unexpected error: {other:?}"),
        }

        // Never below 1, even at the last second of the window.
        let err = guard
            .check_at(GuardedEndpoint::Login, "1.2.3.4", now + 59)
            .unwrap_err();
        match err {
            AuthError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_keys_do_not_share_budgets() {
        let guard = guard(1, 60);
        let now = 1_000_000;
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok());
        assert!(guard.check_at(GuardedEndpoint::Login, "5.6.7.8", now).is_ok());
        // Same client, other endpoint: separate window.
        assert!(
            guard
                .check_at(GuardedEndpoint::ForgotPassword, "1.2.3.4", now)
                .is_ok()
        );
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_err());
    }

    #[test]
    fn test_boundary_burst_is_accepted() {
        // Fixed-window property: most of one budget spent at the end of a
        // window plus a full budget right after the reset all passes. This
        // imprecision is part of the contract, not a bug.
        let guard = guard(3, 60);
        let now = 1_000_000;
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok());
        for _ in 0..2 {
            assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now + 59).is_ok());
        }
        // The window opened at `now`, so one second later it resets.
        for _ in 0..3 {
            assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now + 60).is_ok());
        }
        assert!(guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now + 61).is_err());
    }

    #[test]
    fn test_concurrent_checks_respect_the_budget() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let guard = Arc::new(guard(5, 60));
        let allowed = Arc::new(AtomicU32::new(0));
        let now = 1_000_000;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                let allowed = allowed.clone();
                std::thread::spawn(move || {
                    if guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).is_ok() {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(allowed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_sweep_drops_idle_windows() {
        let guard = guard(5, 60);
        let now = 1_000_000;
        guard.check_at(GuardedEndpoint::Login, "1.2.3.4", now).unwrap();
        guard.check_at(GuardedEndpoint::Login, "5.6.7.8", now).unwrap();
        assert_eq!(guard.len(), 2);

        // Well past retention; the sweep runs on the next check.
        let later = now + 60 * 10;
        guard.check_at(GuardedEndpoint::Login, "9.9.9.9", later).unwrap();
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_client_ip_resolution_order() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("1.2.3.4"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("5.6.7.8"));

        // Empty forwarded-for falls through to the next source
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.1"));

        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), None);
    }
}
