//! Per-account rate limiting
//!
//! Each account gets one token bucket per gateway surface. A bucket starts
//! at its burst size and refills continuously at the endpoint's sustained
//! rate; limits live in `Settings`, not at the call sites, so operators
//! tune them in one place.

use crate::error::AppError;
use dashmap::DashMap;
use serde::Deserialize;
use std::time::Instant;
use types::errors::OrderError;
use types::ids::AccountId;

/// Gateway surfaces that are individually rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    PlaceOrder,
    CancelOrder,
    Wallet,
    WsConnect,
}

/// Burst headroom and sustained per-second rate for one endpoint.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimit {
    pub burst: u32,
    pub per_second: f64,
}

/// Limits for every rate-limited surface.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub place_order: RateLimit,
    pub cancel_order: RateLimit,
    pub wallet: RateLimit,
    pub ws_connect: RateLimit,
}

impl RateLimitSettings {
    fn limit_for(&self, endpoint: Endpoint) -> RateLimit {
        match endpoint {
            Endpoint::PlaceOrder => self.place_order,
            Endpoint::CancelOrder => self.cancel_order,
            Endpoint::Wallet => self.wallet,
            Endpoint::WsConnect => self.ws_connect,
        }
    }
}

/// A bucket only tracks its fill state; capacity and refill rate come from
/// the endpoint's configured limit on every check.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token buckets keyed by (account, endpoint).
pub struct RateLimiter {
    buckets: DashMap<(AccountId, Endpoint), Bucket>,
    limits: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(limits: RateLimitSettings) -> Self {
        Self {
            buckets: DashMap::new(),
            limits,
        }
    }

    /// Take one token from the account's bucket for this endpoint.
    pub fn check(&self, account: AccountId, endpoint: Endpoint) -> Result<(), AppError> {
        let limit = self.limits.limit_for(endpoint);
        let mut bucket = self
            .buckets
            .entry((account, endpoint))
            .or_insert_with(|| Bucket {
                tokens: limit.burst as f64,
                last_refill: Instant::now(),
            });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = f64::min(
            limit.burst as f64,
            bucket.tokens + elapsed * limit.per_second,
        );
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(AppError::Order(OrderError::RateLimited))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_refill_limits(burst: u32) -> RateLimitSettings {
        let limit = RateLimit {
            burst,
            per_second: 0.0,
        };
        RateLimitSettings {
            place_order: limit,
            cancel_order: limit,
            wallet: limit,
            ws_connect: limit,
        }
    }

    #[test]
    fn test_burst_exhausts_then_limits() {
        let limiter = RateLimiter::new(no_refill_limits(3));
        let account = AccountId::new();

        for _ in 0..3 {
            limiter.check(account, Endpoint::PlaceOrder).unwrap();
        }
        assert!(limiter.check(account, Endpoint::PlaceOrder).is_err());
    }

    #[test]
    fn test_endpoints_have_independent_buckets() {
        let limiter = RateLimiter::new(no_refill_limits(1));
        let account = AccountId::new();

        limiter.check(account, Endpoint::PlaceOrder).unwrap();
        assert!(limiter.check(account, Endpoint::PlaceOrder).is_err());

        // A different surface for the same account is untouched
        limiter.check(account, Endpoint::CancelOrder).unwrap();
    }

    #[test]
    fn test_accounts_have_independent_buckets() {
        let limiter = RateLimiter::new(no_refill_limits(1));
        let a = AccountId::new();
        let b = AccountId::new();

        limiter.check(a, Endpoint::Wallet).unwrap();
        assert!(limiter.check(a, Endpoint::Wallet).is_err());
        limiter.check(b, Endpoint::Wallet).unwrap();
    }
}
