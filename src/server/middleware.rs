//! Per-IP rate limiting.

use std::net::{IpAddr, Ipv6Addr};
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use lru::LruCache;
use tokio::sync::Mutex;

use super::types::ServerConfig;

pub type IpRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Maximum number of per-IP rate limiter entries to keep in the LRU cache.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// Get or create a rate limiter for the given IP. Returns `None` when rate
/// limiting is disabled. IPv6 addresses are masked to /64 to prevent
/// per-address evasion.
pub async fn get_rate_limiter(
    config: &ServerConfig,
    rate_limiters: &Mutex<LruCache<IpAddr, Arc<IpRateLimiter>>>,
    ip: IpAddr,
) -> Option<Arc<IpRateLimiter>> {
    let rpm = NonZeroU32::new(config.rate_limit_rpm)?;

    let key = mask_ip(ip);

    let mut limiters = rate_limiters.lock().await;
    if let Some(limiter) = limiters.get(&key) {
        return Some(Arc::clone(limiter));
    }

    let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
    limiters.push(key, Arc::clone(&limiter));

    Some(limiter)
}

pub fn new_rate_limiter_cache() -> Mutex<LruCache<IpAddr, Arc<IpRateLimiter>>> {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(MAX_RATE_LIMITER_ENTRIES).unwrap(),
    ))
}

fn mask_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => ip,
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            IpAddr::V6(Ipv6Addr::new(seg[0], seg[1], seg[2], seg[3], 0, 0, 0, 0))
        }
    }
}
