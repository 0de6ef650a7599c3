//! Sliding-window rate limiting per client key.
//!
//! [`RateLimiter`] keeps the timestamps of recently admitted requests for
//! each client key.  Admission filters the stored window to entries newer
//! than `now - window`, rejects when the filtered count has reached
//! capacity, and otherwise records `now`.  The read-filter-append sequence
//! runs under a single write lock so two concurrent requests can never both
//! observe spare capacity and slip past the limit.
//!
//! Timestamps use [`tokio::time::Instant`], so tests can drive the window
//! deterministically with the paused test clock.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared bucket key for clients whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

// ── RateLimitConfig ────────────────────────────────────────────────────

/// Window length and capacity for the rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Sliding window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Maximum admitted requests per client key within the window.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> usize {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

// ── RateLimiter ────────────────────────────────────────────────────────

/// Concurrency-safe sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: RwLock<HashMap<String, VecDeque<Instant>>>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    /// Create a limiter from the given configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
        }
    }

    /// Create a limiter with the default window (60 s / 10 requests).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(&RateLimitConfig::default())
    }

    /// Admit or reject a request for `client_key`.
    ///
    /// On admission the current timestamp is appended to the client's
    /// window; rejection records nothing.  The boolean result is the
    /// complete signal — no error is raised.
    pub async fn admit(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let timestamps = windows.entry(client_key.to_owned()).or_default();

        evict_expired(timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            warn!(client_key, in_window = timestamps.len(), "rate limit exceeded");
            return false;
        }

        timestamps.push_back(now);
        debug!(client_key, in_window = timestamps.len(), "request admitted");
        true
    }

    /// Drop expired timestamps and reclaim keys whose windows are empty.
    ///
    /// Run periodically so the table stays bounded by the set of recently
    /// active clients.
    pub async fn purge(&self) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, timestamps| {
            evict_expired(timestamps, now, self.window);
            !timestamps.is_empty()
        });
    }

    /// Number of client keys currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Drop timestamps at or beyond the window's trailing edge.  The deque is
/// append-only in time order, so eviction stops at the first live entry.
fn evict_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    let Some(cutoff) = now.checked_sub(window) else {
        return;
    };
    while let Some(front) = timestamps.front() {
        if *front <= cutoff {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

// ── Client key derivation ──────────────────────────────────────────────

/// Derive the rate-limit bucket key for a request.
///
/// Prefers the first entry of a forwarded-for header, then a real-ip
/// header, then the transport-level peer address, and finally the shared
/// [`UNKNOWN_CLIENT`] sentinel — all unidentifiable clients share one
/// bucket, an accepted imprecision.
#[must_use]
pub fn client_key(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer_addr: Option<&str>,
) -> String {
    if let Some(forwarded) = forwarded_for {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    if let Some(ip) = real_ip {
        let ip = ip.trim();
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }
    if let Some(peer) = peer_addr {
        let peer = peer.trim();
        if !peer.is_empty() {
            return peer.to_owned();
        }
    }
    UNKNOWN_CLIENT.to_owned()
}

// ── Tests ──────────────────────────────────────────────────────────────
