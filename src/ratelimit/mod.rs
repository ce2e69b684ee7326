//! Per-client rate limiting
//!
//! Runs ahead of authentication so unauthenticated flooding cannot exhaust
//! verification resources or brute-force credentials unthrottled.
//!
//! Each client's counters live behind that client's own lock; concurrent
//! requests from different clients never contend on the same critical
//! section. A global read-write gate is touched only for the rarer structural
//! operations (inserting a brand-new client, the periodic cleanup pass),
//! never on the steady-state increment path, which takes the gate in read
//! mode only.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

/// Per-client counters for the current window
#[derive(Debug)]
struct ClientState {
    /// Start of the current window
    window_start: Instant,

    /// Requests observed since `window_start`
    count: u32,

    /// Last request timestamp, used for eviction
    last_seen: Instant,
}

impl ClientState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request is within budget
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },
    /// Client exceeded the window budget
    Limited,
}

/// Fixed-window per-client rate limiter
///
/// Thread-safe; memory is reclaimed for inactive clients by [`cleanup`].
///
/// [`cleanup`]: RateLimiter::cleanup
pub struct RateLimiter {
    enabled: bool,
    limit: u32,
    window: Duration,
    idle_timeout: Duration,
    clients: RwLock<HashMap<IpAddr, Arc<Mutex<ClientState>>>>,
}

impl RateLimiter {
    /// Create a limiter from validated configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            limit: config.limit,
            window: config.window(),
            idle_timeout: config.idle_timeout(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request from `client` and decide whether it may proceed
    ///
    /// For an un-expired window the stored count never exceeds the limit:
    /// over-budget requests are rejected without incrementing.
    pub fn check(&self, client: IpAddr) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed {
                remaining: self.limit,
            };
        }

        let entry = self.entry(client);
        let mut state = entry.lock().unwrap();
        let now = Instant::now();

        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.count = 0;
        }
        state.last_seen = now;

        if state.count >= self.limit {
            debug!(%client, "Rate limit exceeded");
            RateDecision::Limited
        } else {
            state.count += 1;
            RateDecision::Allowed {
                remaining: self.limit - state.count,
            }
        }
    }

    /// Evict clients idle longer than the staleness threshold
    ///
    /// The map gate is held only to decide eligibility and unlink; a client
    /// whose lock is held by an in-flight request is never considered stale.
    /// The entry and its lock are discarded together, so an evicted client
    /// starts over with a fresh window.
    ///
    /// Returns the number of evicted clients.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.write().unwrap();
        let before = clients.len();

        clients.retain(|_, entry| match entry.try_lock() {
            Ok(state) => now.duration_since(state.last_seen) < self.idle_timeout,
            Err(_) => true,
        });

        before - clients.len()
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Fetch the client's entry, creating it on first sight
    fn entry(&self, client: IpAddr) -> Arc<Mutex<ClientState>> {
        if let Some(entry) = self.clients.read().unwrap().get(&client) {
            return Arc::clone(entry);
        }

        let mut clients = self.clients.write().unwrap();
        Arc::clone(
            clients
                .entry(client)
                .or_insert_with(|| Arc::new(Mutex::new(ClientState::new()))),
        )
    }
}

/// Rate limiting middleware function
///
/// Rejects over-budget clients with 429 before the request reaches the
/// authentication stage.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()) {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited => {
            let body = serde_json::json!({ "error": "Too many requests" }).to_string();
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
    }
}
