//! Core rate limiter implementation.
//!
//! Each client gets a log of accepted request times inside a trailing window.
//! A client that fills its window is blocked for a fixed duration, and the log
//! is discarded. Blocks lapse lazily: the next check after expiry clears them.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use crate::error::{NoapiError, Result};

/// Validated, immutable limiter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    max_requests: u32,
    window_secs: f64,
    block_duration_secs: f64,
}

impl RateLimiterConfig {
    /// Build a configuration, rejecting non-positive values.
    pub fn new(max_requests: u32, window_secs: f64, block_duration_secs: f64) -> Result<Self> {
        if max_requests == 0 {
            return Err(NoapiError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if !(window_secs.is_finite() && window_secs > 0.0) {
            return Err(NoapiError::Config(format!(
                "window_secs must be a positive number, got {}",
                window_secs
            )));
        }
        if !(block_duration_secs.is_finite() && block_duration_secs > 0.0) {
            return Err(NoapiError::Config(format!(
                "block_duration_secs must be a positive number, got {}",
                block_duration_secs
            )));
        }

        Ok(Self {
            max_requests,
            window_secs,
            block_duration_secs,
        })
    }

    /// Maximum accepted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the trailing window in seconds.
    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// How long a client stays blocked once it hits the limit.
    pub fn block_duration_secs(&self) -> f64 {
        self.block_duration_secs
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Whole seconds the client should wait; zero when admitted
    pub retry_after_secs: u64,
}

impl Decision {
    /// An admitted request.
    pub fn allow() -> Self {
        Self {
            admitted: true,
            retry_after_secs: 0,
        }
    }

    /// A denied request that may retry after `retry_after_secs`.
    pub fn deny(retry_after_secs: u64) -> Self {
        Self {
            admitted: false,
            retry_after_secs,
        }
    }
}

/// Per-client bookkeeping.
#[derive(Debug, Default)]
struct ClientState {
    /// Accepted request times, oldest first
    log: VecDeque<f64>,
    /// Absolute time at which an active block lifts
    blocked_until: Option<f64>,
}

/// Seconds until `expiry`, rounded up and never negative.
fn retry_after(expiry: f64, now: f64) -> u64 {
    (expiry - now).ceil().max(0.0) as u64
}

/// The per-client request throttle shared by every connection.
///
/// State is kept in a sharded map. A check holds the shard lock for its
/// client for the whole decision, so concurrent checks for one client are
/// linearized and checks for different clients proceed independently.
pub struct RateLimiter {
    /// Per-client state keyed by client identifier
    clients: DashMap<String, ClientState>,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter reading time from a [`MonotonicClock`].
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Create a rate limiter with an explicit time source.
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: DashMap::new(),
            config,
            clock,
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Check a request from `identifier` at the limiter clock's current time.
    pub fn check_now(&self, identifier: &str) -> Decision {
        self.check(identifier, self.clock.now())
    }

    /// Decide whether a request from `identifier` arriving at `now` is admitted.
    ///
    /// `now` is expected to be non-decreasing across calls. A reading that
    /// goes backwards can only make the limiter more lenient.
    pub fn check(&self, identifier: &str, now: f64) -> Decision {
        let mut state = self.clients.entry(identifier.to_string()).or_default();

        if let Some(expiry) = state.blocked_until {
            if now < expiry {
                let retry = retry_after(expiry, now);
                trace!(client = %identifier, retry_after = retry, "Client is blocked");
                return Decision::deny(retry);
            }
            state.blocked_until = None;
            debug!(client = %identifier, "Block expired");
        }

        let cutoff = now - self.config.window_secs;
        while state.log.front().is_some_and(|&t| t <= cutoff) {
            state.log.pop_front();
        }

        if state.log.len() >= self.config.max_requests as usize {
            let expiry = now + self.config.block_duration_secs;
            state.blocked_until = Some(expiry);
            state.log.clear();

            let retry = retry_after(expiry, now);
            debug!(
                client = %identifier,
                limit = self.config.max_requests,
                retry_after = retry,
                "Rate limit exceeded, blocking client"
            );
            return Decision::deny(retry);
        }

        state.log.push_back(now);
        trace!(
            client = %identifier,
            in_window = state.log.len(),
            "Request admitted"
        );
        Decision::allow()
    }

    /// Whether `identifier` has a block that is still live at `now`.
    pub fn is_blocked(&self, identifier: &str, now: f64) -> bool {
        self.clients
            .get(identifier)
            .and_then(|state| state.blocked_until)
            .is_some_and(|expiry| now < expiry)
    }

    /// Number of accepted requests currently logged for `identifier`.
    ///
    /// Returns `None` if the client has never been seen.
    pub fn logged_requests(&self, identifier: &str) -> Option<usize> {
        self.clients.get(identifier).map(|state| state.log.len())
    }

    /// Number of distinct clients with state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Forget all clients.
    pub fn clear(&self) {
        self.clients.clear();
    }
}
