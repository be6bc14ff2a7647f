//! Rate limiting logic and state management.

mod clock;
mod limiter;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use limiter::{Decision, RateLimiter, RateLimiterConfig};
