//! Retry and pacing for unit workflows.
//!
//! [`with_retry`] wraps one unit of work with bounded retries, deterministic
//! exponential backoff and a recovery hook run before each new attempt.
//! Randomized pacing lives separately in [`Pacing`] and is never applied by
//! the retry loop itself.

pub mod pacing;
pub mod strategies;
pub mod types;

pub use pacing::{DelayRange, Pacing};
pub use strategies::{calculate_backoff, with_retry, with_retry_if};
pub use types::RetryPolicy;
