//! Resilience layer: every adapter call the runner makes goes through the
//! rate limiter and the circuit breaker; human pacing fills the gaps.

pub mod circuit_breaker;
pub mod pacing;
pub mod rate_limiter;

pub use circuit_breaker::CircuitBreaker;
pub use pacing::HumanPacing;
pub use rate_limiter::RateLimiter;
