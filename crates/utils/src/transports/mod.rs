//! Concrete record transports.
//!
//! [`SpoolPublisher`] is always available; the Redis publisher and
//! subscriber are gated behind the `redis` feature.

#[cfg(feature = "redis")]
pub mod redis;
pub mod spool;

#[cfg(feature = "redis")]
pub use redis::*;
pub use spool::*;
