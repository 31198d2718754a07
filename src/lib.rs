//! Sluice - leaky bucket admission for rate limited batch jobs
//!
//! The core is [`ratelimit::LeakyBucket`], an in-process gate that admits work
//! at a fixed ceiling over a sliding time window and suspends callers until
//! capacity drains. The [`batch`] module drives outbound fetches through it.

pub mod batch;
pub mod config;
pub mod error;
pub mod ratelimit;
