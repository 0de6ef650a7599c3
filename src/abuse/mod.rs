//! Abuse prevention — per-client rate limiting.

pub mod rate_limit;
