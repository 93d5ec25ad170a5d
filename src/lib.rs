//! coinwatch library
//!
//! A resilient client for public cryptocurrency market data: an expiring
//! two-tier cache, a single-lane request queue with rate-limit backoff, a
//! self-imposed call budget and a static fallback table, coordinated by a
//! service that always returns something displayable.

pub mod cache;
pub mod cli;
pub mod data;
pub mod queue;
pub mod ratelimit;
pub mod render;
pub mod service;
pub mod store;
