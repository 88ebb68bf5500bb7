//! Gatekeeper - per-client rate limiting for HTTP endpoints
//!
//! This crate tracks how many requests each client key has made within a
//! fixed window and rejects requests once the quota is used up. State lives
//! in memory only, is bounded by a key capacity and is reclaimed by a
//! background reaper once clients go idle.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
