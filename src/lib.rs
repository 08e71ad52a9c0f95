//! Turnstile - Per-client Token Bucket Rate Limiting
//!
//! This crate admits or rejects HTTP requests per client using token
//! buckets held in an in-memory registry. Clients are identified by API key
//! or, failing that, by peer address. A background task keeps idle buckets
//! topped up.

pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod ratelimit;
