//! Core of skillbatch: run large batches of structured generation requests
//! against a remote endpoint under a rate limit, with bounded retries and
//! per-task failure isolation.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
