//! # Rahl Hub
//!
//! Network-facing half of Rahl AI: the OpenAI-compatible provider, the
//! GitHub client, and the HTTP API that ties them to the core gateway.

pub mod api;
pub mod github;
pub mod metrics;
pub mod middleware;
pub mod providers;
