//! Proxy in front of the GitHub Issues API for the webcompat site.
//!
//! Browser XHR calls land on `/api/...`; each is checked against the
//! caller's identity, reshaped, and forwarded as a single upstream call made
//! with the user's token or the proxy bot's.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod identity;
pub mod ratelimit;
pub mod render;
pub mod routes;
pub mod server;
pub mod types;
