//! mhttp - HTTP/1.1 server engine
//!
//! Hand-rolled request parsing, template routing, per-endpoint rate limiting
//! and WebSocket upgrade negotiation on top of tokio.

pub mod config;
pub mod http;
pub mod metrics;
pub mod ratelimit;
pub mod routing;
pub mod server;
