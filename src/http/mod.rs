//! HTTP/1.1 protocol implementation.
//!
//! # Architecture
//!
//! - **`connection`**: the per-socket session state machine
//! - **`parser`**: resumable request parsing over the session's read buffer
//! - **`request`**: request representation and header access
//! - **`response`**: response representation with builder pattern
//! - **`writer`**: serializes and writes responses to the client
//! - **`websocket`**: upgrade handshake negotiation and socket hand-off
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Parser driven across socket reads
//!        └──────┬──────┘
//!               │ Request complete          (malformed → 4xx, then Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Route lookup, rate limit, handler
//!        └──────┬───────────┘
//!               │ Response ready            (upgrade accepted → Upgrading)
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mhttp::config::Config;
//! use mhttp::http::response::Response;
//! use mhttp::routing::{RouteTable, get};
//! use mhttp::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let routes = RouteTable::new(vec![
//!         get("/")?.with(|_| Ok(Response::text("hello"))),
//!     ]);
//!     Server::new(Config::load()?).run(routes).await
//! }
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod websocket;
pub mod writer;
