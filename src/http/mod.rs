//! HTTP protocol implementation.
//!
//! This module implements the per-connection engine of an embedded HTTP/1.1
//! server with keep-alive, streaming gzip and file copying.
//!
//! # Architecture
//!
//! - **`state`**: The per-connection record and its request-boundary reset
//! - **`url`**: URL decoding and splitting into path, directory, version, command and query
//! - **`parser`**: Incremental request validation over the receive buffer
//! - **`router`**: Maps a request to the API, a host switch, the config dump or a static file
//! - **`files`**: Checks and opens static files below the document root
//! - **`writer`**: Serializes the status line and header block
//! - **`gzip`**: Streaming gzip framed as chunked transfer-encoding
//! - **`transmit`**: Non-blocking header, body and file-copy drives
//! - **`transport`**: The non-blocking byte stream the engine reads and writes
//! - **`connection`**: Ties it together behind three drive operations
//! - **`response`**, **`mime`**, **`hash`**: Status codes, content types, lookup hashes
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │ Collecting  │ ← receive + validate until the header block is complete
//!        └──────┬──────┘
//!               │ Complete / Malformed / TooLarge / NeedsRedirect
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← route, fill the body, build the header
//!        └──────┬───────────┘
//!               │ Response ready            STREAM ─► handed off
//!               ▼
//!        ┌──────────────────┐
//!        │    Sending       │ ← header, then body (direct or gzip chunks);
//!        └──────┬───────────┘   a file copy alternates with reading the file
//!               │ Response sent
//!               ├─ Keep-Alive → reset → Collecting (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lantern::config::Config;
//! use lantern::context::ServerContext;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Arc::new(ServerContext::new(Config::default()));
//!     let listener = TcpListener::bind("127.0.0.1:19999").await?;
//!     lantern::server::listener::accept_loop(listener, ctx).await
//! }
//! ```

pub mod connection;
pub mod error;
pub mod files;
pub mod gzip;
pub mod hash;
pub mod mime;
pub mod parser;
pub mod response;
pub mod router;
pub mod state;
pub mod transmit;
pub mod transport;
pub mod url;
pub mod writer;
