//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 request/response pipeline with
//! support for keep-alive connections.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-connection driver invoked by the readiness
//!   scheduler (read / process / write)
//! - **`parser`**: Incremental four-state request parser over the inbound
//!   buffer
//! - **`request`**: Parsed request representation and accessors
//! - **`response`**: Response assembly with zero-copy file mapping
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Drain incoming request data
//!        └──────┬──────┘
//!               │ Request complete (or hopeless)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Parse, build headers, map the file
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Gather-write header + mapped file
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! The driver itself never blocks and never loops on its own: each arrow
//! above is taken in response to a readiness notification delivered by the
//! scheduler in `crate::server`.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
