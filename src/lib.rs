//! Rampart - lightweight concurrent HTTP/1.1 server
//!
//! Protocol and I/O core: a growable byte buffer, an incremental request
//! parser, zero-copy response assembly, a per-connection driver for
//! edge-triggered schedulers, and the bounded blocking queue the worker
//! pool and asynchronous logger hand work through.

pub mod auth;
pub mod buffer;
pub mod config;
pub mod http;
pub mod log;
pub mod queue;
pub mod server;
