//! Server composition: the epoll wrapper, the worker pool, and the
//! accept/dispatch loop that drives connections.

pub mod epoll;
pub mod listener;
pub mod pool;

pub use epoll::Epoller;
pub use listener::Server;
pub use pool::ThreadPool;
