//! Per-connection I/O driver.
//!
//! One `Connection` owns a nonblocking socket, an inbound and an outbound
//! buffer, the request parser and the response descriptor. An external
//! readiness scheduler calls `read`, `process` and `write`; nothing here
//! blocks, and every call is safe to repeat.
//!
//! Caller protocol (per readiness notification):
//! - `read` drains the socket; `Ok(0)` is end-of-stream, `WouldBlock`
//!   after the drain is normal.
//! - `process` runs the parser once; `false` means "nothing to answer yet,
//!   keep the connection armed for reads".
//! - `write` pushes the two-slot gather list (header bytes, mapped file)
//!   until drained or `WouldBlock`; on completion either `finish_request`
//!   for keep-alive or `close`.

use std::io;
use std::io::IoSlice;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::uio;

use crate::auth::CredentialVerifier;
use crate::buffer::Buffer;
use crate::http::parser::{ParseStatus, RequestParser};
use crate::http::response::Response;

/// Keep writing eagerly while more than this many bytes are pending, even
/// on a level-triggered connection.
const WRITE_LOW_WATER: usize = 10 * 1024;

/// State shared by every connection: document root, trigger mode, the
/// credential seam and the live-connection counter. The counter lives here
/// rather than in the connections themselves so init/close pair up exactly
/// once per connection.
pub struct ConnContext {
    pub root: PathBuf,
    pub edge_triggered: bool,
    pub verifier: Arc<dyn CredentialVerifier>,
    active: AtomicUsize,
}

impl ConnContext {
    pub fn new(root: PathBuf, edge_triggered: bool, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            root,
            edge_triggered,
            verifier,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of currently open connections.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn opened(&self) -> usize {
        self.active.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn closed(&self) -> usize {
        self.active.fetch_sub(1, Ordering::Relaxed) - 1
    }
}

pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ConnContext>,
    read_buf: Buffer,
    write_buf: Buffer,
    parser: RequestParser,
    response: Response,
    /// Bytes of the mapped file already handed to the kernel.
    file_written: usize,
    open: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr, ctx: Arc<ConnContext>) -> Self {
        let active = ctx.opened();
        tracing::info!(peer = %addr, active, "client in");
        Self {
            stream,
            addr,
            ctx,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            parser: RequestParser::new(),
            response: Response::new(),
            file_written: 0,
            open: true,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Drain the socket into the inbound buffer. Returns the total bytes
    /// read this call; `Ok(0)` means the peer closed. Under edge-triggered
    /// readiness this loops until `WouldBlock`, which is only an error when
    /// nothing was read at all.
    pub fn read(&mut self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            match self.read_buf.read_fd(&self.stream) {
                Ok(0) => return Ok(0),
                Ok(n) => {
                    total += n;
                    if !self.ctx.edge_triggered {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && total > 0 => {
                    return Ok(total);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the parser over whatever has arrived and, when a request is
    /// complete (or hopeless), build the response and arm the gather slots.
    /// Returns `false` while there is nothing to answer yet.
    pub fn process(&mut self) -> bool {
        if self.read_buf.readable_bytes() == 0 {
            return false;
        }
        match self
            .parser
            .parse(&mut self.read_buf, self.ctx.verifier.as_ref())
        {
            Ok(ParseStatus::Complete) => {
                let request = self.parser.request();
                tracing::debug!(peer = %self.addr, path = %request.path, "request parsed");
                let path = request.path.clone();
                let keep_alive = request.is_keep_alive();
                self.response
                    .init(&self.ctx.root, path, keep_alive, Some(200));
            }
            Ok(ParseStatus::Partial) => return false,
            Err(err) => {
                tracing::warn!(peer = %self.addr, error = ?err, "bad request");
                let path = self.parser.request().path.clone();
                self.response.init(&self.ctx.root, path, false, Some(400));
            }
        }
        self.response.make(&mut self.write_buf);
        self.file_written = 0;
        true
    }

    /// Vectored write of the pending slots: outbound-buffer bytes first,
    /// then the mapped file from the current offset. Partial writes retire
    /// the slots front to back. Loops while edge-triggered or while more
    /// than the low-water mark remains; returns the last write's size.
    pub fn write(&mut self) -> io::Result<usize> {
        loop {
            let header_len = self.write_buf.readable_bytes();
            let n = {
                let file_rest = match self.response.file() {
                    Some(m) if self.file_written < m.len() => &m[self.file_written..],
                    _ => &[][..],
                };
                let iov = [
                    IoSlice::new(self.write_buf.peek()),
                    IoSlice::new(file_rest),
                ];
                let cnt = if file_rest.is_empty() { 1 } else { 2 };
                uio::writev(&self.stream, &iov[..cnt]).map_err(io::Error::from)?
            };
            if n > header_len {
                self.file_written += n - header_len;
                if header_len > 0 {
                    self.write_buf.retrieve_all();
                }
            } else {
                self.write_buf.retrieve(n);
            }
            if self.to_write_bytes() == 0 {
                return Ok(n);
            }
            if !self.ctx.edge_triggered && self.to_write_bytes() <= WRITE_LOW_WATER {
                return Ok(n);
            }
        }
    }

    /// Bytes still pending across both gather slots.
    pub fn to_write_bytes(&self) -> usize {
        let file_rest = self
            .response
            .file_len()
            .saturating_sub(self.file_written);
        self.write_buf.readable_bytes() + file_rest
    }

    /// Whether this exchange leaves the connection open. Reflects the
    /// response, so a parse failure answers `false` regardless of what the
    /// client asked for.
    pub fn is_keep_alive(&self) -> bool {
        self.response.keep_alive()
    }

    /// Reset for the next request on a keep-alive connection: release the
    /// mapped file and re-init the parser. Pipelined bytes already in the
    /// inbound buffer survive and are picked up by the next `process`.
    pub fn finish_request(&mut self) {
        self.response.unmap();
        self.parser.init();
        self.file_written = 0;
    }

    /// Close exactly once: release the mapping, shut the socket down and
    /// decrement the shared counter. Further calls are no-ops.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.response.unmap();
        let _ = self.stream.shutdown(Shutdown::Both);
        let active = self.ctx.closed();
        tracing::info!(peer = %self.addr, active, "client out");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
