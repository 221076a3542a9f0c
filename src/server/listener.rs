//! The readiness-driven scheduler: accept loop plus event dispatch.
//!
//! The event loop owns the connection table and hands readiness work to
//! the pool. Connections are registered `EPOLLONESHOT`, so a connection is
//! never driven by two workers at once: the worker that finishes a task
//! re-arms the interest itself. Closed connections are swept out of the
//! table after each wait round.

use std::collections::HashMap;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use nix::sys::epoll::{EpollEvent, EpollFlags};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::connection::{ConnContext, Connection};
use crate::server::epoll::Epoller;
use crate::server::pool::ThreadPool;

pub struct Server {
    listener: TcpListener,
    listen_token: u64,
    epoller: Arc<Epoller>,
    pool: ThreadPool,
    ctx: Arc<ConnContext>,
    conns: HashMap<u64, Arc<Mutex<Connection>>>,
    /// Flags every connection is (re-)armed with, on top of IN/OUT.
    interest: EpollFlags,
    max_events: usize,
}

impl Server {
    pub fn new(
        cfg: &Config,
        verifier: Arc<dyn crate::auth::CredentialVerifier>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.server.listen_addr)
            .with_context(|| format!("failed to bind {}", cfg.server.listen_addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener nonblocking")?;

        let epoller = Arc::new(Epoller::new().context("failed to create epoll instance")?);
        let listen_token = listener.as_raw_fd() as u64;
        epoller.add(&listener, EpollFlags::EPOLLIN, listen_token)?;

        let mut interest = EpollFlags::EPOLLONESHOT | EpollFlags::EPOLLRDHUP;
        if cfg.server.edge_triggered {
            interest |= EpollFlags::EPOLLET;
        }

        Ok(Self {
            listener,
            listen_token,
            epoller,
            pool: ThreadPool::new(cfg.server.workers, cfg.server.job_queue_capacity),
            ctx: Arc::new(ConnContext::new(
                cfg.server.document_root.clone(),
                cfg.server.edge_triggered,
                verifier,
            )),
            conns: HashMap::new(),
            interest,
            max_events: cfg.server.max_events,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        info!(addr = %self.listener.local_addr()?, "listening");
        let mut events = vec![EpollEvent::empty(); self.max_events];
        loop {
            let n = match self.epoller.wait(&mut events) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("epoll wait failed"),
            };
            for event in &events[..n] {
                let token = event.data();
                if token == self.listen_token {
                    self.accept_clients();
                } else {
                    self.dispatch(token, event.events());
                }
            }
            self.sweep_closed();
        }
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(peer = %addr, error = %e, "failed to set client nonblocking");
                        continue;
                    }
                    let token = stream.as_raw_fd() as u64;
                    let conn = Connection::new(stream, addr, Arc::clone(&self.ctx));
                    if let Err(e) =
                        self.epoller
                            .add(conn.stream(), EpollFlags::EPOLLIN | self.interest, token)
                    {
                        error!(peer = %addr, error = %e, "failed to register client");
                        continue;
                    }
                    self.conns.insert(token, Arc::new(Mutex::new(conn)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, token: u64, flags: EpollFlags) {
        let Some(conn) = self.conns.get(&token) else {
            return;
        };
        if flags
            .intersects(EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR)
        {
            lock_conn(conn).close();
            return;
        }

        let conn = Arc::clone(conn);
        let epoller = Arc::clone(&self.epoller);
        let interest = self.interest;
        if flags.contains(EpollFlags::EPOLLIN) {
            self.pool
                .execute(move || on_read(&conn, &epoller, interest, token));
        } else if flags.contains(EpollFlags::EPOLLOUT) {
            self.pool
                .execute(move || on_write(&conn, &epoller, interest, token));
        }
    }

    fn sweep_closed(&mut self) {
        let epoller = &self.epoller;
        self.conns.retain(|_, conn| {
            let guard = lock_conn(conn);
            if guard.is_open() {
                true
            } else {
                let _ = epoller.delete(guard.stream());
                false
            }
        });
    }
}

fn lock_conn(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|e| e.into_inner())
}

/// Readable: drain the socket, then try to answer.
fn on_read(conn: &Arc<Mutex<Connection>>, epoller: &Epoller, interest: EpollFlags, token: u64) {
    let mut conn = lock_conn(conn);
    match conn.read() {
        Ok(0) => {
            conn.close();
            return;
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) => {
            debug!(peer = %conn.addr(), error = %e, "read failed");
            conn.close();
            return;
        }
    }
    rearm_after_process(&mut conn, epoller, interest, token);
}

/// Writable: push pending bytes; on completion either recycle the
/// connection for keep-alive or close it.
fn on_write(conn: &Arc<Mutex<Connection>>, epoller: &Epoller, interest: EpollFlags, token: u64) {
    let mut conn = lock_conn(conn);
    match conn.write() {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) => {
            debug!(peer = %conn.addr(), error = %e, "write failed");
            conn.close();
            return;
        }
    }
    if conn.to_write_bytes() == 0 {
        if conn.is_keep_alive() {
            conn.finish_request();
            rearm_after_process(&mut conn, epoller, interest, token);
        } else {
            conn.close();
        }
    } else if epoller
        .modify(conn.stream(), EpollFlags::EPOLLOUT | interest, token)
        .is_err()
    {
        conn.close();
    }
}

/// Run `process` once and re-arm for the side it now needs: OUT when a
/// response is staged, IN while the request is still incomplete.
fn rearm_after_process(
    conn: &mut MutexGuard<'_, Connection>,
    epoller: &Epoller,
    interest: EpollFlags,
    token: u64,
) {
    let side = if conn.process() {
        EpollFlags::EPOLLOUT
    } else {
        EpollFlags::EPOLLIN
    };
    if epoller.modify(conn.stream(), side | interest, token).is_err() {
        conn.close();
    }
}
