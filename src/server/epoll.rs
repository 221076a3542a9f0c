//! Thin wrapper over the kernel's readiness multiplexer.
//!
//! All registration calls take `&self`, so one `Epoller` can be shared
//! behind an `Arc`: the event loop waits while worker threads re-arm
//! connections they have finished driving.

use std::io;
use std::os::fd::AsFd;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

pub struct Epoller {
    epoll: Epoll,
}

impl Epoller {
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(io::Error::from)?;
        Ok(Self { epoll })
    }

    /// Register `fd` with the given interest; `token` comes back in events.
    pub fn add<Fd: AsFd>(&self, fd: &Fd, interest: EpollFlags, token: u64) -> io::Result<()> {
        self.epoll
            .add(fd, EpollEvent::new(interest, token))
            .map_err(io::Error::from)
    }

    /// Replace the interest set for an already registered `fd`; required
    /// after every oneshot notification.
    pub fn modify<Fd: AsFd>(&self, fd: &Fd, interest: EpollFlags, token: u64) -> io::Result<()> {
        let mut event = EpollEvent::new(interest, token);
        self.epoll.modify(fd, &mut event).map_err(io::Error::from)
    }

    pub fn delete<Fd: AsFd>(&self, fd: &Fd) -> io::Result<()> {
        self.epoll.delete(fd).map_err(io::Error::from)
    }

    /// Block until readiness; fills `events` and returns how many fired.
    pub fn wait(&self, events: &mut [EpollEvent]) -> io::Result<usize> {
        self.epoll
            .wait(events, EpollTimeout::NONE)
            .map_err(io::Error::from)
    }
}
