//! Asynchronous log delivery.
//!
//! Formatted records are enqueued as owned byte chunks and drained by a
//! single writer thread, so hot paths never block on file I/O (they block
//! only if the queue itself fills, which is the intended backpressure).
//! `init` wires this under `tracing-subscriber`'s fmt layer.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use bytes::Bytes;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::LogConfig;
use crate::queue::BlockingQueue;

/// Producer half: cheap to clone, one per subscriber writer.
#[derive(Clone)]
pub struct QueueWriter {
    queue: Arc<BlockingQueue<Bytes>>,
}

impl io::Write for QueueWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Records arriving after shutdown are dropped, not an error.
        self.queue.push_back(Bytes::copy_from_slice(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.queue.flush();
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for QueueWriter {
    type Writer = QueueWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Handle owning the writer thread; dropping it (or calling `shutdown`)
/// closes the queue and joins the thread.
pub struct LogHandle {
    queue: Arc<BlockingQueue<Bytes>>,
    thread: Option<JoinHandle<()>>,
}

impl LogHandle {
    pub fn shutdown(&mut self) {
        self.queue.close();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the writer thread draining into `path` (stderr when `None`).
pub fn spawn_writer(
    path: Option<&Path>,
    queue_capacity: usize,
) -> anyhow::Result<(QueueWriter, LogHandle)> {
    let queue = Arc::new(BlockingQueue::<Bytes>::new(queue_capacity));
    let mut sink: Box<dyn Write + Send> = match path {
        Some(p) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .with_context(|| format!("failed to open log file {}", p.display()))?,
        ),
        None => Box::new(io::stderr()),
    };

    let consumer = queue.clone();
    let thread = thread::Builder::new()
        .name("rampart-log".into())
        .spawn(move || {
            while let Some(chunk) = consumer.pop() {
                let _ = sink.write_all(&chunk);
            }
            let _ = sink.flush();
        })
        .context("failed to spawn log writer thread")?;

    Ok((
        QueueWriter {
            queue: queue.clone(),
        },
        LogHandle {
            queue,
            thread: Some(thread),
        },
    ))
}

/// Install the global subscriber over the queue-backed writer.
pub fn init(cfg: &LogConfig) -> anyhow::Result<LogHandle> {
    let (writer, handle) = spawn_writer(cfg.path.as_deref(), cfg.queue_capacity)?;
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_ansi(cfg.path.is_none())
        .with_writer(writer)
        .init();
    Ok(handle)
}
