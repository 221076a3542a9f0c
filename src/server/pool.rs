//! Worker pool fed through the blocking queue.
//!
//! Readiness tasks are boxed closures pushed by the event loop; workers
//! pop until the queue closes. Dropping the pool closes the queue
//! (releasing every blocked worker) and joins the threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::BlockingQueue;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
    jobs: Arc<BlockingQueue<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(threads: usize, queue_capacity: usize) -> Self {
        let jobs = Arc::new(BlockingQueue::<Job>::new(queue_capacity));
        let workers = (0..threads)
            .map(|i| {
                let jobs = Arc::clone(&jobs);
                thread::Builder::new()
                    .name(format!("rampart-worker-{i}"))
                    .spawn(move || {
                        while let Some(job) = jobs.pop() {
                            job();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { jobs, workers }
    }

    /// Enqueue a task, blocking while the queue is full. Returns `false`
    /// once the pool is shutting down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.jobs.push_back(Box::new(job))
    }

    pub fn shutdown(&mut self) {
        self.jobs.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
