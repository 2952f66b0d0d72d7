//! Closable job-token stream.
//!
//! The orchestrator is the only producer; it emits `0..cycles` and then
//! drops its sender, which closes the queue. Any number of workers may
//! consume. Once closed and drained, [`JobReceiver::next`] returns `None`.

use flume::{Receiver, Sender};

/// Index of one measurement; also the result slot it writes to.
pub type Job = usize;

pub struct JobProducer {
    tx: Sender<Job>,
    cycles: usize,
}

#[derive(Clone)]
pub struct JobReceiver {
    rx: Receiver<Job>,
}

/// Create a queue for `cycles` jobs with room for `capacity` in flight.
pub fn job_queue(cycles: usize, capacity: usize) -> (JobProducer, JobReceiver) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (JobProducer { tx, cycles }, JobReceiver { rx })
}

impl JobProducer {
    /// Emit every job index in order, then close the queue.
    ///
    /// Returns the number of jobs handed out; fewer than `cycles` only when
    /// every consumer went away early.
    pub async fn run(self) -> usize {
        for job in 0..self.cycles {
            if self.tx.send_async(job).await.is_err() {
                return job;
            }
        }
        self.cycles
    }
}

impl JobReceiver {
    pub async fn next(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }
}
