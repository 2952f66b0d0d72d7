//! Load generator: a fixed pool of workers issuing timed batched reads.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::BenchError;
use crate::fixture::KeyPool;
use crate::queue::{job_queue, Job, JobReceiver};
use crate::stats::{ResultSet, Sample};
use crate::store::Store;

/// Key that is read once per worker before measuring.
pub const WARMUP_KEY: &str = "fake";

/// How many keys each job reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    Fixed(usize),
    /// Drawn uniformly per job from `min..=max`.
    Uniform { min: usize, max: usize },
}

impl BatchSize {
    fn draw<R: Rng>(&self, rng: &mut R) -> usize {
        match *self {
            BatchSize::Fixed(k) => k,
            BatchSize::Uniform { min, max } if min < max => rng.gen_range(min..=max),
            BatchSize::Uniform { min, .. } => min,
        }
    }
}

/// Shape of one worker-pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    pub concurrency: usize,
    pub cycles: usize,
    pub batch: BatchSize,
}

/// Where workers deliver their samples.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    async fn record(&self, job: Job, sample: Sample) -> Result<(), BenchError>;
}

#[async_trait]
impl Collector for ResultSet {
    async fn record(&self, job: Job, sample: Sample) -> Result<(), BenchError> {
        self.set_slot(job, sample.elapsed);
        Ok(())
    }
}

/// Forwards samples to a writer as they are produced.
pub struct SampleStream {
    tx: mpsc::Sender<Sample>,
}

impl SampleStream {
    pub fn new(tx: mpsc::Sender<Sample>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Collector for SampleStream {
    async fn record(&self, _job: Job, sample: Sample) -> Result<(), BenchError> {
        self.tx.send(sample).await.map_err(|_| BenchError::SinkClosed)
    }
}

/// Run `spec.concurrency` workers until `spec.cycles` jobs were measured.
///
/// Returns once every worker has been joined. The first failing read aborts
/// all other workers and the producer and is returned as the error.
pub async fn run_pool<C: Collector>(
    store: Arc<dyn Store>,
    keys: &KeyPool,
    spec: PoolSpec,
    collector: Arc<C>,
) -> Result<(), BenchError> {
    let (producer, jobs) = job_queue(spec.cycles, spec.concurrency);

    let mut workers = JoinSet::new();
    for id in 0..spec.concurrency {
        let worker = Worker {
            id,
            store: store.clone(),
            keys: keys.clone(),
            batch: spec.batch,
            jobs: jobs.clone(),
            collector: collector.clone(),
        };
        workers.spawn(worker.run());
    }
    drop(jobs);
    let producer = tokio::spawn(producer.run());

    let mut completed = 0usize;
    while let Some(joined) = workers.join_next().await {
        let outcome = joined.map_err(BenchError::from).and_then(|r| r);
        match outcome {
            Ok(n) => completed += n,
            Err(e) => {
                warn!(error = %e, "aborting worker pool");
                workers.abort_all();
                producer.abort();
                return Err(e);
            }
        }
    }
    let emitted = producer.await?;
    debug!(emitted, completed, concurrency = spec.concurrency, "worker pool finished");
    Ok(())
}

struct Worker<C> {
    id: usize,
    store: Arc<dyn Store>,
    keys: KeyPool,
    batch: BatchSize,
    jobs: JobReceiver,
    collector: Arc<C>,
}

impl<C: Collector> Worker<C> {
    /// Returns the number of jobs this worker measured.
    async fn run(self) -> Result<usize, BenchError> {
        // warm up the client; the reply does not matter
        if let Err(e) = self.store.batch_read(&[WARMUP_KEY.to_string()]).await {
            debug!(worker = self.id, error = %e, "warm-up read failed");
        }
        let mut rng = SmallRng::from_entropy();
        let mut mykeys = self.keys.private_copy();
        let mut done = 0;

        while let Some(job) = self.jobs.next().await {
            let k = self.batch.draw(&mut rng).min(mykeys.len());
            let (batch, _) = mykeys.partial_shuffle(&mut rng, k);

            let start = Instant::now();
            let result = self.store.batch_read(batch).await;
            let elapsed = start.elapsed();
            result?;

            self.collector.record(job, Sample { key_count: k, elapsed }).await?;
            done += 1;
        }
        Ok(done)
    }
}
