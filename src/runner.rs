//! The two sweep drivers.
//!
//! Each driver provisions the key pool, runs one worker-pool lifecycle per
//! configuration, reports, and removes the test keys again. Any store error
//! ends the run immediately; keys may then be left behind.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{ConcurrencyConfig, RunConfig, ScatterConfig};
use crate::error::BenchError;
use crate::fixture::{self, KeyPool};
use crate::report::{Cell, ConcurrencyReport, ScatterPrinter, TablePrinter};
use crate::stats::{concurrency_ladder, key_count_ladder, median, nanos_to_millis, LatencySummary, ResultSet};
use crate::store::Store;
use crate::worker::{run_pool, BatchSize, PoolSpec, SampleStream};

async fn prepare(store: &dyn Store, run: &RunConfig) -> Result<KeyPool, BenchError> {
    if run.reset {
        let removed = fixture::clear(store, &run.fixture).await?;
        debug!(removed, "reset test keys before provisioning");
    }
    let keys = fixture::populate(store, &run.fixture).await?;
    info!(keys = keys.len(), "holding test keys");
    Ok(keys)
}

/// Measure the median batched-read latency for every key count of the
/// ladder at every concurrency level between `min_conc` and `max_conc`.
pub async fn concurrency_sweep<W: Write>(
    store: Arc<dyn Store>,
    cfg: &ConcurrencyConfig,
    out: W,
) -> Result<(W, ConcurrencyReport), BenchError> {
    let run = &cfg.run;
    let keys = prepare(store.as_ref(), run).await?;

    let counts = key_count_ladder();
    let levels = concurrency_ladder(cfg.min_conc, cfg.max_conc);
    let mut printer = TablePrinter::new(out, run.format);
    printer.begin(keys.len(), run.cycles, &levels)?;

    for &count in &counts {
        printer.begin_row(count)?;
        for &concurrency in &levels {
            let results = Arc::new(ResultSet::new(run.cycles));
            let spec = PoolSpec { concurrency, cycles: run.cycles, batch: BatchSize::Fixed(count) };
            run_pool(store.clone(), &keys, spec, results.clone()).await?;

            let sorted = results.sorted();
            let median_ms = median(&sorted).map(nanos_to_millis).unwrap_or(0.0);
            let summary = LatencySummary::from_nanos(&sorted);
            debug!(keys = count, concurrency, median_ms, ?summary, "configuration measured");
            printer.cell(Cell { concurrency, median_ms, summary })?;
        }
        printer.end_row()?;
    }

    let deleted = fixture::clear(store.as_ref(), &run.fixture).await?;
    Ok(printer.finish(deleted)?)
}

/// Stream one `(key count, duration)` point per cycle at a fixed concurrency.
pub async fn scatter_sweep<W: Write + Send + 'static>(
    store: Arc<dyn Store>,
    cfg: &ScatterConfig,
    out: W,
) -> Result<(W, usize), BenchError> {
    let run = &cfg.run;
    let keys = prepare(store.as_ref(), run).await?;

    let mut printer = ScatterPrinter::new(out, run.format, cfg.gnuplot.clone(), cfg.concurrency);
    printer.begin()?;

    let (tx, mut rx) = mpsc::channel(cfg.concurrency.max(1) * 4);
    let writer = tokio::task::spawn_blocking(move || -> std::io::Result<(W, usize)> {
        while let Some(sample) = rx.blocking_recv() {
            printer.sample(&sample)?;
        }
        let written = printer.written();
        Ok((printer.finish()?, written))
    });

    let sink = Arc::new(SampleStream::new(tx));
    let batch = BatchSize::Uniform { min: cfg.min_keys, max: cfg.max_keys };
    let spec = PoolSpec { concurrency: cfg.concurrency, cycles: run.cycles, batch };
    let measured = run_pool(store.clone(), &keys, spec, sink).await;

    // the sink's sender is gone once the pool returns, so the writer drains and exits
    let (out, written) = writer.await??;
    measured?;
    debug!(samples = written, "scatter run finished");

    let deleted = fixture::clear(store.as_ref(), &run.fixture).await?;
    info!(deleted, "removed test keys");
    Ok((out, written))
}
