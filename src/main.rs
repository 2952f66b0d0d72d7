use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use mgetperf::config::{log_filter, Backend, Cli, Mode, RunConfig};
use mgetperf::runner::{concurrency_sweep, scatter_sweep};
use mgetperf::store::{MemoryStore, RedisStore, Store};

fn open_store(run: &RunConfig) -> Arc<dyn Store> {
    match run.backend {
        Backend::Redis => {
            debug!(addr = %run.redis.addr(), db = run.redis.db, "using redis backend");
            Arc::new(RedisStore::new(run.redis.clone()))
        }
        Backend::Memory => Arc::new(MemoryStore::default()),
    }
}

async fn run(mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Concurrency(cfg) => {
            let store = open_store(&cfg.run);
            let (_out, _report) = concurrency_sweep(store, &cfg, std::io::stdout().lock()).await?;
        }
        Mode::Scatter(cfg) => {
            let store = open_store(&cfg.run);
            scatter_sweep(store, &cfg, std::io::stdout()).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = log_filter(cli.global.verbose, std::env::var("RUST_LOG").ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // validation happens before any store contact
    let mode = match cli.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
