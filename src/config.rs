//! Command-line surface and run configuration.
//!
//! Connection settings may also come from `MGETPERF_*` environment variables.
//! Everything is validated before the store is contacted.

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::fixture::{FixtureSpec, DEFAULT_POOL_SIZE, DEFAULT_PREFIX};
use crate::report::{GnuplotOptions, OutputFormat};
use crate::stats::key_count_ladder;
use crate::store::RedisOptions;

/// Multithreaded Redis MGET tester
#[derive(Debug, Parser)]
#[command(name = "mgetperf", version, about, disable_help_flag = true, disable_help_subcommand = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Show help
    #[arg(short = '?', long, global = true, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Server hostname
    #[arg(short = 'h', long, global = true, env = "MGETPERF_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, global = true, env = "MGETPERF_PORT", default_value_t = 6379)]
    pub port: u16,

    /// Password to use when connecting to the server
    #[arg(short = 'a', long, global = true, env = "MGETPERF_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database number
    #[arg(short = 'n', long, global = true, env = "MGETPERF_DB", default_value_t = 0)]
    pub db: u32,

    /// Number of attempts for each key count
    #[arg(long, global = true, default_value_t = 100)]
    pub cycles: usize,

    /// Size of test data values, in bytes
    #[arg(long, global = true, default_value_t = 2048)]
    pub data_size: usize,

    /// Number of test keys to hold in the store
    #[arg(long, global = true, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Prefix of the test key names
    #[arg(long, global = true, default_value = DEFAULT_PREFIX)]
    pub key_prefix: String,

    /// Store backend to measure
    #[arg(long, global = true, value_enum, default_value_t = Backend::Redis)]
    pub backend: Backend,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Delete existing test keys before provisioning
    #[arg(long, global = true, default_value_t = false)]
    pub reset: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// A Redis-compatible server over TCP.
    Redis,
    /// In-process store, for dry runs of the harness itself.
    Memory,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Test various key counts at various levels of concurrency
    #[command(disable_help_flag = true)]
    Concurrency(ConcurrencyArgs),

    /// Output key-count vs. time points, optionally plotting
    #[command(disable_help_flag = true)]
    Scatter(ScatterArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConcurrencyArgs {
    /// Minimum concurrency
    #[arg(long, default_value_t = 1)]
    pub min_conc: usize,

    /// Maximum concurrency
    #[arg(long, default_value_t = 16)]
    pub max_conc: usize,
}

#[derive(Debug, Clone, Args)]
pub struct ScatterArgs {
    /// Concurrency
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Minimum number of keys to fetch in a cycle
    #[arg(long, default_value_t = 1)]
    pub min_keys: usize,

    /// Maximum number of keys to fetch in a cycle
    #[arg(long, default_value_t = 100)]
    pub max_keys: usize,

    /// Output GnuPlot script for scatter
    #[arg(long, default_value_t = false)]
    pub gnuplot: bool,

    /// Inject additional commands into the gnuplot render
    #[arg(long = "gnuplot-extra")]
    pub gnuplot_extra: Vec<String>,
}

/// Settings shared by both sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub backend: Backend,
    pub redis: RedisOptions,
    pub fixture: FixtureSpec,
    pub cycles: usize,
    pub format: OutputFormat,
    pub reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    pub run: RunConfig,
    pub min_conc: usize,
    pub max_conc: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterConfig {
    pub run: RunConfig,
    pub concurrency: usize,
    pub min_keys: usize,
    pub max_keys: usize,
    pub gnuplot: GnuplotOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Concurrency(ConcurrencyConfig),
    Scatter(ScatterConfig),
}

impl GlobalArgs {
    fn run_config(&self) -> Result<RunConfig, ConfigError> {
        if self.cycles < 1 {
            return Err(ConfigError::ZeroCycles);
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(RunConfig {
            backend: self.backend,
            redis: RedisOptions {
                host: self.host.clone(),
                port: self.port,
                password: self.password.clone().filter(|p| !p.is_empty()),
                db: self.db,
            },
            fixture: FixtureSpec {
                prefix: self.key_prefix.clone(),
                pool_size: self.pool_size,
                value_size: self.data_size,
            },
            cycles: self.cycles,
            format: self.format,
            reset: self.reset,
        })
    }
}

fn ensure_pool_holds(keys: usize, pool_size: usize) -> Result<(), ConfigError> {
    if keys > pool_size {
        return Err(ConfigError::PoolTooSmall { keys, pool_size });
    }
    Ok(())
}

impl ConcurrencyArgs {
    pub fn validate(&self, run: RunConfig) -> Result<ConcurrencyConfig, ConfigError> {
        if self.min_conc < 1 {
            return Err(ConfigError::ZeroMinConcurrency);
        }
        if self.min_conc > self.max_conc {
            return Err(ConfigError::ConcurrencyRange { min: self.min_conc, max: self.max_conc });
        }
        let largest = key_count_ladder().into_iter().max().unwrap_or(1);
        ensure_pool_holds(largest, run.fixture.pool_size)?;
        Ok(ConcurrencyConfig { run, min_conc: self.min_conc, max_conc: self.max_conc })
    }
}

impl ScatterArgs {
    pub fn validate(&self, run: RunConfig) -> Result<ScatterConfig, ConfigError> {
        if self.min_keys < 1 {
            return Err(ConfigError::ZeroMinKeys);
        }
        if self.min_keys > self.max_keys {
            return Err(ConfigError::KeyRange { min: self.min_keys, max: self.max_keys });
        }
        if self.concurrency < 1 {
            return Err(ConfigError::ZeroConcurrency);
        }
        ensure_pool_holds(self.max_keys, run.fixture.pool_size)?;
        if self.gnuplot && run.format == OutputFormat::Json {
            return Err(ConfigError::GnuplotWithJson);
        }
        Ok(ScatterConfig {
            run,
            concurrency: self.concurrency,
            min_keys: self.min_keys,
            max_keys: self.max_keys,
            gnuplot: GnuplotOptions { enabled: self.gnuplot, extra: self.gnuplot_extra.clone() },
        })
    }
}

impl Cli {
    /// Validate the parsed arguments into a runnable mode.
    pub fn mode(&self) -> Result<Mode, ConfigError> {
        let run = self.global.run_config()?;
        match &self.command {
            Command::Concurrency(args) => args.validate(run).map(Mode::Concurrency),
            Command::Scatter(args) => args.validate(run).map(Mode::Scatter),
        }
    }
}

/// Log filter for stderr: `RUST_LOG` when set, otherwise WARN (DEBUG with `-v`).
pub fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default_level = if verbose { Level::DEBUG } else { Level::WARN };
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(default_level.into()))
}
