//! Batched multi-key read (`MGET`) latency harness.
//!
//! A fixed pool of workers pulls job tokens from a closable queue, reads a
//! random batch of test keys per job and records how long the read took.
//! The concurrency sweep reduces each configuration to a median; the scatter
//! sweep streams every sample.

pub mod config;
pub mod error;
pub mod fixture;
pub mod queue;
pub mod report;
pub mod runner;
pub mod stats;
pub mod store;
pub mod worker;

pub use error::{BenchError, ConfigError, StoreError};
pub use fixture::{FixtureSpec, KeyPool};
pub use stats::Sample;
pub use store::Store;
