use thiserror::Error;

/// Errors raised while validating a run configuration.
///
/// These are always detected before the store is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cycles must be greater than 0")]
    ZeroCycles,

    #[error("min-conc must be greater than zero")]
    ZeroMinConcurrency,

    #[error("min-conc cannot exceed max-conc ({min} > {max})")]
    ConcurrencyRange { min: usize, max: usize },

    #[error("concurrency must be greater than 0")]
    ZeroConcurrency,

    #[error("min-keys must be greater than zero")]
    ZeroMinKeys,

    #[error("min-keys cannot exceed max-keys ({min} > {max})")]
    KeyRange { min: usize, max: usize },

    #[error("batches of {keys} keys cannot be drawn from a pool of {pool_size}")]
    PoolTooSmall { keys: usize, pool_size: usize },

    #[error("key prefix must not be empty")]
    EmptyPrefix,

    #[error("--gnuplot requires --format text")]
    GnuplotWithJson,
}

/// Errors returned by a [`crate::store::Store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error on the store connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection before a full reply arrived.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The byte stream did not parse as a protocol frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The reply parsed but had the wrong shape for the command.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },
}

/// Fatal errors of a measurement run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// The sample sink was closed while workers were still producing.
    #[error("sample sink closed before the run finished")]
    SinkClosed,

    #[error("output error: {0}")]
    Output(std::io::Error),
}

impl From<std::io::Error> for BenchError {
    fn from(e: std::io::Error) -> Self {
        BenchError::Output(e)
    }
}
